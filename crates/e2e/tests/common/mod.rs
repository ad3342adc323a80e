//! In-memory page for driving the search flow without a browser
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use ghsearch_common::SuiteConfig;
use ghsearch_e2e::{
    AriaRole, E2eError, E2eResult, ElementSnapshot, ElementState, FlowSettings, Locator,
    NetworkObservation, Page, PageProvider, ResponseHub, ResponseStream, SessionOptions,
};

pub const API: &str = "https://api.github.com";

/// What the flow did to the page, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Goto(String),
    Registered,
    Fill(String),
    Click(Locator),
    Probe(ElementState, Locator),
}

#[derive(Debug, Clone)]
pub struct FakeElement {
    pub snapshot: ElementSnapshot,
    pub visible: bool,
    pub enabled: bool,
    pub editable: bool,
}

impl FakeElement {
    pub fn new(snapshot: ElementSnapshot) -> Self {
        Self {
            snapshot,
            visible: true,
            enabled: true,
            editable: true,
        }
    }

    pub fn search_bar() -> Self {
        Self::new(ElementSnapshot {
            test_id: Some("search-bar".to_string()),
            role: Some(AriaRole::Textbox),
            ..Default::default()
        })
    }

    pub fn search_button() -> Self {
        let mut button = Self::new(ElementSnapshot {
            role: Some(AriaRole::Button),
            accessible_name: "Search".to_string(),
            text: "Search".to_string(),
            ..Default::default()
        });
        button.editable = false;
        button
    }

    pub fn link(login: &str) -> Self {
        Self::new(ElementSnapshot {
            role: Some(AriaRole::Link),
            accessible_name: login.to_string(),
            text: login.to_string(),
            ..Default::default()
        })
    }

    pub fn text(text: &str) -> Self {
        Self::new(ElementSnapshot {
            text: text.to_string(),
            ..Default::default()
        })
    }
}

/// A page holding a flat list of elements.
///
/// Clicking publishes the queued responses and then renders the queued
/// elements, the way the real application shows results after its fetch.
pub struct FakePage {
    elements: Mutex<Vec<FakeElement>>,
    rendered_on_click: Mutex<Vec<FakeElement>>,
    responses_on_click: Mutex<Vec<NetworkObservation>>,
    events: Mutex<Vec<Event>>,
    broken_probes: Mutex<Vec<Locator>>,
    hub: ResponseHub,
}

impl FakePage {
    pub fn new(elements: Vec<FakeElement>) -> Self {
        Self {
            elements: Mutex::new(elements),
            rendered_on_click: Mutex::new(Vec::new()),
            responses_on_click: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            broken_probes: Mutex::new(Vec::new()),
            hub: ResponseHub::default(),
        }
    }

    /// Search bar and submit button, no results
    pub fn search_app() -> Self {
        Self::new(vec![FakeElement::search_bar(), FakeElement::search_button()])
    }

    pub fn respond_on_click(self, observation: NetworkObservation) -> Self {
        self.responses_on_click.lock().push(observation);
        self
    }

    pub fn render_on_click(self, element: FakeElement) -> Self {
        self.rendered_on_click.lock().push(element);
        self
    }

    pub fn with_element(self, element: FakeElement) -> Self {
        self.elements.lock().push(element);
        self
    }

    /// Visibility probes for `locator` fail with a bridge error
    pub fn break_probe(self, locator: Locator) -> Self {
        self.broken_probes.lock().push(locator);
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn position(&self, predicate: impl Fn(&Event) -> bool) -> Option<usize> {
        self.events.lock().iter().position(predicate)
    }

    /// Locators probed for visibility, in order
    pub fn visibility_probes(&self) -> Vec<Locator> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Event::Probe(ElementState::Visible, locator) => Some(locator.clone()),
                _ => None,
            })
            .collect()
    }

    fn probe(&self, state: ElementState, locator: &Locator) -> bool {
        self.events.lock().push(Event::Probe(state, locator.clone()));
        let elements = self.elements.lock();
        match elements.iter().find(|e| locator.matches(&e.snapshot)) {
            Some(element) => match state {
                ElementState::Visible => element.visible,
                ElementState::Enabled => element.enabled,
                ElementState::Editable => element.editable,
            },
            None => false,
        }
    }

    fn require(&self, locator: &Locator) -> E2eResult<()> {
        if self.elements.lock().iter().any(|e| locator.matches(&e.snapshot)) {
            Ok(())
        } else {
            Err(E2eError::Bridge(format!("no element for {}", locator)))
        }
    }
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&self, path: &str) -> E2eResult<()> {
        self.events.lock().push(Event::Goto(path.to_string()));
        Ok(())
    }

    async fn is_visible(&self, locator: &Locator) -> E2eResult<bool> {
        if self.broken_probes.lock().contains(locator) {
            self.events
                .lock()
                .push(Event::Probe(ElementState::Visible, locator.clone()));
            return Err(E2eError::Bridge(format!("detached while probing {}", locator)));
        }
        Ok(self.probe(ElementState::Visible, locator))
    }

    async fn is_enabled(&self, locator: &Locator) -> E2eResult<bool> {
        Ok(self.probe(ElementState::Enabled, locator))
    }

    async fn is_editable(&self, locator: &Locator) -> E2eResult<bool> {
        Ok(self.probe(ElementState::Editable, locator))
    }

    async fn fill(&self, locator: &Locator, value: &str) -> E2eResult<()> {
        self.require(locator)?;
        self.events.lock().push(Event::Fill(value.to_string()));
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> E2eResult<()> {
        self.require(locator)?;
        self.events.lock().push(Event::Click(locator.clone()));

        let responses: Vec<_> = self.responses_on_click.lock().drain(..).collect();
        for observation in responses {
            self.hub.publish(observation);
        }
        let rendered: Vec<_> = self.rendered_on_click.lock().drain(..).collect();
        self.elements.lock().extend(rendered);
        Ok(())
    }

    async fn press_sequentially(
        &self,
        locator: &Locator,
        text: &str,
        _delay: Duration,
    ) -> E2eResult<()> {
        self.fill(locator, text).await
    }

    fn observe_responses(&self) -> ResponseStream {
        self.events.lock().push(Event::Registered);
        self.hub.subscribe()
    }

    async fn screenshot(&self, path: &Path) -> E2eResult<()> {
        std::fs::write(path, b"\x89PNG fake")?;
        Ok(())
    }
}

/// Hands out prepared pages, one per attempt
pub struct FakeProvider {
    pages: Mutex<VecDeque<FakePage>>,
}

impl FakeProvider {
    pub fn new(pages: Vec<FakePage>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.pages.lock().len()
    }
}

#[async_trait]
impl PageProvider for FakeProvider {
    type Page = FakePage;

    async fn open(&self, _options: &SessionOptions) -> E2eResult<FakePage> {
        self.pages
            .lock()
            .pop_front()
            .ok_or_else(|| E2eError::Bridge("no more pages".to_string()))
    }
}

pub fn search_url(api: &str, query: &str) -> String {
    format!("{}/search/users?q={}", api, query)
}

/// Search response body with one item per login
pub fn payload(logins: &[&str]) -> Value {
    let items: Vec<Value> = logins
        .iter()
        .enumerate()
        .map(|(i, login)| json!({ "login": login, "id": i + 1, "type": "User" }))
        .collect();
    json!({
        "total_count": items.len(),
        "incomplete_results": false,
        "items": items,
    })
}

pub fn search_response(api: &str, query: &str, body: &Value) -> NetworkObservation {
    NetworkObservation::with_body(search_url(api, query), "GET", 200, body.to_string())
}

pub fn settings() -> FlowSettings {
    settings_for(&SuiteConfig::default())
}

pub fn settings_for(config: &SuiteConfig) -> FlowSettings {
    FlowSettings::from_config(config).expect("default config is valid")
}
