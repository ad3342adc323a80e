mod common;

use std::time::Duration;

use serde_json::json;

use common::{payload, search_response, search_url, settings, Event, FakeElement, FakePage, API};
use ghsearch_common::SearchQuery;
use ghsearch_e2e::{
    E2eError, FlowState, Locator, LocatorStrategy, NetworkObservation, Pages, SearchFlow,
};

fn query(value: &str) -> SearchQuery {
    SearchQuery::new(value).unwrap()
}

fn is_text_probe(locator: &Locator) -> bool {
    matches!(locator, Locator::Text { .. })
}

/// Searching octocat against a healthy app reaches Reconciled via the result link.
#[tokio::test]
async fn octocat_search_reconciles() {
    let page = FakePage::search_app()
        .respond_on_click(search_response(API, "octocat", &payload(&["octocat", "octo-org"])))
        .render_on_click(FakeElement::link("octocat"));
    let pages = Pages::new(&page, &settings());

    pages.user_search.goto().await.unwrap();
    let outcome = pages.user_search.search_user(&query("octocat")).await.unwrap();

    assert_eq!(outcome.reconciliation.login, "octocat");
    assert_eq!(outcome.reconciliation.strategy, LocatorStrategy::LinkName);
    assert_eq!(outcome.reconciliation.candidates, vec!["octocat", "octo-org"]);
    assert_eq!(
        outcome.states,
        vec![
            FlowState::Idle,
            FlowState::Ready,
            FlowState::Submitted,
            FlowState::Correlated,
            FlowState::Reconciled,
        ]
    );
    assert_eq!(page.events()[0], Event::Goto("/user".to_string()));
}

/// The response observer is registered before the submit click.
#[tokio::test]
async fn observation_registered_before_submit() {
    let page = FakePage::search_app()
        .respond_on_click(search_response(API, "octocat", &payload(&["octocat"])))
        .render_on_click(FakeElement::link("octocat"));

    SearchFlow::new(&page, &settings())
        .run(&query("octocat"))
        .await
        .unwrap();

    let registered = page.position(|e| *e == Event::Registered).unwrap();
    let clicked = page.position(|e| matches!(e, Event::Click(_))).unwrap();
    let filled = page.position(|e| matches!(e, Event::Fill(_))).unwrap();
    assert!(filled < registered, "fill must precede registration");
    assert!(registered < clicked, "registration must precede the click");
    assert_eq!(page.events()[filled], Event::Fill("octocat".to_string()));
}

/// Only the response for this query, at the search endpoint, with GET and 200 is accepted.
#[tokio::test]
async fn correlation_skips_unrelated_responses() {
    let wanted = payload(&["octocat"]);
    let page = FakePage::search_app()
        .respond_on_click(NetworkObservation::with_body(
            "https://gh-users-search.netlify.app/static/app.js",
            "GET",
            200,
            "not json",
        ))
        .respond_on_click(NetworkObservation::with_body(
            search_url(API, "octocat"),
            "GET",
            403,
            json!({ "message": "rate limited" }).to_string(),
        ))
        .respond_on_click(search_response(API, "torvalds", &payload(&["torvalds"])))
        .respond_on_click(NetworkObservation::with_body(
            format!("{}/users/octocat", API),
            "GET",
            200,
            json!({ "login": "octocat" }).to_string(),
        ))
        .respond_on_click(search_response(API, "OctoCat", &wanted))
        .render_on_click(FakeElement::link("octocat"));

    let outcome = SearchFlow::new(&page, &settings())
        .run(&query("octocat"))
        .await
        .unwrap();

    assert_eq!(outcome.payload.items, wanted["items"].as_array().unwrap().clone());
}

/// With no matching response, the flow fails with a correlation timeout at the bound.
#[tokio::test(start_paused = true)]
async fn correlation_times_out_at_bound() {
    let page = FakePage::search_app()
        .respond_on_click(search_response(API, "torvalds", &payload(&["torvalds"])));
    let settings = settings();
    let bound = settings.response_timeout;

    let mut flow = SearchFlow::new(&page, &settings);
    let err = flow.run(&query("octocat")).await.unwrap_err();

    match err {
        E2eError::CorrelationTimeout { query, waited_ms } => {
            assert_eq!(query, "octocat");
            assert!(waited_ms >= bound.as_millis() as u64);
            assert!(waited_ms < bound.as_millis() as u64 + 100);
        }
        other => panic!("expected correlation timeout, got {}", other),
    }
    assert!(matches!(flow.state(), FlowState::Failed(_)));
    assert!(flow.history().contains(&FlowState::Submitted));
    assert!(!flow.history().contains(&FlowState::Correlated));
}

/// A link for any candidate wins over visible text for an earlier candidate.
#[tokio::test]
async fn link_tier_checked_for_all_candidates_before_text() {
    let page = FakePage::search_app()
        .respond_on_click(search_response(API, "octo", &payload(&["octocat", "octo-org"])))
        .render_on_click(FakeElement::text("octocat"))
        .render_on_click(FakeElement::link("octo-org"));

    let outcome = SearchFlow::new(&page, &settings())
        .run(&query("octo"))
        .await
        .unwrap();

    assert_eq!(outcome.reconciliation.login, "octo-org");
    assert_eq!(outcome.reconciliation.strategy, LocatorStrategy::LinkName);
    assert!(!page.visibility_probes().iter().any(is_text_probe));
}

/// Without links, a whole-word text match is accepted.
#[tokio::test]
async fn text_tier_used_when_no_link_matches() {
    let page = FakePage::search_app()
        .respond_on_click(search_response(API, "octocat", &payload(&["octocat"])))
        .render_on_click(FakeElement::text("Profile of OctoCat"));

    let outcome = SearchFlow::new(&page, &settings())
        .run(&query("octocat"))
        .await
        .unwrap();

    assert_eq!(outcome.reconciliation.strategy, LocatorStrategy::VisibleText);
    let probes = page.visibility_probes();
    let first_text = probes.iter().position(is_text_probe).unwrap();
    assert!(probes[..first_text]
        .iter()
        .any(|l| matches!(l, Locator::Role { .. })));
}

/// A probe that errors counts as not visible and the link tier moves on.
#[tokio::test]
async fn failing_probe_moves_to_next_candidate() {
    let page = FakePage::search_app()
        .respond_on_click(search_response(API, "octo", &payload(&["octocat", "octo-org"])))
        .render_on_click(FakeElement::link("octocat"))
        .render_on_click(FakeElement::link("octo-org"))
        .break_probe(LocatorStrategy::LinkName.locator_for("octocat"));

    let outcome = SearchFlow::new(&page, &settings())
        .run(&query("octo"))
        .await
        .unwrap();

    assert_eq!(outcome.reconciliation.login, "octo-org");
    assert_eq!(outcome.reconciliation.strategy, LocatorStrategy::LinkName);
}

/// When every link probe errors, the text tier still gets its turn.
#[tokio::test]
async fn failing_link_probes_fall_back_to_text() {
    let page = FakePage::search_app()
        .respond_on_click(search_response(API, "octocat", &payload(&["octocat"])))
        .render_on_click(FakeElement::link("octocat"))
        .break_probe(LocatorStrategy::LinkName.locator_for("octocat"));

    let outcome = SearchFlow::new(&page, &settings())
        .run(&query("octocat"))
        .await
        .unwrap();

    assert_eq!(outcome.reconciliation.login, "octocat");
    assert_eq!(outcome.reconciliation.strategy, LocatorStrategy::VisibleText);
    assert!(page.visibility_probes().iter().any(is_text_probe));
}

/// Zero items is an empty result set, not a rendering failure.
#[tokio::test]
async fn empty_results_fail_before_reconciliation() {
    let page = FakePage::search_app().respond_on_click(search_response(
        API,
        "nobody-at-all",
        &json!({ "total_count": 0, "incomplete_results": false, "items": [] }),
    ));

    let mut flow = SearchFlow::new(&page, &settings());
    let err = flow.run(&query("nobody-at-all")).await.unwrap_err();

    assert!(matches!(err, E2eError::EmptyResultSet { .. }));
    assert!(flow.history().contains(&FlowState::Correlated));
    assert!(page.visibility_probes().iter().all(|l| !is_text_probe(l)));
}

/// Items without logins leave nothing to look for.
#[tokio::test]
async fn items_without_logins_fail() {
    let page = FakePage::search_app().respond_on_click(search_response(
        API,
        "octocat",
        &json!({ "items": [null, { "id": 7 }, { "login": "" }] }),
    ));

    let err = SearchFlow::new(&page, &settings())
        .run(&query("octocat"))
        .await
        .unwrap_err();

    assert!(matches!(err, E2eError::NoCandidateLogins { item_count: 3 }));
}

/// Logins with regex metacharacters are matched literally.
#[tokio::test]
async fn metacharacters_in_logins_are_literal() {
    let page = FakePage::search_app()
        .respond_on_click(search_response(API, "a.b", &payload(&["a.b+c"])))
        .render_on_click(FakeElement::link("aXbYc"))
        .render_on_click(FakeElement::text("user a.bbbc"));

    let err = SearchFlow::new(&page, &settings())
        .run(&query("a.b"))
        .await
        .unwrap_err();

    match err {
        E2eError::NoRenderedMatch { candidates } => assert_eq!(candidates, vec!["a.b+c"]),
        other => panic!("expected no rendered match, got {}", other),
    }
}

/// An uneditable search bar fails the precondition and nothing is submitted.
#[tokio::test(start_paused = true)]
async fn readonly_search_bar_is_a_precondition_failure() {
    let mut bar = FakeElement::search_bar();
    bar.editable = false;
    let page = FakePage::new(vec![bar, FakeElement::search_button()]);

    let err = SearchFlow::new(&page, &settings())
        .run(&query("octocat"))
        .await
        .unwrap_err();

    match err {
        E2eError::PreconditionFailure(message) => {
            assert!(message.starts_with("Search bar should be editable"), "{}", message)
        }
        other => panic!("expected precondition failure, got {}", other),
    }
    assert!(!page.events().iter().any(|e| matches!(e, Event::Click(_))));
    assert!(!page.events().contains(&Event::Registered));
}

/// Typing key by key goes through the same readiness checks.
#[tokio::test]
async fn type_query_fills_search_bar() {
    let page = FakePage::search_app();
    let pages = Pages::new(&page, &settings());

    pages
        .user_search
        .type_query(&query("octocat"), Duration::from_millis(20))
        .await
        .unwrap();
    pages.user_search.assert_search_button_ready().await.unwrap();

    assert!(page.events().contains(&Event::Fill("octocat".to_string())));
}
