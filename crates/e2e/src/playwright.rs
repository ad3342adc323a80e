//! Playwright browser automation
//!
//! A Node process running a generated bridge script owns the browser. The
//! Rust side writes one JSON command per line to its stdin and reads replies
//! and response events from its stdout.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStderr, ChildStdout, Command as TokioCommand};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use ghsearch_common::{BrowserKind, SuiteConfig};

use crate::error::{E2eError, E2eResult};
use crate::page::{Locator, NetworkObservation, Page, ResponseHub, ResponseStream};

/// Bound for starting the browser and opening the first page
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Bound for a single enabled/editable probe inside the browser
const PROBE_TIMEOUT_MS: u64 = 1_000;

/// Responses the bridge holds for lazy body reads; older ones are evicted first
const RETAINED_RESPONSES: usize = 256;

const LAUNCH_OPTIONS_PLACEHOLDER: &str = "__LAUNCH_OPTIONS__";

const BRIDGE_SCRIPT: &str = r#"
const readline = require('readline');

let playwright;
try {
  playwright = require(require.resolve('playwright', { paths: [process.cwd()] }));
} catch (e) {
  playwright = require('playwright');
}

const OPTIONS = __LAUNCH_OPTIONS__;

function emit(message, callback) {
  process.stdout.write(JSON.stringify(message) + '\n', callback);
}

function pattern(p) {
  return new RegExp(p.source, p.ignore_case ? 'i' : '');
}

(async () => {
  let browser, context, page;
  try {
    browser = await playwright[OPTIONS.browser].launch({ headless: OPTIONS.headless });
    const contextOptions = { baseURL: OPTIONS.base_url, viewport: OPTIONS.viewport };
    if (OPTIONS.video_dir) {
      contextOptions.recordVideo = { dir: OPTIONS.video_dir, size: OPTIONS.viewport };
    }
    context = await browser.newContext(contextOptions);
    context.setDefaultTimeout(OPTIONS.action_timeout_ms);
    page = await context.newPage();
  } catch (error) {
    emit({ event: 'fatal', error: error.message }, () => process.exit(1));
    return;
  }

  const responses = new Map();
  let nextRid = 0;
  page.on('response', (response) => {
    const rid = nextRid++;
    responses.set(rid, response);
    while (responses.size > OPTIONS.retained_responses) {
      responses.delete(responses.keys().next().value);
    }
    emit({
      event: 'response',
      rid,
      url: response.url(),
      method: response.request().method(),
      status: response.status(),
    });
  });

  function resolve(l) {
    switch (l.kind) {
      case 'test_id':
        return page.getByTestId(l.value).first();
      case 'role': {
        let loc = page.getByRole(l.role, l.name ? { name: pattern(l.name) } : {});
        if (l.has_text) {
          loc = loc.filter({ hasText: pattern(l.has_text) });
        }
        return loc.first();
      }
      case 'text':
        return page.getByText(pattern(l.pattern)).first();
      default:
        throw new Error('unknown locator kind: ' + l.kind);
    }
  }

  async function probe(l, check) {
    const loc = resolve(l);
    if ((await loc.count()) === 0) {
      return false;
    }
    return check(loc, { timeout: OPTIONS.probe_timeout_ms });
  }

  async function shutdown() {
    const video = page.video();
    await context.close();
    const videoPath = video ? await video.path() : null;
    await browser.close();
    return { video: videoPath };
  }

  const handlers = {
    goto: async (m) => { await page.goto(m.path); return null; },
    is_visible: async (m) => resolve(m.locator).isVisible(),
    is_enabled: async (m) => probe(m.locator, (loc, o) => loc.isEnabled(o)),
    is_editable: async (m) => probe(m.locator, (loc, o) => loc.isEditable(o)),
    fill: async (m) => { await resolve(m.locator).fill(m.value); return null; },
    click: async (m) => { await resolve(m.locator).click(); return null; },
    press_sequentially: async (m) => {
      await resolve(m.locator).pressSequentially(m.text, { delay: m.delay_ms });
      return null;
    },
    response_body: async (m) => {
      const response = responses.get(m.rid);
      if (!response) {
        throw new Error('unknown response ' + m.rid);
      }
      responses.delete(m.rid);
      return (await response.body()).toString('base64');
    },
    screenshot: async (m) => { await page.screenshot({ path: m.path, fullPage: true }); return null; },
    trace_start: async () => {
      await context.tracing.start({ screenshots: true, snapshots: true });
      return null;
    },
    trace_stop: async (m) => {
      await context.tracing.stop(m.path ? { path: m.path } : {});
      return null;
    },
  };

  let closing = false;
  const rl = readline.createInterface({ input: process.stdin });
  rl.on('line', async (line) => {
    let message;
    try {
      message = JSON.parse(line);
    } catch (error) {
      process.stderr.write('bridge: unparsable command: ' + line + '\n');
      return;
    }
    if (message.op === 'close') {
      closing = true;
      rl.close();
      try {
        const value = await shutdown();
        emit({ id: message.id, ok: true, value }, () => process.exit(0));
      } catch (error) {
        emit({ id: message.id, ok: false, error: error.message }, () => process.exit(1));
      }
      return;
    }
    const handler = handlers[message.op];
    try {
      if (!handler) {
        throw new Error('unknown op: ' + message.op);
      }
      const value = await handler(message);
      emit({ id: message.id, ok: true, value: value === undefined ? null : value });
    } catch (error) {
      emit({ id: message.id, ok: false, error: error.message });
    }
  });
  rl.on('close', () => {
    if (closing) {
      return;
    }
    browser.close().finally(() => process.exit(0));
  });

  emit({ event: 'ready' });
})();
"#;

/// Launch settings for one browsing context
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub base_url: String,
    pub browser: BrowserKind,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub action_timeout: Duration,
    pub video_dir: Option<PathBuf>,
}

impl BridgeConfig {
    pub fn from_suite(config: &SuiteConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            browser: config.browser.kind,
            headless: config.browser.headless,
            viewport_width: config.browser.viewport_width,
            viewport_height: config.browser.viewport_height,
            action_timeout: config.action_timeout(),
            video_dir: None,
        }
    }

    pub fn with_video_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.video_dir = dir;
        self
    }

    /// The bridge script with these settings baked in
    pub fn script(&self) -> E2eResult<String> {
        let options = LaunchOptions {
            browser: self.browser.as_str(),
            headless: self.headless,
            base_url: &self.base_url,
            viewport: Viewport {
                width: self.viewport_width,
                height: self.viewport_height,
            },
            video_dir: self.video_dir.as_deref(),
            action_timeout_ms: self.action_timeout.as_millis() as u64,
            probe_timeout_ms: PROBE_TIMEOUT_MS,
            retained_responses: RETAINED_RESPONSES,
        };
        let options = serde_json::to_string(&options)?;
        Ok(BRIDGE_SCRIPT.replace(LAUNCH_OPTIONS_PLACEHOLDER, &options))
    }
}

#[derive(Serialize)]
struct LaunchOptions<'a> {
    browser: &'static str,
    headless: bool,
    base_url: &'a str,
    viewport: Viewport,
    video_dir: Option<&'a Path>,
    action_timeout_ms: u64,
    probe_timeout_ms: u64,
    retained_responses: usize,
}

#[derive(Serialize)]
struct Viewport {
    width: u32,
    height: u32,
}

/// Check if Playwright is installed
pub fn check_playwright_installed() -> E2eResult<()> {
    let output = Command::new("npx")
        .args(["playwright", "--version"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match output {
        Ok(status) if status.success() => Ok(()),
        _ => Err(E2eError::PlaywrightNotFound),
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BridgeMessage {
    Reply {
        id: u64,
        ok: bool,
        #[serde(default)]
        value: Value,
        #[serde(default)]
        error: Option<String>,
    },
    Event(BridgeEvent),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum BridgeEvent {
    Ready,
    Fatal {
        error: String,
    },
    Response {
        rid: u64,
        url: String,
        method: String,
        status: u16,
    },
}

type Reply = Result<Value, String>;

/// Request/reply plumbing over the bridge's stdin and stdout
struct BridgeChannel {
    stdin: AsyncMutex<ChildStdin>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    next_id: AtomicU64,
    action_timeout: Duration,
}

impl BridgeChannel {
    fn new(stdin: ChildStdin, action_timeout: Duration) -> Self {
        Self {
            stdin: AsyncMutex::new(stdin),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            action_timeout,
        }
    }

    async fn call(&self, op: &str, params: Value) -> E2eResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let mut request = json!({ "id": id, "op": op });
        if let (Some(request), Value::Object(params)) = (request.as_object_mut(), params) {
            request.extend(params);
        }
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        debug!("bridge <- {}", op);
        if let Err(e) = self.send(line.as_bytes()).await {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.action_timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(E2eError::Bridge(format!("{}: {}", op, message))),
            Ok(Err(_)) => Err(E2eError::Bridge(format!(
                "bridge exited before answering {}",
                op
            ))),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(E2eError::Timeout(format!(
                    "{} after {} ms",
                    op,
                    self.action_timeout.as_millis()
                )))
            }
        }
    }

    async fn send(&self, bytes: &[u8]) -> E2eResult<()> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(bytes).await?;
        stdin.flush().await?;
        Ok(())
    }

    fn complete(&self, id: u64, reply: Reply) {
        match self.pending.lock().remove(&id) {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => debug!("Dropping late bridge reply {}", id),
        }
    }

    /// Fail every outstanding call
    fn abandon(&self) {
        self.pending.lock().clear();
    }

    async fn call_bool(&self, op: &str, params: Value) -> E2eResult<bool> {
        let value = self.call(op, params).await?;
        value
            .as_bool()
            .ok_or_else(|| E2eError::Bridge(format!("{} returned {} instead of a boolean", op, value)))
    }
}

/// A browsing context driven through the bridge
pub struct PlaywrightPage {
    channel: Arc<BridgeChannel>,
    hub: ResponseHub,
    child: Child,
    reader: JoinHandle<()>,
    stderr: JoinHandle<()>,
    _script_dir: TempDir,
}

impl PlaywrightPage {
    /// Start node with the bridge script and wait for the page to open
    pub async fn launch(config: &BridgeConfig) -> E2eResult<Self> {
        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, config.script()?)?;

        if let Some(dir) = &config.video_dir {
            std::fs::create_dir_all(dir)?;
        }

        info!(
            "Launching {} (headless: {}) for {}",
            config.browser.as_str(),
            config.headless,
            config.base_url
        );

        let mut child = TokioCommand::new("node")
            .arg(&script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| E2eError::Bridge(format!("failed to start node: {}", e)))?;

        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        let channel = Arc::new(BridgeChannel::new(stdin, config.action_timeout));
        let hub = ResponseHub::default();
        let (ready_tx, ready_rx) = oneshot::channel();

        let reader = tokio::spawn(read_messages(
            stdout,
            Arc::clone(&channel),
            hub.clone(),
            ready_tx,
        ));
        let stderr = tokio::spawn(forward_stderr(stderr));

        let page = Self {
            channel,
            hub,
            child,
            reader,
            stderr,
            _script_dir: script_dir,
        };

        match tokio::time::timeout(LAUNCH_TIMEOUT, ready_rx).await {
            Ok(Ok(Ok(()))) => {
                debug!("Bridge ready");
                Ok(page)
            }
            Ok(Ok(Err(message))) => Err(E2eError::Bridge(format!("browser launch failed: {}", message))),
            Ok(Err(_)) => Err(E2eError::Bridge(
                "bridge exited during launch".to_string(),
            )),
            Err(_) => Err(E2eError::Timeout("browser launch".to_string())),
        }
    }

    async fn call_unit(&self, op: &str, params: Value) -> E2eResult<()> {
        self.channel.call(op, params).await.map(|_| ())
    }
}

fn missing_pipe(name: &str) -> E2eError {
    E2eError::Bridge(format!("bridge {} was not captured", name))
}

async fn read_messages(
    stdout: ChildStdout,
    channel: Arc<BridgeChannel>,
    hub: ResponseHub,
    ready: oneshot::Sender<Result<(), String>>,
) {
    let mut ready = Some(ready);
    let mut lines = BufReader::new(stdout).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Reading bridge output failed: {}", e);
                break;
            }
        };

        let message: BridgeMessage = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(_) => {
                debug!("bridge: {}", line);
                continue;
            }
        };

        match message {
            BridgeMessage::Reply {
                id,
                ok,
                value,
                error,
            } => {
                let reply = if ok {
                    Ok(value)
                } else {
                    Err(error.unwrap_or_else(|| "unknown bridge error".to_string()))
                };
                channel.complete(id, reply);
            }
            BridgeMessage::Event(BridgeEvent::Ready) => {
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Ok(()));
                }
            }
            BridgeMessage::Event(BridgeEvent::Fatal { error: message }) => {
                error!("Bridge failed: {}", message);
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Err(message));
                }
            }
            BridgeMessage::Event(BridgeEvent::Response {
                rid,
                url,
                method,
                status,
            }) => {
                debug!("response {} {} {}", status, method, url);
                let loader = Arc::clone(&channel);
                hub.publish(NetworkObservation::new(url, method, status, move || {
                    let channel = Arc::clone(&loader);
                    async move { fetch_body(&channel, rid).await }.boxed()
                }));
            }
        }
    }

    debug!("Bridge output closed");
    channel.abandon();
}

async fn fetch_body(channel: &BridgeChannel, rid: u64) -> E2eResult<Vec<u8>> {
    let value = channel.call("response_body", json!({ "rid": rid })).await?;
    let encoded = value
        .as_str()
        .ok_or_else(|| E2eError::Bridge(format!("response {} body is not a string", rid)))?;
    BASE64
        .decode(encoded)
        .map_err(|e| E2eError::Bridge(format!("response {} body is not base64: {}", rid, e)))
}

async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        warn!("bridge stderr: {}", line);
    }
}

fn locator_params(locator: &Locator) -> Value {
    json!({ "locator": locator })
}

#[async_trait]
impl Page for PlaywrightPage {
    async fn goto(&self, path: &str) -> E2eResult<()> {
        self.call_unit("goto", json!({ "path": path })).await
    }

    async fn is_visible(&self, locator: &Locator) -> E2eResult<bool> {
        self.channel.call_bool("is_visible", locator_params(locator)).await
    }

    async fn is_enabled(&self, locator: &Locator) -> E2eResult<bool> {
        self.channel.call_bool("is_enabled", locator_params(locator)).await
    }

    async fn is_editable(&self, locator: &Locator) -> E2eResult<bool> {
        self.channel.call_bool("is_editable", locator_params(locator)).await
    }

    async fn fill(&self, locator: &Locator, value: &str) -> E2eResult<()> {
        self.call_unit("fill", json!({ "locator": locator, "value": value }))
            .await
    }

    async fn click(&self, locator: &Locator) -> E2eResult<()> {
        self.call_unit("click", locator_params(locator)).await
    }

    async fn press_sequentially(
        &self,
        locator: &Locator,
        text: &str,
        delay: Duration,
    ) -> E2eResult<()> {
        self.call_unit(
            "press_sequentially",
            json!({
                "locator": locator,
                "text": text,
                "delay_ms": delay.as_millis() as u64,
            }),
        )
        .await
    }

    fn observe_responses(&self) -> ResponseStream {
        self.hub.subscribe()
    }

    async fn screenshot(&self, path: &Path) -> E2eResult<()> {
        self.call_unit("screenshot", json!({ "path": path.to_string_lossy() }))
            .await
    }

    async fn start_trace(&self) -> E2eResult<()> {
        self.call_unit("trace_start", json!({})).await
    }

    async fn stop_trace(&self, path: Option<&Path>) -> E2eResult<()> {
        let path = path.map(|p| p.to_string_lossy().into_owned());
        self.call_unit("trace_stop", json!({ "path": path })).await
    }

    async fn close(&self) -> E2eResult<Option<PathBuf>> {
        let value = self.channel.call("close", json!({})).await?;
        Ok(value
            .get("video")
            .and_then(Value::as_str)
            .map(PathBuf::from))
    }
}

impl Drop for PlaywrightPage {
    fn drop(&mut self) {
        // Try graceful shutdown first
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }

        let _ = self.child.start_kill();
        self.reader.abort();
        self.stderr.abort();
    }
}
