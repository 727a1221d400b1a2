//! Flat-session CDP client over `tokio-tungstenite`.
//!
//! One `BrowserContext` is one isolated execution environment (own
//! storage/cookies) hosting one page on a remote Chromium endpoint.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::BrowserError;
use crate::page::AutomationPage;
use crate::types::{FrameMetadata, NetworkEvent, ScreencastFrame, ScreencastOptions, Viewport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Pending CDP command waiting for its response.
type PendingTx = oneshot::Sender<Result<Value, String>>;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const FRAME_BUFFER: usize = 32;
const NETWORK_BUFFER: usize = 256;

/// Connection settings for the remote automation endpoint.
#[derive(Clone, Debug)]
pub struct BrowserConfig {
    /// DevTools endpoint: `http(s)://host:port` (discovered via
    /// `/json/version`) or a `ws://` URL used directly.
    pub endpoint: String,
    pub viewport: Viewport,
    pub screencast: ScreencastOptions,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9222".into(),
            viewport: Viewport::default(),
            screencast: ScreencastOptions::default(),
        }
    }
}

/// One isolated browser context + page on the remote endpoint.
///
/// Every command goes through a single mpsc queue into the handler loop,
/// which serializes protocol access for the whole session.
pub struct BrowserContext {
    cmd_tx: mpsc::Sender<CdpCommand>,
    session_token: String,
    target_id: String,
    browser_context_id: String,
    viewport: Viewport,
    screencast: ScreencastOptions,
    pointer: parking_lot::Mutex<(f64, f64)>,
    frames: parking_lot::Mutex<Option<mpsc::Receiver<ScreencastFrame>>>,
    network: parking_lot::Mutex<Option<mpsc::Receiver<NetworkEvent>>>,
    closed: AtomicBool,
    handler: JoinHandle<()>,
}

/// Internal CDP command message.
struct CdpCommand {
    method: String,
    params: Value,
    /// `None` targets the browser itself; `Some` a flat session.
    session: Option<String>,
    response_tx: PendingTx,
}

impl BrowserContext {
    /// Connect to the remote endpoint and allocate an isolated context
    /// with a blank page at the configured viewport.
    pub async fn connect(config: BrowserConfig) -> Result<Self, BrowserError> {
        let ws_url = discover_ws_url(&config.endpoint).await?;
        let (ws, _) = connect_async(ws_url.as_str()).await.map_err(|e| {
            BrowserError::ConnectFailed {
                context: format!("WebSocket connect: {e}"),
            }
        })?;

        let (cmd_tx, cmd_rx) = mpsc::channel::<CdpCommand>(64);
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_BUFFER);
        let (net_tx, net_rx) = mpsc::channel(NETWORK_BUFFER);
        let handler = tokio::spawn(cdp_handler_loop(ws, cmd_rx, frame_tx, net_tx));

        let browser_context_id =
            send_via(&cmd_tx, "Target.createBrowserContext", json!({ "disposeOnDetach": true }), None)
                .await?["browserContextId"]
                .as_str()
                .ok_or_else(|| BrowserError::ConnectFailed {
                    context: "no browserContextId in response".into(),
                })?
                .to_string();

        let target_id = send_via(
            &cmd_tx,
            "Target.createTarget",
            json!({ "url": "about:blank", "browserContextId": browser_context_id }),
            None,
        )
        .await?["targetId"]
            .as_str()
            .ok_or_else(|| BrowserError::ConnectFailed {
                context: "no targetId in response".into(),
            })?
            .to_string();

        let session_token = send_via(
            &cmd_tx,
            "Target.attachToTarget",
            json!({ "targetId": target_id, "flatten": true }),
            None,
        )
        .await?["sessionId"]
            .as_str()
            .ok_or_else(|| BrowserError::ConnectFailed {
                context: "no sessionId in response".into(),
            })?
            .to_string();

        let ctx = Self {
            cmd_tx,
            session_token,
            target_id,
            browser_context_id,
            viewport: config.viewport,
            screencast: config.screencast,
            pointer: parking_lot::Mutex::new((0.0, 0.0)),
            frames: parking_lot::Mutex::new(Some(frame_rx)),
            network: parking_lot::Mutex::new(Some(net_rx)),
            closed: AtomicBool::new(false),
            handler,
        };

        for domain in ["Page.enable", "Runtime.enable", "Network.enable"] {
            ctx.send_cdp(domain, json!({})).await?;
        }
        ctx.send_cdp(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": config.viewport.width,
                "height": config.viewport.height,
                "deviceScaleFactor": 1,
                "mobile": false,
            }),
        )
        .await?;

        Ok(ctx)
    }

    /// The fixed virtual viewport this context renders at.
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Take the screencast frame stream. Yields `None` after the first call.
    pub fn take_frames(&self) -> Option<mpsc::Receiver<ScreencastFrame>> {
        self.frames.lock().take()
    }

    /// Take the network event stream. Yields `None` after the first call.
    pub fn take_network(&self) -> Option<mpsc::Receiver<NetworkEvent>> {
        self.network.lock().take()
    }

    // ─── CDP command helpers ─────────────────────────────────────────────

    async fn send_cdp(&self, method: &str, params: Value) -> Result<Value, BrowserError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::Closed);
        }
        send_via(
            &self.cmd_tx,
            method,
            params,
            Some(self.session_token.clone()),
        )
        .await
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError> {
        let result = self
            .send_cdp(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;
        if let Some(exception) = result.get("exceptionDetails") {
            let msg = exception["exception"]["description"]
                .as_str()
                .or_else(|| exception["text"].as_str())
                .unwrap_or("evaluation error");
            return Err(BrowserError::ActionFailed {
                action: "evaluate".into(),
                reason: msg.into(),
            });
        }
        Ok(result["result"]["value"].clone())
    }

    async fn mouse_event(&self, kind: &str, extra: Value) -> Result<(), BrowserError> {
        let (x, y) = *self.pointer.lock();
        let mut params = json!({ "type": kind, "x": x, "y": y });
        if let (Some(obj), Some(extra)) = (params.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                obj.insert(k.clone(), v.clone());
            }
        }
        self.send_cdp("Input.dispatchMouseEvent", params).await?;
        Ok(())
    }
}

#[async_trait]
impl AutomationPage for BrowserContext {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let result = self
            .send_cdp("Page.navigate", json!({ "url": url }))
            .await
            .map_err(|e| BrowserError::NavigationFailed {
                url: url.into(),
                reason: e.to_string(),
            })?;
        if let Some(error_text) = result["errorText"].as_str() {
            if !error_text.is_empty() {
                return Err(BrowserError::NavigationFailed {
                    url: url.into(),
                    reason: error_text.into(),
                });
            }
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn go_back(&self) -> Result<(), BrowserError> {
        let history = self
            .send_cdp("Page.getNavigationHistory", json!({}))
            .await?;
        let idx = history["currentIndex"].as_u64().unwrap_or(0) as usize;
        if idx > 0 {
            let entry_id = history["entries"][idx - 1]["id"].as_i64().unwrap_or(0);
            self.send_cdp(
                "Page.navigateToHistoryEntry",
                json!({ "entryId": entry_id }),
            )
            .await?;
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn go_forward(&self) -> Result<(), BrowserError> {
        let history = self
            .send_cdp("Page.getNavigationHistory", json!({}))
            .await?;
        let idx = history["currentIndex"].as_u64().unwrap_or(0) as usize;
        if let Some(entries) = history["entries"].as_array() {
            if idx + 1 < entries.len() {
                let entry_id = entries[idx + 1]["id"].as_i64().unwrap_or(0);
                self.send_cdp(
                    "Page.navigateToHistoryEntry",
                    json!({ "entryId": entry_id }),
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn reload(&self) -> Result<(), BrowserError> {
        self.send_cdp("Page.reload", json!({})).await?;
        Ok(())
    }

    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        *self.pointer.lock() = (x, y);
        self.mouse_event("mouseMoved", json!({})).await
    }

    async fn mouse_down(&self) -> Result<(), BrowserError> {
        self.mouse_event("mousePressed", json!({ "button": "left", "clickCount": 1 }))
            .await
    }

    async fn mouse_up(&self) -> Result<(), BrowserError> {
        self.mouse_event("mouseReleased", json!({ "button": "left", "clickCount": 1 }))
            .await
    }

    async fn wheel(&self, delta_x: f64, delta_y: f64) -> Result<(), BrowserError> {
        self.mouse_event("mouseWheel", json!({ "deltaX": delta_x, "deltaY": delta_y }))
            .await
    }

    async fn press_key(&self, key: &str) -> Result<(), BrowserError> {
        let mut down = json!({ "type": "keyDown", "key": key });
        // Single printable characters also carry text so they insert
        if key.chars().count() == 1 {
            down["text"] = json!(key);
        }
        self.send_cdp("Input.dispatchKeyEvent", down).await?;
        self.send_cdp("Input.dispatchKeyEvent", json!({ "type": "keyUp", "key": key }))
            .await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        let result = self
            .send_cdp("Page.captureScreenshot", json!({ "format": "png" }))
            .await?;
        let b64 = result["data"]
            .as_str()
            .ok_or_else(|| BrowserError::ActionFailed {
                action: "screenshot".into(),
                reason: "no data in response".into(),
            })?;
        base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| BrowserError::ActionFailed {
                action: "screenshot".into(),
                reason: format!("base64 decode: {e}"),
            })
    }

    async fn document_html(&self) -> Result<String, BrowserError> {
        let val = self
            .evaluate("document.documentElement.outerHTML")
            .await?;
        val.as_str()
            .map(String::from)
            .ok_or_else(|| BrowserError::ActionFailed {
                action: "document_html".into(),
                reason: "document did not serialize to a string".into(),
            })
    }

    async fn start_screencast(&self) -> Result<(), BrowserError> {
        self.send_cdp(
            "Page.startScreencast",
            json!({
                "format": self.screencast.format.as_str(),
                "quality": self.screencast.quality,
                "maxWidth": self.screencast.max_width,
                "maxHeight": self.screencast.max_height,
                "everyNthFrame": self.screencast.every_nth_frame,
            }),
        )
        .await?;
        Ok(())
    }

    async fn stop_screencast(&self) -> Result<(), BrowserError> {
        self.send_cdp("Page.stopScreencast", json!({})).await?;
        Ok(())
    }

    async fn ack_frame(&self, token: u64) -> Result<(), BrowserError> {
        self.send_cdp("Page.screencastFrameAck", json!({ "sessionId": token }))
            .await?;
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Closing the target and disposing the context are browser-level
        // commands; the page session is already unusable at this point.
        if let Err(e) = send_via(
            &self.cmd_tx,
            "Target.closeTarget",
            json!({ "targetId": self.target_id }),
            None,
        )
        .await
        {
            tracing::warn!(error = %e, "target close failed");
        }
        if let Err(e) = send_via(
            &self.cmd_tx,
            "Target.disposeBrowserContext",
            json!({ "browserContextId": self.browser_context_id }),
            None,
        )
        .await
        {
            tracing::warn!(error = %e, "browser context dispose failed");
        }
        self.handler.abort();
    }
}

/// Resolve the browser-level WebSocket URL, polling the DevTools HTTP
/// endpoint until it answers.
async fn discover_ws_url(endpoint: &str) -> Result<String, BrowserError> {
    if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        return Ok(endpoint.to_string());
    }

    let url = format!("{}/json/version", endpoint.trim_end_matches('/'));
    for _ in 0..20 {
        if let Ok(resp) = reqwest::get(&url).await {
            if let Ok(version) = resp.json::<Value>().await {
                if let Some(ws_url) = version["webSocketDebuggerUrl"].as_str() {
                    return Ok(ws_url.to_string());
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    Err(BrowserError::ConnectFailed {
        context: format!("no DevTools endpoint at {url}"),
    })
}

/// Queue a command and wait for its response.
async fn send_via(
    cmd_tx: &mpsc::Sender<CdpCommand>,
    method: &str,
    params: Value,
    session: Option<String>,
) -> Result<Value, BrowserError> {
    let (tx, rx) = oneshot::channel();
    cmd_tx
        .send(CdpCommand {
            method: method.into(),
            params,
            session,
            response_tx: tx,
        })
        .await
        .map_err(|_| BrowserError::Cdp("handler closed".into()))?;

    let result = tokio::time::timeout(COMMAND_TIMEOUT, rx)
        .await
        .map_err(|_| BrowserError::Timeout {
            timeout_ms: COMMAND_TIMEOUT.as_millis() as u64,
            context: format!("CDP {method}"),
        })?
        .map_err(|_| BrowserError::Cdp("response dropped".into()))?;

    result.map_err(BrowserError::Cdp)
}

/// CDP WebSocket handler loop.
///
/// Receives commands from the context, sends them over the socket, routes
/// responses back, and fans protocol events out to the frame and network
/// subscribers.
async fn cdp_handler_loop(
    ws: WsStream,
    mut cmd_rx: mpsc::Receiver<CdpCommand>,
    frame_tx: mpsc::Sender<ScreencastFrame>,
    net_tx: mpsc::Sender<NetworkEvent>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut pending: HashMap<u64, PendingTx> = HashMap::new();
    let next_id = AtomicU64::new(1);

    loop {
        tokio::select! {
            // Outgoing command from the context
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                let id = next_id.fetch_add(1, Ordering::Relaxed);
                let mut msg = json!({
                    "id": id,
                    "method": cmd.method,
                    "params": cmd.params,
                });
                if let Some(session) = cmd.session {
                    msg["sessionId"] = json!(session);
                }
                let _ = pending.insert(id, cmd.response_tx);
                if ws_tx.send(Message::Text(msg.to_string().into())).await.is_err() {
                    break;
                }
            }
            // Incoming message from the browser
            msg = ws_rx.next() => {
                let Some(Ok(msg)) = msg else { break };
                let Message::Text(text) = msg else { continue };
                let Ok(val): Result<Value, _> = serde_json::from_str(&text) else {
                    continue;
                };
                if let Some(id) = val.get("id").and_then(Value::as_u64) {
                    // Response to a command
                    if let Some(tx) = pending.remove(&id) {
                        if let Some(err) = val.get("error") {
                            let msg = err["message"].as_str().unwrap_or("CDP error");
                            let _ = tx.send(Err(msg.into()));
                        } else {
                            let _ = tx.send(Ok(val["result"].clone()));
                        }
                    }
                    continue;
                }
                // Protocol event
                let Some(method) = val.get("method").and_then(Value::as_str) else {
                    continue;
                };
                let params = &val["params"];
                if method == "Page.screencastFrame" {
                    let frame = ScreencastFrame {
                        data: params["data"].as_str().unwrap_or("").to_string(),
                        ack_token: params["sessionId"].as_u64().unwrap_or(0),
                        metadata: serde_json::from_value(params["metadata"].clone())
                            .unwrap_or_else(|_| FrameMetadata::default()),
                    };
                    if frame_tx.try_send(frame).is_err() {
                        // Frame buffer full or relay gone; the producer
                        // stalls until the next ack anyway.
                        tracing::debug!("dropping screencast frame, buffer full");
                    }
                } else if let Some(event) = NetworkEvent::from_cdp(method, params) {
                    if net_tx.try_send(event).is_err() {
                        tracing::debug!("dropping network event, buffer full");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_points_at_local_devtools() {
        let config = BrowserConfig::default();
        assert!(config.endpoint.starts_with("http://"));
        assert_eq!(config.viewport, Viewport::default());
    }

    #[tokio::test]
    async fn discover_passes_ws_urls_through() {
        let url = discover_ws_url("ws://browser:3000/chrome").await.unwrap();
        assert_eq!(url, "ws://browser:3000/chrome");
    }
}
