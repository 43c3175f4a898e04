//! In-process mock browser for integration tests.
//!
//! Binds a websocket server on `127.0.0.1:0` and answers the `Target` and
//! `Browser` commands the client issues. Every accepted socket is served by
//! its own task; the request path tells browser-level sockets
//! (`/devtools/browser/...`) from page sockets (`/devtools/page/{id}`).
//!
//! Test-only methods:
//!
//! | Method | Behavior |
//! |--------|----------|
//! | `Test.echo` | Result is the params |
//! | `Test.hang` | Never answered |
//! | anything else unknown | `-32601` error |

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

// ============================================================================
// State
// ============================================================================

/// A target the mock browser knows.
#[derive(Debug, Clone)]
pub struct MockTarget {
    pub id: String,
    pub url: String,
    pub context: Option<String>,
    pub session: Option<String>,
}

/// One command the mock received.
#[derive(Debug, Clone)]
pub struct Received {
    pub path: String,
    pub method: String,
    pub session_id: Option<String>,
    pub params: Value,
}

#[derive(Default)]
struct MockState {
    next: u64,
    targets: Vec<MockTarget>,
    contexts: Vec<String>,
    received: Vec<Received>,
    peers: Vec<(String, mpsc::UnboundedSender<Message>)>,
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next += 1;
        format!("{prefix}{}", self.next)
    }

    fn info(target: &MockTarget, attached: bool) -> Value {
        let mut info = json!({
            "targetId": target.id,
            "type": "page",
            "title": "",
            "url": target.url,
            "attached": attached,
        });
        if let Some(context) = &target.context {
            info["browserContextId"] = json!(context);
        }
        info
    }
}

// ============================================================================
// MockBrowser
// ============================================================================

/// Mock browser endpoint.
#[derive(Clone)]
pub struct MockBrowser {
    port: u16,
    state: Arc<Mutex<MockState>>,
}

impl MockBrowser {
    /// Binds and starts accepting websocket clients.
    pub async fn start() -> Self {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = TcpListener::bind(addr).await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let mock = Self {
            port,
            state: Arc::new(Mutex::new(MockState::default())),
        };

        let accept = mock.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let peer = accept.clone();
                tokio::spawn(async move { peer.serve(stream).await });
            }
        });

        mock
    }

    /// Browser-level websocket URL.
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/devtools/browser/mock", self.port)
    }

    /// `host:port` of the endpoint.
    pub fn host_port(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// Commands received so far.
    pub fn received(&self) -> Vec<Received> {
        self.state.lock().received.clone()
    }

    /// How many times `method` was received.
    pub fn count(&self, method: &str) -> usize {
        self.state
            .lock()
            .received
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    /// Targets alive in the mock browser.
    pub fn targets(&self) -> Vec<MockTarget> {
        self.state.lock().targets.clone()
    }

    /// Browser contexts alive in the mock browser.
    pub fn contexts(&self) -> Vec<String> {
        self.state.lock().contexts.clone()
    }

    /// Paths of sockets accepted so far.
    pub fn paths(&self) -> Vec<String> {
        self.state
            .lock()
            .peers
            .iter()
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Adds a target the client did not create.
    pub fn add_target(&self, url: &str) -> String {
        let mut state = self.state.lock();
        let id = state.next_id("EXT");
        state.targets.push(MockTarget {
            id: id.clone(),
            url: url.to_string(),
            context: None,
            session: None,
        });
        id
    }

    /// Sends an event frame to every browser-level socket.
    pub fn emit(&self, frame: Value) {
        let state = self.state.lock();
        for (path, peer) in &state.peers {
            if path.starts_with("/devtools/browser") {
                let _ = peer.send(Message::Text(frame.to_string().into()));
            }
        }
    }

    /// Sends an event frame to the page socket of `target_id`.
    pub fn emit_page(&self, target_id: &str, frame: Value) {
        let wanted = format!("/devtools/page/{target_id}");
        let state = self.state.lock();
        for (path, peer) in &state.peers {
            if *path == wanted {
                let _ = peer.send(Message::Text(frame.to_string().into()));
            }
        }
    }

    /// Destroys a target as if the browser closed it on its own.
    pub fn destroy_target(&self, target_id: &str) {
        let removed = {
            let mut state = self.state.lock();
            let index = state.targets.iter().position(|t| t.id == target_id);
            index.map(|i| state.targets.remove(i))
        };

        if let Some(target) = removed {
            if let Some(session) = target.session {
                self.emit(json!({
                    "method": "Target.detachedFromTarget",
                    "params": {"sessionId": session, "targetId": target.id}
                }));
            }
            self.emit(json!({
                "method": "Target.targetDestroyed",
                "params": {"targetId": target.id}
            }));
        }
    }

    async fn serve(self, stream: TcpStream) {
        let mut path = String::new();
        let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            path = request.uri().path().to_string();
            Ok(response)
        };
        let Ok(ws) = accept_hdr_async(stream, callback).await else {
            return;
        };

        let (mut write, mut read) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        self.state.lock().peers.push((path.clone(), tx.clone()));

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if write.send(message).await.is_err() {
                    break;
                }
            }
        });

        while let Some(Ok(message)) = read.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            let Ok(request) = serde_json::from_str::<Value>(text.as_str()) else {
                continue;
            };
            for frame in self.handle(&path, &request) {
                let _ = tx.send(Message::Text(frame.to_string().into()));
            }
        }
    }

    /// Produces the frames answering one command.
    fn handle(&self, path: &str, request: &Value) -> Vec<Value> {
        let id = request["id"].clone();
        let method = request["method"].as_str().unwrap_or_default().to_string();
        let params = request["params"].clone();
        let session_id = request["sessionId"].as_str().map(str::to_string);

        let mut state = self.state.lock();
        state.received.push(Received {
            path: path.to_string(),
            method: method.clone(),
            session_id: session_id.clone(),
            params: params.clone(),
        });

        let mut events = Vec::new();
        let result = match method.as_str() {
            "Target.setDiscoverTargets" | "Target.detachFromTarget" => Ok(json!({})),

            "Target.createBrowserContext" => {
                let context = state.next_id("CTX");
                state.contexts.push(context.clone());
                Ok(json!({ "browserContextId": context }))
            }

            "Target.disposeBrowserContext" => {
                let context = params["browserContextId"].as_str().unwrap_or_default();
                state.contexts.retain(|c| c != context);
                Ok(json!({}))
            }

            "Target.createTarget" => {
                let target_id = state.next_id("T");
                state.targets.push(MockTarget {
                    id: target_id.clone(),
                    url: params["url"].as_str().unwrap_or_default().to_string(),
                    context: params["browserContextId"].as_str().map(str::to_string),
                    session: None,
                });
                Ok(json!({ "targetId": target_id }))
            }

            "Target.attachToTarget" => {
                let target_id = params["targetId"].as_str().unwrap_or_default().to_string();
                let session = state.next_id("S");
                match state.targets.iter_mut().find(|t| t.id == target_id) {
                    Some(target) => {
                        target.session = Some(session.clone());
                        let info = MockState::info(target, true);
                        events.push(json!({
                            "method": "Target.attachedToTarget",
                            "params": {
                                "sessionId": session,
                                "targetInfo": info,
                                "waitingForDebugger": false
                            }
                        }));
                        Ok(json!({ "sessionId": session }))
                    }
                    None => Err((-32602, format!("No target with given id found: {target_id}"))),
                }
            }

            "Target.closeTarget" => {
                let target_id = params["targetId"].as_str().unwrap_or_default().to_string();
                match state.targets.iter().position(|t| t.id == target_id) {
                    Some(index) => {
                        let target = state.targets.remove(index);
                        if let Some(session) = target.session {
                            events.push(json!({
                                "method": "Target.detachedFromTarget",
                                "params": {"sessionId": session, "targetId": target.id}
                            }));
                        }
                        events.push(json!({
                            "method": "Target.targetDestroyed",
                            "params": {"targetId": target.id}
                        }));
                        Ok(json!({ "success": true }))
                    }
                    None => Err((-32602, "No target with given id found".to_string())),
                }
            }

            "Target.getTargets" => {
                let infos: Vec<Value> = state
                    .targets
                    .iter()
                    .map(|t| MockState::info(t, t.session.is_some()))
                    .collect();
                Ok(json!({ "targetInfos": infos }))
            }

            "Target.getTargetInfo" => {
                let target_id = params["targetId"].as_str().unwrap_or_default();
                match state.targets.iter().find(|t| t.id == target_id) {
                    Some(target) => Ok(json!({
                        "targetInfo": MockState::info(target, target.session.is_some())
                    })),
                    None => Err((-32602, "No target with given id found".to_string())),
                }
            }

            "Browser.getVersion" => Ok(json!({
                "protocolVersion": "1.3",
                "product": "MockChrome/1.0",
                "revision": "@mock",
                "userAgent": "Mozilla/5.0 MockChrome",
                "jsVersion": "12.0"
            })),

            "Test.echo" => Ok(params),

            "Test.hang" => return Vec::new(),

            other => Err((-32601, format!("'{other}' wasn't found"))),
        };

        let mut response = match result {
            Ok(result) => json!({ "id": id, "result": result }),
            Err((code, message)) => json!({ "id": id, "error": { "code": code, "message": message } }),
        };
        if let Some(session_id) = session_id {
            response["sessionId"] = json!(session_id);
        }

        let mut frames = vec![response];
        frames.extend(events);
        frames
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Polls `condition` until it holds or two seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Installs a test log subscriber honoring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
