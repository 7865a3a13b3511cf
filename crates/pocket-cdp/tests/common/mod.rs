//! Scripted DevTools WebSocket server for integration tests.
//!
//! Each integration test file compiles common/ as its own module, so not
//! every helper is used in every file.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Something the server sends back after receiving a command.
#[derive(Debug, Clone)]
pub enum Frame {
    Text(String),
    Close(u16, &'static str),
}

/// Reply with a result object.
pub fn result(id: u64, result: Value) -> Frame {
    Frame::Text(json!({ "id": id, "result": result }).to_string())
}

/// Reply with a protocol error object.
pub fn rpc_error(id: u64, code: i64, message: &str) -> Frame {
    Frame::Text(json!({ "id": id, "error": { "code": code, "message": message } }).to_string())
}

pub fn raw(text: &str) -> Frame {
    Frame::Text(text.to_string())
}

pub fn close(code: u16, reason: &'static str) -> Frame {
    Frame::Close(code, reason)
}

/// A command the server received.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub id: u64,
    pub method: String,
    pub params: Value,
}

type Script = Box<dyn FnMut(u64, &str, &Value) -> Vec<Frame> + Send>;

/// Local WebSocket server answering commands through a script closure.
///
/// The closure gets `(id, method, params)` and returns the frames to send;
/// an empty vector leaves the command unanswered.
pub struct MockCdpServer {
    url: String,
    calls: Arc<Mutex<Vec<Recorded>>>,
    client_closes: Arc<AtomicUsize>,
    task: tokio::task::JoinHandle<()>,
}

impl MockCdpServer {
    pub async fn start<F>(script: F) -> Self
    where
        F: FnMut(u64, &str, &Value) -> Vec<Frame> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind mock DevTools server");
        let addr = listener.local_addr().expect("should have local addr");
        let url = format!("ws://{addr}/devtools/page/MOCK");

        let script: Arc<Mutex<Script>> = Arc::new(Mutex::new(Box::new(script)));
        let calls = Arc::new(Mutex::new(Vec::new()));
        let client_closes = Arc::new(AtomicUsize::new(0));

        let task = {
            let calls = Arc::clone(&calls);
            let client_closes = Arc::clone(&client_closes);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(serve(
                        stream,
                        Arc::clone(&script),
                        Arc::clone(&calls),
                        Arc::clone(&client_closes),
                    ));
                }
            })
        };

        Self {
            url,
            calls,
            client_closes,
            task,
        }
    }

    /// The page's WebSocket debugger URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.method).collect()
    }

    pub fn calls_to(&self, method: &str) -> Vec<Recorded> {
        self.calls().into_iter().filter(|c| c.method == method).collect()
    }

    /// Wait until the client has sent `count` close frames in total.
    pub async fn wait_for_client_closes(&self, count: usize) -> bool {
        for _ in 0..100 {
            if self.client_closes.load(Ordering::SeqCst) >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

impl Drop for MockCdpServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    stream: TcpStream,
    script: Arc<Mutex<Script>>,
    calls: Arc<Mutex<Vec<Recorded>>>,
    client_closes: Arc<AtomicUsize>,
) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };

    while let Some(Ok(msg)) = ws.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => {
                client_closes.fetch_add(1, Ordering::SeqCst);
                continue;
            }
            _ => continue,
        };

        let Ok(command) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        let id = command["id"].as_u64().unwrap_or(0);
        let method = command["method"].as_str().unwrap_or_default().to_string();
        let params = command.get("params").cloned().unwrap_or(Value::Null);
        calls.lock().unwrap().push(Recorded {
            id,
            method: method.clone(),
            params: params.clone(),
        });

        let frames = {
            let mut guard = script.lock().unwrap();
            let f: &mut Script = &mut guard;
            f(id, &method, &params)
        };

        for frame in frames {
            match frame {
                Frame::Text(text) => {
                    if ws.send(Message::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                Frame::Close(code, reason) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.to_string().into(),
                    };
                    let _ = ws.close(Some(frame)).await;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Editor page script
// ---------------------------------------------------------------------------

/// A chat input element on the fake page.
#[derive(Debug, Clone)]
pub struct FakeInput {
    pub selector: &'static str,
    pub node_id: i64,
    pub width: f64,
    pub height: f64,
}

impl FakeInput {
    pub fn visible(selector: &'static str, node_id: i64) -> Self {
        Self {
            selector,
            node_id,
            width: 400.0,
            height: 40.0,
        }
    }

    pub fn hidden(selector: &'static str, node_id: i64) -> Self {
        Self {
            selector,
            node_id,
            width: 0.0,
            height: 0.0,
        }
    }
}

/// Behaviour of a fake editor window.
#[derive(Debug, Clone, Default)]
pub struct EditorPage {
    pub inputs: Vec<FakeInput>,
    /// Full `Runtime.evaluate` result object.
    pub evaluate: Option<Value>,
    /// Selectors that match a node the page cannot lay out.
    pub detached: Vec<(&'static str, i64)>,
    /// Methods answered with a protocol error.
    pub failing: Vec<&'static str>,
}

impl EditorPage {
    pub fn with_input(mut self, input: FakeInput) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_detached(mut self, selector: &'static str, node_id: i64) -> Self {
        self.detached.push((selector, node_id));
        self
    }

    pub fn with_chat_html(mut self, html: &str) -> Self {
        self.evaluate = Some(json!({ "result": { "type": "string", "value": html } }));
        self
    }

    pub fn with_evaluate(mut self, result: Value) -> Self {
        self.evaluate = Some(result);
        self
    }

    pub fn failing(mut self, method: &'static str) -> Self {
        self.failing.push(method);
        self
    }

    pub fn script(self) -> impl FnMut(u64, &str, &Value) -> Vec<Frame> + Send + 'static {
        move |id, method, params| {
            if self.failing.iter().any(|m| *m == method) {
                return vec![rpc_error(id, -32000, "scripted failure")];
            }
            let reply = match method {
                "DOM.getDocument" => json!({ "root": { "nodeId": 1, "nodeName": "#document" } }),
                "DOM.querySelector" => {
                    let selector = params["selector"].as_str().unwrap_or_default();
                    let node_id = self
                        .inputs
                        .iter()
                        .find(|i| i.selector == selector)
                        .map(|i| i.node_id)
                        .or_else(|| {
                            self.detached
                                .iter()
                                .find(|(s, _)| *s == selector)
                                .map(|(_, node)| *node)
                        })
                        .unwrap_or(0);
                    json!({ "nodeId": node_id })
                }
                "DOM.getBoxModel" => {
                    let node_id = params["nodeId"].as_i64().unwrap_or(0);
                    match self.inputs.iter().find(|i| i.node_id == node_id) {
                        Some(input) => box_model(input.width, input.height),
                        None => return vec![rpc_error(id, -32000, "Could not compute box model.")],
                    }
                }
                "Runtime.evaluate" => self
                    .evaluate
                    .clone()
                    .unwrap_or_else(|| json!({ "result": { "type": "object", "subtype": "null", "value": null } })),
                _ => json!({}),
            };
            vec![result(id, reply)]
        }
    }
}

/// Box model at (100, 500) with the given size.
pub fn box_model(width: f64, height: f64) -> Value {
    let (x, y) = (100.0, 500.0);
    json!({
        "model": {
            "content": [x, y, x + width, y, x + width, y + height, x, y + height],
            "width": width,
            "height": height
        }
    })
}
