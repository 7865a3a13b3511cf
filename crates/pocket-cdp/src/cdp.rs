//! Low-level CDP (Chrome DevTools Protocol) WebSocket client.
//!
//! Connects to one inspectable page of the editor and correlates
//! `{id, method, params}` commands with `{id, result}` / `{id, error}`
//! responses arriving on the same socket.
//!
//! Each in-flight command owns a [`Subscription`] in the client's registry.
//! The subscription is removed on every exit path: a matching response, a
//! protocol error, a socket error, a socket close, or the per-call timeout.
//! Dropping the guard is what removes it, so a call that is abandoned half-way
//! cannot leave a stale entry behind on a long-lived socket.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use crate::error::CdpError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Default time to wait for a command's response.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time to wait for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Close code reported when the stream ends without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;

/// Monotonic command id source.
///
/// Every [`CdpClient`] gets its own counter unless one is passed in through
/// [`CdpClient::connect_with`], in which case clients share the sequence.
#[derive(Debug, Clone)]
pub struct IdCounter(Arc<AtomicU64>);

impl IdCounter {
    /// A fresh counter whose first id is 1.
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(1)))
    }

    pub fn next_id(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for IdCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// A CDP command to send to the page.
#[derive(Debug, Serialize)]
struct CdpCommand<'a> {
    id: u64,
    method: &'a str,
    params: &'a Value,
}

/// A CDP response from the page.
#[derive(Debug, Clone)]
pub struct CdpResponse {
    pub id: u64,
    pub result: Option<Value>,
    pub error: Option<CdpResponseError>,
}

/// Error object in a CDP response.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpResponseError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Why the socket stopped carrying responses.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Disconnect {
    Closed { code: u16, reason: String },
    Errored(String),
}

impl Disconnect {
    fn into_error(self, method: &str) -> CdpError {
        match self {
            Disconnect::Closed { code, reason } => CdpError::SocketClosed {
                method: method.to_string(),
                code,
                reason,
            },
            Disconnect::Errored(reason) => CdpError::Socket {
                method: method.to_string(),
                reason,
            },
        }
    }
}

/// How a pending call was settled by the reader.
#[derive(Debug)]
enum Settlement {
    Response(CdpResponse),
    Disconnected(Disconnect),
}

/// One command awaiting its response.
#[derive(Debug)]
struct PendingCall {
    method: String,
    created_at: Instant,
    tx: oneshot::Sender<Settlement>,
}

/// Per-socket table of in-flight calls.
#[derive(Debug, Default)]
struct Registry {
    pending: HashMap<u64, PendingCall>,
    /// Set once the socket is gone; later calls fail immediately.
    disconnect: Option<Disconnect>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registration of one call in the [`Registry`]; removing it is tied to drop.
struct Subscription {
    id: u64,
    registry: Arc<Mutex<Registry>>,
}

impl Subscription {
    fn register(
        registry: &Arc<Mutex<Registry>>,
        id: u64,
        method: &str,
    ) -> Result<(Self, oneshot::Receiver<Settlement>), CdpError> {
        let mut guard = lock(registry);
        if let Some(disconnect) = guard.disconnect.clone() {
            return Err(disconnect.into_error(method));
        }
        if guard.pending.contains_key(&id) {
            return Err(CdpError::Protocol {
                detail: format!("command id {id} is already in flight on this socket"),
            });
        }
        let (tx, rx) = oneshot::channel();
        guard.pending.insert(
            id,
            PendingCall {
                method: method.to_string(),
                created_at: Instant::now(),
                tx,
            },
        );
        drop(guard);

        Ok((
            Self {
                id,
                registry: Arc::clone(registry),
            },
            rx,
        ))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        lock(&self.registry).pending.remove(&self.id);
    }
}

// ---------------------------------------------------------------------------
// CdpClient
// ---------------------------------------------------------------------------

/// CDP client bound to a single page's WebSocket debugger URL.
///
/// Commands may be issued concurrently from several tasks; responses are
/// matched back by id, and anything that is not a response to a pending
/// command (events, stray ids, malformed frames) is logged and dropped.
pub struct CdpClient {
    url: String,
    ids: IdCounter,
    registry: Arc<Mutex<Registry>>,
    writer: AsyncMutex<WsSink>,
    reader: tokio::task::JoinHandle<()>,
}

impl CdpClient {
    /// Connect with a fresh id counter and the default 5s handshake timeout.
    pub async fn connect(ws_url: &str) -> Result<Self, CdpError> {
        Self::connect_with(ws_url, IdCounter::new(), DEFAULT_CONNECT_TIMEOUT).await
    }

    /// Connect using the given id counter and handshake timeout.
    pub async fn connect_with(
        ws_url: &str,
        ids: IdCounter,
        connect_timeout: Duration,
    ) -> Result<Self, CdpError> {
        debug!(url = ws_url, "connecting to DevTools WebSocket");

        let (ws_stream, _) = tokio::time::timeout(
            connect_timeout,
            tokio_tungstenite::connect_async(ws_url),
        )
        .await
        .map_err(|_| {
            warn!(url = ws_url, "DevTools WebSocket connection timed out");
            CdpError::ConnectTimeout {
                url: ws_url.to_string(),
                duration: connect_timeout,
            }
        })?
        .map_err(|e| CdpError::ConnectionFailed {
            url: ws_url.to_string(),
            reason: e.to_string(),
        })?;

        let (writer, reader) = ws_stream.split();
        let registry = Arc::new(Mutex::new(Registry::default()));

        let reader_registry = Arc::clone(&registry);
        let reader_url = ws_url.to_string();
        let reader = tokio::spawn(async move {
            Self::read_loop(reader, reader_registry, reader_url).await;
        });

        info!(url = ws_url, "connected to DevTools WebSocket");

        Ok(Self {
            url: ws_url.to_string(),
            ids,
            registry,
            writer: AsyncMutex::new(writer),
            reader,
        })
    }

    /// The debugger URL this client is connected to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the socket is still usable.
    pub fn is_open(&self) -> bool {
        lock(&self.registry).disconnect.is_none()
    }

    /// Number of calls currently awaiting a response.
    pub fn pending_count(&self) -> usize {
        lock(&self.registry).pending.len()
    }

    /// Send a command and wait up to [`DEFAULT_COMMAND_TIMEOUT`] for its result.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, CdpError> {
        self.call_with_timeout(method, params, DEFAULT_COMMAND_TIMEOUT)
            .await
    }

    /// Send a command with a custom timeout.
    ///
    /// Exactly one outcome is produced per call. The registry entry is gone
    /// by the time this returns, whatever the outcome.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, CdpError> {
        let id = self.ids.next_id();
        let payload = serde_json::to_string(&CdpCommand {
            id,
            method,
            params: &params,
        })
        .map_err(|e| CdpError::Protocol {
            detail: format!("failed to serialize command: {e}"),
        })?;

        // Register before sending so a fast response cannot be missed.
        let (_subscription, rx) = Subscription::register(&self.registry, id, method)?;

        debug!(id, method, %params, "sending CDP command");
        {
            let mut writer = self.writer.lock().await;
            writer
                .send(Message::Text(payload.into()))
                .await
                .map_err(|e| CdpError::Socket {
                    method: method.to_string(),
                    reason: e.to_string(),
                })?;
        }

        let settlement = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(settlement)) => settlement,
            Ok(Err(_)) => {
                return Err(CdpError::Protocol {
                    detail: format!("response channel for {method} (id {id}) dropped"),
                })
            }
            Err(_) => {
                warn!(id, method, ?timeout, "timed out waiting for CDP response");
                return Err(CdpError::Timeout {
                    method: method.to_string(),
                    id,
                    duration: timeout,
                });
            }
        };

        match settlement {
            Settlement::Disconnected(disconnect) => Err(disconnect.into_error(method)),
            Settlement::Response(response) => {
                if let Some(err) = response.error {
                    warn!(id, method, code = err.code, message = %err.message, "CDP command failed");
                    return Err(CdpError::Rpc {
                        method: method.to_string(),
                        id,
                        code: err.code,
                        message: err.message,
                    });
                }
                Ok(response.result.unwrap_or(Value::Null))
            }
        }
    }

    /// Enable a CDP domain (e.g. "Page", "DOM", "Runtime").
    pub async fn enable_domain(&self, domain: &str) -> Result<(), CdpError> {
        self.call(&format!("{domain}.enable"), serde_json::json!({}))
            .await?;
        Ok(())
    }

    /// Send a close frame if the socket is still open.
    pub async fn close(&self) {
        if !self.is_open() {
            debug!(url = %self.url, "DevTools WebSocket already closed");
            return;
        }
        debug!(url = %self.url, "closing DevTools WebSocket");
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.close().await {
            debug!(url = %self.url, error = %e, "error while closing DevTools WebSocket");
        }
    }

    /// Background task that reads frames and settles pending calls.
    async fn read_loop(
        mut reader: SplitStream<WsStream>,
        registry: Arc<Mutex<Registry>>,
        url: String,
    ) {
        let disconnect = loop {
            let msg = match reader.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    warn!(url = %url, error = %e, "DevTools WebSocket error");
                    break Disconnect::Errored(e.to_string());
                }
                None => {
                    break Disconnect::Closed {
                        code: ABNORMAL_CLOSURE,
                        reason: "connection dropped".to_string(),
                    }
                }
            };

            match msg {
                Message::Text(text) => dispatch_frame(text.as_str(), &registry),
                Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                    Ok(text) => dispatch_frame(text, &registry),
                    Err(_) => warn!(url = %url, "ignoring non-UTF-8 binary frame"),
                },
                Message::Close(frame) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((ABNORMAL_CLOSURE, String::new()));
                    info!(url = %url, code, reason = %reason, "DevTools WebSocket closed by remote");
                    break Disconnect::Closed { code, reason };
                }
                _ => {}
            }
        };

        settle_all(&registry, disconnect);
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

// ---------------------------------------------------------------------------
// Frame dispatch
// ---------------------------------------------------------------------------

/// Route one inbound text frame to the pending call it answers, if any.
fn dispatch_frame(text: &str, registry: &Mutex<Registry>) {
    let json: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, frame = %truncate(text, 200), "ignoring malformed CDP message");
            return;
        }
    };

    let Some(response) = parse_cdp_response(&json) else {
        if let Some(method) = json.get("method").and_then(Value::as_str) {
            trace!(method, "ignoring CDP event");
        } else {
            debug!("ignoring CDP message with neither id nor method");
        }
        return;
    };

    let pending = lock(registry).pending.remove(&response.id);
    match pending {
        Some(call) => {
            debug!(
                id = response.id,
                method = %call.method,
                elapsed_ms = call.created_at.elapsed().as_millis() as u64,
                "received CDP response"
            );
            // The caller may have timed out between removal and send.
            let _ = call.tx.send(Settlement::Response(response));
        }
        None => debug!(id = response.id, "ignoring response for unknown command id"),
    }
}

/// Fail every pending call with the socket's terminal state.
fn settle_all(registry: &Mutex<Registry>, disconnect: Disconnect) {
    let mut guard = lock(registry);
    guard.disconnect = Some(disconnect.clone());
    for (id, call) in guard.pending.drain() {
        debug!(id, method = %call.method, "failing pending CDP command after disconnect");
        let _ = call.tx.send(Settlement::Disconnected(disconnect.clone()));
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// ---------------------------------------------------------------------------
// CDP protocol helpers
// ---------------------------------------------------------------------------

/// Build a CDP command message.
pub fn build_cdp_message(id: u64, method: &str, params: Value) -> Value {
    serde_json::json!({
        "id": id,
        "method": method,
        "params": params,
    })
}

/// Parse a CDP response JSON into its components.
pub fn parse_cdp_response(json: &Value) -> Option<CdpResponse> {
    let id = json.get("id")?.as_u64()?;
    Some(CdpResponse {
        id,
        result: json.get("result").cloned(),
        error: json
            .get("error")
            .and_then(|e| serde_json::from_value(e.clone()).ok()),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
