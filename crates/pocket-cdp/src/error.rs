//! Error types for the pocket-cdp crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to an editor window over CDP.
#[derive(Debug, Error)]
pub enum CdpError {
    /// Failed to establish a WebSocket connection to the debug endpoint.
    #[error("failed to connect to DevTools at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// The WebSocket handshake did not complete in time.
    #[error("timed out after {duration:?} connecting to DevTools at {url}")]
    ConnectTimeout { url: String, duration: Duration },

    /// The protocol answered a command with an explicit error object.
    #[error("CDP error for {method} (id {id}): {message} (code {code})")]
    Rpc {
        method: String,
        id: u64,
        code: i64,
        message: String,
    },

    /// No response with a matching id arrived before the deadline.
    #[error("timed out after {duration:?} waiting for CDP response to {method} (id {id})")]
    Timeout {
        method: String,
        id: u64,
        duration: Duration,
    },

    /// The socket reported an error while a command was in flight.
    #[error("CDP WebSocket error during {method}: {reason}")]
    Socket { method: String, reason: String },

    /// The socket closed while a command was in flight.
    #[error("CDP WebSocket closed during {method}: {code} {reason}")]
    SocketClosed {
        method: String,
        code: u16,
        reason: String,
    },

    /// Serialization or unexpected message shape.
    #[error("CDP protocol error: {detail}")]
    Protocol { detail: String },

    /// The evaluated expression threw inside the page.
    #[error("JavaScript execution error: {message}")]
    JsException { message: String },

    /// `DOM.getDocument` returned no usable root node.
    #[error("could not get document node from target page")]
    NoDocumentRoot,

    /// None of the chat input selectors matched a visible element.
    #[error("chat input element not found or not visible (tried {tried} selectors)")]
    InputNotFound { tried: usize },
}
