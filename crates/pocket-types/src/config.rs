//! Configuration types for a pocket-agent instance.
//!
//! [`PocketConfig`] controls where the editor's debug endpoint lives, where
//! the companion backend lives, and how target discovery ranks pages.

use pocket_cdp::discovery::{DEFAULT_TITLE_BLOCKLIST, DEVTOOLS_URL_PREFIX, MAIN_WINDOW_MARKER};
use serde::{Deserialize, Serialize};

pub use pocket_cdp::discovery::DEFAULT_DEBUG_PORT;

/// Default companion backend URL.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";

/// Default interval between relay passes.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PocketConfig {
    /// Base URL of the companion backend.
    pub server_url: String,
    /// Port the editor was started with (`--remote-debugging-port`).
    pub debug_port: u16,
    /// Milliseconds between relay passes.
    pub poll_interval_ms: u64,
    /// Bearer token for the backend, obtained through `sign-in`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// Page-ranking heuristics for target discovery.
    pub discovery: DiscoverySettings,
}

impl Default for PocketConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            debug_port: DEFAULT_DEBUG_PORT,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            api_token: None,
            discovery: DiscoverySettings::default(),
        }
    }
}

/// Heuristics used to pick the user-facing editor window(s).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// URL substring that marks a main editor window.
    pub main_window_marker: String,
    /// Case-insensitive title substrings of auxiliary pages.
    pub title_blocklist: Vec<String>,
    /// URL prefix of devtools-internal pages.
    pub excluded_url_prefix: String,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            main_window_marker: MAIN_WINDOW_MARKER.to_string(),
            title_blocklist: DEFAULT_TITLE_BLOCKLIST.iter().map(|s| s.to_string()).collect(),
            excluded_url_prefix: DEVTOOLS_URL_PREFIX.to_string(),
        }
    }
}
