//! Finding the editor window(s) behind a remote-debugging port.
//!
//! Queries `http://<host>:<port>/json/list` and ranks the inspectable pages:
//!
//! 1. Every `page` whose URL carries the main-window marker, in endpoint order.
//! 2. Otherwise the first page that is neither blocklisted by title nor a
//!    devtools-internal URL.
//! 3. Otherwise the first page of any kind.
//!
//! Pages without a WebSocket debugger URL are never returned. Discovery never
//! fails: every problem is logged and yields an empty list.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Title used when a page has neither a title nor a URL.
const UNTITLED_PAGE: &str = "Untitled Page";

/// Port the editor is launched with (`--remote-debugging-port`).
pub const DEFAULT_DEBUG_PORT: u16 = 9223;

/// URL substring of a main editor window.
pub const MAIN_WINDOW_MARKER: &str = "workbench.html";

/// Title substrings of auxiliary pages, matched case-insensitively.
pub const DEFAULT_TITLE_BLOCKLIST: &[&str] = &["assistant-ui", "extension-host", "developer tools"];

/// URL prefix of devtools-internal pages.
pub const DEVTOOLS_URL_PREFIX: &str = "devtools://";

/// One inspectable page the caller can connect to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// WebSocket debugger URL; doubles as the window id.
    pub url: String,
    pub title: String,
}

/// One entry of the `/json/list` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PageEntry {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub web_socket_debugger_url: Option<String>,
}

impl PageEntry {
    fn display_title(&self) -> String {
        if !self.title.is_empty() {
            self.title.clone()
        } else if !self.url.is_empty() {
            self.url.clone()
        } else {
            UNTITLED_PAGE.to_string()
        }
    }

    fn to_target(&self) -> Option<Target> {
        let url = self.web_socket_debugger_url.as_deref().filter(|u| !u.is_empty())?;
        Some(Target {
            url: url.to_string(),
            title: self.display_title(),
        })
    }
}

/// Where to look and how to rank what is found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub host: String,
    pub debug_port: u16,
    pub main_window_marker: String,
    /// Lower-case title substrings of auxiliary pages.
    pub title_blocklist: Vec<String>,
    pub excluded_url_prefix: String,
    pub request_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            debug_port: DEFAULT_DEBUG_PORT,
            main_window_marker: MAIN_WINDOW_MARKER.to_string(),
            title_blocklist: DEFAULT_TITLE_BLOCKLIST.iter().map(|s| s.to_string()).collect(),
            excluded_url_prefix: DEVTOOLS_URL_PREFIX.to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl DiscoveryConfig {
    pub fn list_url(&self) -> String {
        format!("http://{}:{}/json/list", self.host, self.debug_port)
    }

    fn is_blocklisted(&self, page: &PageEntry) -> bool {
        let title = page.title.to_lowercase();
        self.title_blocklist
            .iter()
            .any(|kw| title.contains(&kw.to_lowercase()))
    }
}

/// HTTP client for the debug endpoint.
#[derive(Debug, Clone)]
pub struct TargetDiscovery {
    client: reqwest::Client,
    config: DiscoveryConfig,
}

impl TargetDiscovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Fetch and rank the page list. Never fails; problems yield `[]`.
    pub async fn discover(&self) -> Vec<Target> {
        let list_url = self.config.list_url();
        debug!(url = %list_url, "querying editor debug targets");

        let response = match self
            .client
            .get(&list_url)
            .timeout(self.config.request_timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    url = %list_url,
                    error = %e,
                    "editor debug port not reachable; is the editor running with --remote-debugging-port={}?",
                    self.config.debug_port
                );
                return Vec::new();
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(url = %list_url, %status, "editor debug port returned an error status");
            return Vec::new();
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(url = %list_url, error = %e, "failed to read debug target list");
                return Vec::new();
            }
        };
        if body.trim().is_empty() {
            warn!(url = %list_url, "debug target list is empty");
            return Vec::new();
        }

        let entries: Vec<PageEntry> = match serde_json::from_str(&body) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(url = %list_url, error = %e, "debug target list is not a JSON array of targets");
                return Vec::new();
            }
        };

        select_targets(&entries, &self.config)
    }
}

/// Rank `/json/list` entries and pick the user-facing window(s).
pub fn select_targets(entries: &[PageEntry], config: &DiscoveryConfig) -> Vec<Target> {
    if entries.is_empty() {
        warn!("no editor windows found on debug port");
        return Vec::new();
    }

    let pages: Vec<&PageEntry> = entries.iter().filter(|e| e.kind == "page").collect();
    if pages.is_empty() {
        warn!(targets = entries.len(), "no 'page' targets on debug port");
        return Vec::new();
    }

    let main_windows: Vec<&PageEntry> = pages
        .iter()
        .copied()
        .filter(|p| p.url.contains(&config.main_window_marker))
        .collect();

    let selected: Vec<&PageEntry> = if !main_windows.is_empty() {
        info!(count = main_windows.len(), "found main editor window page(s)");
        main_windows
    } else if let Some(preferred) = pages
        .iter()
        .copied()
        .find(|p| !config.is_blocklisted(p) && !p.url.starts_with(&config.excluded_url_prefix))
    {
        info!(title = %preferred.display_title(), "no main window; using first suitable page");
        vec![preferred]
    } else {
        let first = pages[0];
        warn!(
            title = %first.display_title(),
            "no main window or suitable page; falling back to first page, which may not be the editor"
        );
        vec![first]
    };

    let targets: Vec<Target> = selected.iter().filter_map(|p| p.to_target()).collect();
    if targets.len() != selected.len() {
        warn!(
            dropped = selected.len() - targets.len(),
            "selected page(s) have no WebSocket debugger URL"
        );
    }
    if targets.is_empty() {
        warn!("no usable debug target with a WebSocket debugger URL");
        return targets;
    }

    for (index, target) in targets.iter().enumerate() {
        debug!(index, title = %target.title, url = %target.url, "selected debug target");
    }
    targets
}
