//! Typing a message into an editor window's chat input.
//!
//! The sequence is linear: connect, enable domains, resolve the document,
//! search the selector list for a visible input, optionally click it, focus,
//! insert the text, then press Enter. Any failure after connecting aborts the
//! sequence; the socket is closed whatever the outcome.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::driver::{BoxModel, NodeId, PageDriver};
use crate::error::CdpError;

/// Timeout for each synthetic mouse and key event.
pub const INPUT_EVENT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Pause after clicking so the editor widget can switch into edit mode.
pub const CLICK_SETTLE_DELAY: Duration = Duration::from_millis(300);

/// One candidate chat input, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSelector {
    pub selector: &'static str,
    /// The widget only accepts input after a real click.
    pub requires_click: bool,
}

impl InputSelector {
    pub const fn new(selector: &'static str) -> Self {
        Self {
            selector,
            requires_click: false,
        }
    }

    pub const fn clicked(selector: &'static str) -> Self {
        Self {
            selector,
            requires_click: true,
        }
    }
}

/// Chat input selectors, most specific first.
pub const DEFAULT_INPUT_SELECTORS: &[InputSelector] = &[
    InputSelector::clicked(".aislash-editor-input"),
    InputSelector::new(".aiprompt-editor textarea"),
    InputSelector::new("div.chat-input-widget textarea"),
    InputSelector::new("div.pane-body.composite.panel div.chat-input-part textarea"),
    InputSelector::new("textarea[placeholder*=\"Send a message\"]"),
    InputSelector::new("textarea[aria-label*=\"Chat message input\"]"),
    InputSelector::new("textarea[data-testid*=\"chat-input\"]"),
];

/// The input element chosen for one injection.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedInput {
    pub node: NodeId,
    pub selector: InputSelector,
    pub box_model: BoxModel,
}

/// `keyDown`, `char`, `keyUp` for the Enter key.
pub fn enter_key_events() -> [Value; 3] {
    [
        serde_json::json!({
            "type": "keyDown",
            "key": "Enter",
            "code": "Enter",
            "windowsVirtualKeyCode": 13,
            "nativeVirtualKeyCode": 13,
            "text": "\r",
        }),
        serde_json::json!({ "type": "char", "text": "\r" }),
        serde_json::json!({
            "type": "keyUp",
            "key": "Enter",
            "code": "Enter",
            "windowsVirtualKeyCode": 13,
            "nativeVirtualKeyCode": 13,
        }),
    ]
}

/// Send `text` to the chat input of the window at `target_endpoint`.
pub async fn send_text(target_endpoint: &str, text: &str) -> Result<(), CdpError> {
    send_text_with(target_endpoint, text, DEFAULT_INPUT_SELECTORS).await
}

/// Like [`send_text`] with a caller-supplied selector list.
pub async fn send_text_with(
    target_endpoint: &str,
    text: &str,
    selectors: &[InputSelector],
) -> Result<(), CdpError> {
    info!(
        window = target_endpoint,
        message = %preview(text),
        "sending message to editor window"
    );
    let page = PageDriver::connect(target_endpoint).await?;
    let outcome = run_injection(&page, text, selectors).await;
    page.close().await;

    match &outcome {
        Ok(()) => info!(window = target_endpoint, "message submitted"),
        Err(e) => warn!(window = target_endpoint, error = %e, "message injection failed"),
    }
    outcome
}

/// Run the injection sequence over an already-connected page.
pub async fn run_injection(
    page: &PageDriver,
    text: &str,
    selectors: &[InputSelector],
) -> Result<(), CdpError> {
    page.enable_domains().await?;
    let root = page.document_root().await?;

    let input = find_visible_input(page, root, selectors)
        .await?
        .ok_or(CdpError::InputNotFound {
            tried: selectors.len(),
        })?;
    info!(
        selector = input.selector.selector,
        node = input.node.0,
        "found visible chat input"
    );

    if input.selector.requires_click {
        click_input(page, &input).await;
    }

    page.focus(input.node).await?;
    page.scroll_into_view(input.node).await?;

    debug!(chars = text.chars().count(), "inserting message text");
    page.insert_text(text).await?;

    for event in enter_key_events() {
        page.dispatch_key_event(event, INPUT_EVENT_TIMEOUT).await?;
    }
    Ok(())
}

/// Walk `selectors` in order and return the first match with a non-zero box.
///
/// A selector whose query or box-model lookup fails is skipped like a miss.
pub async fn find_visible_input(
    page: &PageDriver,
    root: NodeId,
    selectors: &[InputSelector],
) -> Result<Option<MatchedInput>, CdpError> {
    for candidate in selectors {
        debug!(selector = candidate.selector, "trying chat input selector");

        let node = match page.query_selector(root, candidate.selector).await {
            Ok(Some(node)) => node,
            Ok(None) => continue,
            Err(e) => {
                warn!(selector = candidate.selector, error = %e, "selector query failed");
                continue;
            }
        };

        let box_model = match page.box_model(node).await {
            Ok(model) => model,
            Err(e) => {
                warn!(selector = candidate.selector, error = %e, "box model lookup failed");
                continue;
            }
        };

        if !box_model.is_visible() {
            debug!(
                selector = candidate.selector,
                width = box_model.width,
                height = box_model.height,
                "matched element has no visible area"
            );
            continue;
        }

        return Ok(Some(MatchedInput {
            node,
            selector: *candidate,
            box_model,
        }));
    }
    Ok(None)
}

/// Click the center of the input; failures are logged, never fatal.
async fn click_input(page: &PageDriver, input: &MatchedInput) {
    let Some((x, y)) = input.box_model.center() else {
        warn!(
            selector = input.selector.selector,
            "no usable content quad to click; continuing without click"
        );
        return;
    };

    debug!(selector = input.selector.selector, x, y, "clicking chat input");
    match page.click_at(x, y, INPUT_EVENT_TIMEOUT).await {
        Ok(()) => tokio::time::sleep(CLICK_SETTLE_DELAY).await,
        Err(e) => warn!(selector = input.selector.selector, error = %e, "click on chat input failed"),
    }
}

/// First 50 characters of a message, for logs.
pub fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(50).collect();
    if text.chars().count() > 50 {
        out.push_str("...");
    }
    out
}
