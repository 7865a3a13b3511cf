//! Reading the chat transcript out of an editor window.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::discovery::Target;
use crate::driver::PageDriver;
use crate::error::CdpError;

/// Element that holds the rendered conversation.
pub const CHAT_CONTAINER_SELECTOR: &str = "div.pane-body div.conversations";

/// Separator between workspace and conversation in a window title.
pub const TITLE_SEPARATOR: &str = " — ";

const UNTITLED_CHAT: &str = "Untitled Chat";

/// One window's transcript, ready to upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTranscript {
    pub html: String,
    pub name: String,
    /// The window's WebSocket debugger URL.
    pub id: String,
}

/// Expression returning the container's `outerHTML`, or `null` when absent.
pub fn chat_container_expression() -> String {
    format!(
        "(() => {{ const el = document.querySelector('{CHAT_CONTAINER_SELECTOR}'); return el ? el.outerHTML : null; }})()"
    )
}

/// Fetch the chat container markup of the window at `target_endpoint`.
///
/// `Ok(None)` when the container is missing or the page returned something
/// other than a string. The socket is closed whatever the outcome.
pub async fn extract_chat_html(target_endpoint: &str) -> Result<Option<String>, CdpError> {
    debug!(window = target_endpoint, "extracting chat markup");
    let page = PageDriver::connect(target_endpoint).await?;
    let outcome = page.evaluate(&chat_container_expression()).await;
    page.close().await;

    let html = html_from_value(outcome?);
    match &html {
        Some(markup) => debug!(window = target_endpoint, bytes = markup.len(), "chat markup extracted"),
        None => info!(window = target_endpoint, "chat container not found"),
    }
    Ok(html)
}

fn html_from_value(value: Value) -> Option<String> {
    match value {
        Value::String(html) => Some(html),
        Value::Null => None,
        other => {
            warn!(value = %other, "chat container evaluation returned a non-string value");
            None
        }
    }
}

/// Conversation name from a window title: the text after the last separator.
///
/// Falls back to the whole title, and to a placeholder for an empty one.
pub fn conversation_name(title: &str) -> String {
    let name = match title.rsplit_once(TITLE_SEPARATOR) {
        Some((_, tail)) if !tail.trim().is_empty() => tail.trim(),
        _ => title.trim(),
    };
    if name.is_empty() {
        UNTITLED_CHAT.to_string()
    } else {
        name.to_string()
    }
}

/// Extract a transcript from each target in turn.
///
/// A failing window is logged and skipped; windows without a chat container
/// are left out.
pub async fn read_transcripts(targets: &[Target]) -> Vec<ChatTranscript> {
    let mut transcripts = Vec::with_capacity(targets.len());
    for target in targets {
        match extract_chat_html(&target.url).await {
            Ok(Some(html)) => transcripts.push(ChatTranscript {
                html,
                name: conversation_name(&target.title),
                id: target.url.clone(),
            }),
            Ok(None) => {}
            Err(e) => warn!(window = %target.url, title = %target.title, error = %e, "failed to read chat transcript"),
        }
    }
    transcripts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_text_after_last_separator() {
        assert_eq!(conversation_name("pocket — main.rs — Fix the build"), "Fix the build");
        assert_eq!(conversation_name("Project — My Chat"), "My Chat");
    }

    #[test]
    fn name_falls_back_to_title() {
        assert_eq!(conversation_name("  Scratch window "), "Scratch window");
        assert_eq!(conversation_name("dash - not the separator"), "dash - not the separator");
        assert_eq!(conversation_name(""), "Untitled Chat");
    }

    #[test]
    fn blank_tail_keeps_full_title() {
        assert_eq!(conversation_name("Project —   "), "Project —");
    }

    #[test]
    fn expression_targets_chat_container() {
        let expr = chat_container_expression();
        assert!(expr.contains("document.querySelector('div.pane-body div.conversations')"));
        assert!(expr.contains("el.outerHTML"));
        assert!(expr.ends_with("})()"));
    }

    #[test]
    fn non_string_values_are_discarded() {
        assert_eq!(html_from_value(Value::String("<div/>".into())), Some("<div/>".to_string()));
        assert_eq!(html_from_value(Value::Null), None);
        assert_eq!(html_from_value(serde_json::json!(42)), None);
        assert_eq!(html_from_value(serde_json::json!({ "a": 1 })), None);
    }

    #[test]
    fn transcript_serializes_flat() {
        let t = ChatTranscript {
            html: "<div/>".into(),
            name: "My Chat".into(),
            id: "ws://h/1".into(),
        };
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v, serde_json::json!({ "html": "<div/>", "name": "My Chat", "id": "ws://h/1" }));
    }
}
