//! Page driver wrapping the CDP client.
//!
//! Thin typed wrappers over the handful of DOM, Input, Runtime, and Page
//! commands the injection and extraction flows use. Every method is one
//! protocol round-trip; sequencing lives in [`crate::inject`] and
//! [`crate::extract`].

use std::time::Duration;

use serde_json::Value;

use crate::cdp::CdpClient;
use crate::error::CdpError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Opaque handle to a DOM node, as returned by CDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub i64);

/// Geometry returned by `DOM.getBoxModel`.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxModel {
    pub width: f64,
    pub height: f64,
    /// Content quad: `[x1,y1, x2,y2, x3,y3, x4,y4]`.
    pub content: Vec<f64>,
}

impl BoxModel {
    /// Present and laid out with a non-zero area.
    ///
    /// Off-screen but rendered elements also pass.
    pub fn is_visible(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    /// Rounded center of the content quad, if the quad is usable.
    pub fn center(&self) -> Option<(f64, f64)> {
        center_of_quad(&self.content)
    }

    fn from_result(result: &Value) -> Result<Self, CdpError> {
        let model = result.get("model").ok_or_else(|| CdpError::Protocol {
            detail: "DOM.getBoxModel did not return a model".to_string(),
        })?;
        let content = model
            .get("content")
            .and_then(Value::as_array)
            .map(|quad| quad.iter().filter_map(Value::as_f64).collect())
            .unwrap_or_default();
        Ok(Self {
            width: model.get("width").and_then(Value::as_f64).unwrap_or(0.0),
            height: model.get("height").and_then(Value::as_f64).unwrap_or(0.0),
            content,
        })
    }
}

// ---------------------------------------------------------------------------
// PageDriver
// ---------------------------------------------------------------------------

/// Typed command surface for one connected page.
pub struct PageDriver {
    client: CdpClient,
}

impl PageDriver {
    /// Connect to a page's debugger URL with the default 5s handshake timeout.
    pub async fn connect(ws_url: &str) -> Result<Self, CdpError> {
        Ok(Self {
            client: CdpClient::connect(ws_url).await?,
        })
    }

    pub fn from_client(client: CdpClient) -> Self {
        Self { client }
    }

    /// The underlying client, for direct command access.
    pub fn client(&self) -> &CdpClient {
        &self.client
    }

    /// Enable Page, DOM, and Runtime, in that order.
    pub async fn enable_domains(&self) -> Result<(), CdpError> {
        self.client.enable_domain("Page").await?;
        self.client.enable_domain("DOM").await?;
        self.client.enable_domain("Runtime").await?;
        Ok(())
    }

    /// Fetch the full document tree and return its root node.
    pub async fn document_root(&self) -> Result<NodeId, CdpError> {
        let result = self
            .client
            .call("DOM.getDocument", serde_json::json!({ "depth": -1 }))
            .await?;

        result
            .get("root")
            .and_then(|r| r.get("nodeId"))
            .and_then(Value::as_i64)
            .filter(|id| *id != 0)
            .map(NodeId)
            .ok_or(CdpError::NoDocumentRoot)
    }

    /// Find the first element under `root` matching `selector`.
    ///
    /// CDP reports "no match" as node id 0, which maps to `Ok(None)`.
    pub async fn query_selector(
        &self,
        root: NodeId,
        selector: &str,
    ) -> Result<Option<NodeId>, CdpError> {
        let result = self
            .client
            .call(
                "DOM.querySelector",
                build_query_selector_params(root.0, selector),
            )
            .await?;

        let node_id = result.get("nodeId").and_then(Value::as_i64).unwrap_or(0);
        Ok((node_id != 0).then_some(NodeId(node_id)))
    }

    pub async fn box_model(&self, node: NodeId) -> Result<BoxModel, CdpError> {
        let result = self
            .client
            .call("DOM.getBoxModel", serde_json::json!({ "nodeId": node.0 }))
            .await?;
        BoxModel::from_result(&result)
    }

    pub async fn focus(&self, node: NodeId) -> Result<(), CdpError> {
        self.client
            .call("DOM.focus", serde_json::json!({ "nodeId": node.0 }))
            .await?;
        Ok(())
    }

    pub async fn scroll_into_view(&self, node: NodeId) -> Result<(), CdpError> {
        self.client
            .call(
                "DOM.scrollIntoViewIfNeeded",
                serde_json::json!({ "nodeId": node.0 }),
            )
            .await?;
        Ok(())
    }

    /// Insert the whole string as if typed by an IME, in one command.
    pub async fn insert_text(&self, text: &str) -> Result<(), CdpError> {
        self.client
            .call("Input.insertText", serde_json::json!({ "text": text }))
            .await?;
        Ok(())
    }

    /// Left-click at page coordinates: press then release.
    pub async fn click_at(&self, x: f64, y: f64, timeout: Duration) -> Result<(), CdpError> {
        for event_type in ["mousePressed", "mouseReleased"] {
            self.client
                .call_with_timeout(
                    "Input.dispatchMouseEvent",
                    build_click_params(x, y, event_type),
                    timeout,
                )
                .await?;
        }
        Ok(())
    }

    pub async fn dispatch_key_event(
        &self,
        params: Value,
        timeout: Duration,
    ) -> Result<(), CdpError> {
        self.client
            .call_with_timeout("Input.dispatchKeyEvent", params, timeout)
            .await?;
        Ok(())
    }

    /// Evaluate an expression in the page and return its value.
    ///
    /// A thrown exception becomes [`CdpError::JsException`] carrying the
    /// exception description, the details text, or a generic fallback.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, CdpError> {
        let result = self
            .client
            .call("Runtime.evaluate", build_evaluate_params(expression))
            .await?;
        evaluation_value(&result)
    }

    /// Close the socket if it is still open.
    pub async fn close(&self) {
        self.client.close().await;
    }
}

/// Interpret a `Runtime.evaluate` result.
pub fn evaluation_value(result: &Value) -> Result<Value, CdpError> {
    if let Some(details) = result.get("exceptionDetails") {
        let message = details
            .get("exception")
            .and_then(|e| e.get("description"))
            .and_then(Value::as_str)
            .or_else(|| details.get("text").and_then(Value::as_str))
            .unwrap_or("Unknown JavaScript execution error")
            .to_string();
        return Err(CdpError::JsException { message });
    }

    Ok(result
        .get("result")
        .and_then(|r| r.get("value"))
        .cloned()
        .unwrap_or(Value::Null))
}

// ---------------------------------------------------------------------------
// CDP parameter builders
// ---------------------------------------------------------------------------

/// Build CDP `Runtime.evaluate` parameters.
pub fn build_evaluate_params(expression: &str) -> Value {
    serde_json::json!({
        "expression": expression,
        "returnByValue": true,
        "awaitPromise": true,
    })
}

/// Build CDP `DOM.querySelector` parameters.
pub fn build_query_selector_params(root_node_id: i64, selector: &str) -> Value {
    serde_json::json!({
        "nodeId": root_node_id,
        "selector": selector,
    })
}

/// Build CDP `Input.dispatchMouseEvent` parameters for a left click at (x, y).
pub fn build_click_params(x: f64, y: f64, event_type: &str) -> Value {
    serde_json::json!({
        "type": event_type,
        "x": x,
        "y": y,
        "button": "left",
        "clickCount": 1,
    })
}

/// Center of a content quad, rounded to whole pixels.
///
/// Uses the first edge for x and the first and third vertices for y; needs
/// at least three vertices.
pub fn center_of_quad(quad: &[f64]) -> Option<(f64, f64)> {
    if quad.len() < 6 {
        return None;
    }
    let x = ((quad[0] + quad[2]) / 2.0).round();
    let y = ((quad[1] + quad[5]) / 2.0).round();
    Some((x, y))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_evaluate_params() {
        let params = build_evaluate_params("1 + 1");
        assert_eq!(params["expression"], "1 + 1");
        assert_eq!(params["returnByValue"], true);
        assert_eq!(params["awaitPromise"], true);
    }

    #[test]
    fn test_build_click_params() {
        let params = build_click_params(100.0, 200.0, "mousePressed");
        assert_eq!(params["type"], "mousePressed");
        assert_eq!(params["x"], 100.0);
        assert_eq!(params["y"], 200.0);
        assert_eq!(params["button"], "left");
        assert_eq!(params["clickCount"], 1);
    }

    #[test]
    fn center_of_axis_aligned_quad() {
        let quad = [50.0, 75.0, 250.0, 75.0, 250.0, 175.0, 50.0, 175.0];
        assert_eq!(center_of_quad(&quad), Some((150.0, 125.0)));
    }

    #[test]
    fn center_rounds_to_whole_pixels() {
        let quad = [10.0, 10.0, 21.0, 10.0, 21.0, 15.0, 10.0, 15.0];
        assert_eq!(center_of_quad(&quad), Some((16.0, 13.0)));
    }

    #[test]
    fn center_needs_three_vertices() {
        assert!(center_of_quad(&[0.0, 0.0, 100.0, 0.0]).is_none());
        assert!(center_of_quad(&[]).is_none());
    }

    #[test]
    fn box_model_parses_geometry() {
        let result = serde_json::json!({
            "model": {
                "content": [100.0, 200.0, 300.0, 200.0, 300.0, 400.0, 100.0, 400.0],
                "width": 200,
                "height": 200
            }
        });
        let model = BoxModel::from_result(&result).unwrap();
        assert!(model.is_visible());
        assert_eq!(model.center(), Some((200.0, 300.0)));
    }

    #[test]
    fn collapsed_box_model_is_not_visible() {
        let result = serde_json::json!({
            "model": { "content": [0, 0, 0, 0, 0, 0, 0, 0], "width": 0, "height": 18 }
        });
        assert!(!BoxModel::from_result(&result).unwrap().is_visible());
    }

    #[test]
    fn box_model_without_model_is_protocol_error() {
        let result = serde_json::json!({});
        assert!(matches!(
            BoxModel::from_result(&result),
            Err(CdpError::Protocol { .. })
        ));
    }

    #[test]
    fn evaluation_returns_value() {
        let result = serde_json::json!({ "result": { "type": "string", "value": "<div/>" } });
        assert_eq!(evaluation_value(&result).unwrap(), "<div/>");
    }

    #[test]
    fn evaluation_null_and_missing_value_are_null() {
        let null = serde_json::json!({ "result": { "type": "object", "subtype": "null", "value": null } });
        assert_eq!(evaluation_value(&null).unwrap(), Value::Null);
        let undefined = serde_json::json!({ "result": { "type": "undefined" } });
        assert_eq!(evaluation_value(&undefined).unwrap(), Value::Null);
    }

    #[test]
    fn evaluation_exception_prefers_description() {
        let result = serde_json::json!({
            "result": { "type": "object", "subtype": "error" },
            "exceptionDetails": {
                "text": "Uncaught",
                "exception": { "description": "ReferenceError: foo is not defined" }
            }
        });
        match evaluation_value(&result) {
            Err(CdpError::JsException { message }) => {
                assert_eq!(message, "ReferenceError: foo is not defined")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn evaluation_exception_falls_back_to_text_then_generic() {
        let text_only = serde_json::json!({ "exceptionDetails": { "text": "Uncaught SyntaxError" } });
        assert!(evaluation_value(&text_only)
            .unwrap_err()
            .to_string()
            .contains("Uncaught SyntaxError"));

        let bare = serde_json::json!({ "exceptionDetails": {} });
        assert!(evaluation_value(&bare)
            .unwrap_err()
            .to_string()
            .contains("Unknown JavaScript execution error"));
    }
}
