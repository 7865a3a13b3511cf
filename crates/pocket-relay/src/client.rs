//! HTTP client for the pocket-agent backend.
//!
//! Three endpoints: transcript upload, outgoing-message polling per window,
//! and exchanging a GitHub token for a service token.

use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use pocket_cdp::ChatTranscript;

use crate::error::RelayError;

/// Upload body for `POST /api/chat/update`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatUpdate<'a> {
    #[serde(rename = "chatHTML")]
    chat_html: &'a str,
    chat_name: &'a str,
    window_id: &'a str,
}

/// Service credentials returned by the GitHub token exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCredentials {
    pub api_token: String,
    pub user_id: String,
}

/// Authenticated client for one backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
}

impl BackendClient {
    pub fn new(base_url: &str, api_token: Option<String>) -> Result<Self, RelayError> {
        let base_url =
            Url::parse(base_url).map_err(|e| RelayError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RelayError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            client: Client::new(),
            base_url,
            api_token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn has_token(&self) -> bool {
        self.api_token.is_some()
    }

    /// Upload one transcript.
    pub async fn post_chat_update(&self, transcript: &ChatTranscript) -> Result<(), RelayError> {
        let url = self.endpoint(&["api", "chat", "update"])?;
        let body = ChatUpdate {
            chat_html: &transcript.html,
            chat_name: &transcript.name,
            window_id: &transcript.id,
        };

        let response = self
            .authorized(self.client.post(url))
            .json(&body)
            .send()
            .await?;
        check_status(response).await?;

        debug!(name = %transcript.name, window = %transcript.id, "chat update delivered");
        Ok(())
    }

    /// Fetch the pending outgoing message for a window, if any.
    pub async fn poll_outgoing(&self, window_id: &str) -> Result<Option<String>, RelayError> {
        let url = self.endpoint(&["api", "commands", "poll-outgoing", window_id])?;
        let response = self.authorized(self.client.get(url)).send().await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let response = check_status(response).await?;

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let command: Value = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(e) => {
                warn!(window = window_id, error = %e, "outgoing message is not valid JSON");
                return Ok(None);
            }
        };

        match command.get("text").and_then(Value::as_str) {
            Some(text) if !text.is_empty() => Ok(Some(text.to_string())),
            _ => {
                warn!(window = window_id, body = %command, "outgoing message has no text field");
                Ok(None)
            }
        }
    }

    /// Trade a GitHub access token for backend credentials.
    pub async fn exchange_github_token(
        &self,
        github_token: &str,
    ) -> Result<ServiceCredentials, RelayError> {
        let url = self.endpoint(&["api", "auth", "vscode", "github-exchange"])?;
        let response = self
            .client
            .post(url)
            .bearer_auth(github_token)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Append path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RelayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RelayError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

async fn check_status(response: Response) -> Result<Response, RelayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(RelayError::Unauthorized {
            status: status.as_u16(),
        });
    }
    Err(RelayError::Api {
        status: status.as_u16(),
        body,
    })
}
