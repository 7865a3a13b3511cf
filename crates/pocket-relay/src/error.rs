//! Error types for the pocket-relay crate.

use thiserror::Error;

use pocket_cdp::CdpError;

/// Errors raised while talking to the backend or relaying into the editor.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend rejected the API token.
    #[error("backend rejected credentials (status {status}); sign in again")]
    Unauthorized { status: u16 },

    #[error("backend returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid backend URL: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Cdp(#[from] CdpError),
}

impl RelayError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RelayError::Unauthorized { .. })
    }
}
