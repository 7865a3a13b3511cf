//! Error types shared across pocket-agent crates.

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum PocketError {
    #[error("configuration error: {0}")]
    ConfigError(String),
}
