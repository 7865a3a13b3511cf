//! Shared types for pocket-agent crates.
//!
//! - [`PocketConfig`]: the effective runtime configuration
//! - [`ConfigLoader`]: layered TOML + environment loading
//! - [`PocketError`]: errors raised while building configuration

pub mod config;
pub mod config_loader;
pub mod error;

pub use config::{DiscoverySettings, PocketConfig};
pub use config_loader::{ConfigLoader, ConfigSource, EffectiveConfig};
pub use error::PocketError;
