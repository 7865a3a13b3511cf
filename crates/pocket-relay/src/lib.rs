//! Relay between editor windows and the pocket-agent backend.
//!
//! - **`client`**: `BackendClient`, the authenticated HTTP surface.
//! - **`bridge`**: the `EditorBridge` seam and its DevTools-backed `CdpBridge`.
//! - **`runner`**: `Relay`, the periodic sync and delivery loop.
//!
//! Failures inside a pass are logged and skipped here; the editor-side crate
//! only ever reports them.

pub mod bridge;
pub mod client;
pub mod error;
pub mod runner;

pub use bridge::{discovery_config, CdpBridge, EditorBridge};
pub use client::{BackendClient, ServiceCredentials};
pub use error::RelayError;
pub use runner::Relay;
