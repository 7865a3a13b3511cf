//! CLI command implementations for the `pocket-agent` binary.

pub mod auth;
pub mod config;
pub mod editor;
pub mod relay;
