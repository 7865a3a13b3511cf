//! `pocket-agent relay` -- sync transcripts and deliver replies until Ctrl-C.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{info, warn};

use pocket_relay::{BackendClient, CdpBridge, Relay};
use pocket_types::PocketConfig;

pub async fn run(config: &PocketConfig) -> Result<()> {
    let backend = BackendClient::new(&config.server_url, config.api_token.clone())?;
    let relay = Relay::new(
        CdpBridge::from_config(config),
        backend,
        Duration::from_millis(config.poll_interval_ms),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received, stopping relay"),
            Err(e) => warn!(error = %e, "failed to listen for Ctrl-C; stopping relay"),
        }
        let _ = shutdown_tx.send(true);
    });

    relay.run(shutdown_rx).await;
    Ok(())
}
