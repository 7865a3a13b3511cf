//! Seam between relay orchestration and the editor.

use async_trait::async_trait;

use pocket_cdp::{ChatTranscript, DiscoveryConfig, Target, TargetDiscovery};
use pocket_types::PocketConfig;

use crate::error::RelayError;

/// Operations the relay needs from the editor.
#[async_trait]
pub trait EditorBridge: Send + Sync {
    /// Current editor windows; empty when none are reachable.
    async fn discover(&self) -> Vec<Target>;

    /// Transcripts of the given windows; failing windows are left out.
    async fn read_transcripts(&self, targets: &[Target]) -> Vec<ChatTranscript>;

    /// Type `text` into a window's chat input and submit it.
    async fn send_text(&self, target: &Target, text: &str) -> Result<(), RelayError>;
}

/// [`EditorBridge`] backed by the DevTools protocol.
#[derive(Debug, Clone)]
pub struct CdpBridge {
    discovery: TargetDiscovery,
}

impl CdpBridge {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            discovery: TargetDiscovery::new(config),
        }
    }

    pub fn from_config(config: &PocketConfig) -> Self {
        Self::new(discovery_config(config))
    }
}

#[async_trait]
impl EditorBridge for CdpBridge {
    async fn discover(&self) -> Vec<Target> {
        self.discovery.discover().await
    }

    async fn read_transcripts(&self, targets: &[Target]) -> Vec<ChatTranscript> {
        pocket_cdp::read_transcripts(targets).await
    }

    async fn send_text(&self, target: &Target, text: &str) -> Result<(), RelayError> {
        pocket_cdp::send_text(&target.url, text).await?;
        Ok(())
    }
}

/// Discovery settings derived from the loaded configuration.
pub fn discovery_config(config: &PocketConfig) -> DiscoveryConfig {
    DiscoveryConfig {
        debug_port: config.debug_port,
        main_window_marker: config.discovery.main_window_marker.clone(),
        title_blocklist: config.discovery.title_blocklist.clone(),
        excluded_url_prefix: config.discovery.excluded_url_prefix.clone(),
        ..DiscoveryConfig::default()
    }
}
