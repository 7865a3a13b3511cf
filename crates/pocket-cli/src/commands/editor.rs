//! Commands that talk to the editor directly.
//!
//! `pocket-agent targets`            -- list discovered editor windows
//! `pocket-agent read`               -- dump each window's chat transcript
//! `pocket-agent send --window URL`  -- type a message into one window

use anyhow::{Context, Result};

use pocket_cdp::TargetDiscovery;
use pocket_relay::discovery_config;
use pocket_types::PocketConfig;

/// Run `pocket-agent targets`.
pub async fn targets(config: &PocketConfig, json: bool) -> Result<()> {
    let discovery = TargetDiscovery::new(discovery_config(config));
    let targets = discovery.discover().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&targets)?);
        return Ok(());
    }

    if targets.is_empty() {
        println!(
            "No editor windows found at {}.",
            discovery.config().list_url()
        );
        println!("Start the editor with --remote-debugging-port={}.", config.debug_port);
        return Ok(());
    }

    for (i, target) in targets.iter().enumerate() {
        println!("[{i}] {}", target.title);
        println!("    {}", target.url);
    }
    Ok(())
}

/// Run `pocket-agent read`.
pub async fn read(config: &PocketConfig, json: bool) -> Result<()> {
    let targets = TargetDiscovery::new(discovery_config(config))
        .discover()
        .await;
    let transcripts = pocket_cdp::read_transcripts(&targets).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&transcripts)?);
        return Ok(());
    }

    if transcripts.is_empty() {
        println!("No chat transcripts found ({} window(s) checked).", targets.len());
        return Ok(());
    }

    for transcript in &transcripts {
        println!("{}", transcript.name);
        println!("  Window: {}", transcript.id);
        println!("  Markup: {} bytes", transcript.html.len());
    }
    Ok(())
}

/// Run `pocket-agent send`.
pub async fn send(window: &str, text: &str) -> Result<()> {
    pocket_cdp::send_text(window, text)
        .await
        .with_context(|| format!("failed to send message to {window}"))?;
    println!("Message submitted.");
    Ok(())
}
