//! `pocket-agent sign-in --github-token TOKEN`

use anyhow::{Context, Result};

use pocket_relay::BackendClient;
use pocket_types::PocketConfig;

/// Exchange a GitHub token for backend credentials and print them.
pub async fn sign_in(config: &PocketConfig, github_token: &str) -> Result<()> {
    let backend = BackendClient::new(&config.server_url, None)?;
    let credentials = backend
        .exchange_github_token(github_token)
        .await
        .with_context(|| format!("sign-in against {} failed", config.server_url))?;

    println!("Signed in as user {}.", credentials.user_id);
    println!("API token: {}", credentials.api_token);
    println!();
    println!("Store it as api_token in ~/.pocket-agent/config.toml or export POCKET_AGENT_API_TOKEN.");
    Ok(())
}
