mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pocket_types::{ConfigLoader, ConfigSource};

/// pocket-agent -- drive a desktop editor's AI chat from elsewhere.
#[derive(Parser, Debug)]
#[command(name = "pocket-agent", version, about)]
struct Cli {
    /// Editor remote-debugging port (overrides configuration)
    #[arg(long, global = true)]
    debug_port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the editor windows found on the debug port
    Targets {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract the chat transcript of every editor window
    Read {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Type a message into one window's chat input and submit it
    Send {
        /// WebSocket debugger URL of the window
        #[arg(long)]
        window: String,

        /// Message text
        text: String,
    },

    /// Exchange a GitHub token for a backend API token
    SignIn {
        #[arg(long)]
        github_token: String,
    },

    /// Sync transcripts to the backend and deliver replies until Ctrl-C
    Relay,

    /// Show the effective configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing with env filter (e.g., RUST_LOG=debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut effective = ConfigLoader::new().load()?;
    if let Some(port) = cli.debug_port {
        effective.config.debug_port = port;
        effective
            .sources
            .insert("debug_port".into(), ConfigSource::CliFlag("--debug-port".into()));
    }
    let config = &effective.config;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Targets { json } => rt.block_on(commands::editor::targets(config, json)),
        Commands::Read { json } => rt.block_on(commands::editor::read(config, json)),
        Commands::Send { window, text } => rt.block_on(commands::editor::send(&window, &text)),
        Commands::SignIn { github_token } => {
            rt.block_on(commands::auth::sign_in(config, &github_token))
        }
        Commands::Relay => rt.block_on(commands::relay::run(config)),
        Commands::Config => {
            commands::config::show(&effective);
            Ok(())
        }
    }
}
