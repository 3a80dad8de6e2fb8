use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use botvisor::config::{default_config_path, Config};
use botvisor::{LaunchOptions, ProcessLauncher, Supervisor};

#[derive(Parser)]
#[command(name = "botvisor")]
#[command(about = "Run a bot and hot-reload its plugins while you edit them")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Directory holding one sub-directory per bot
    #[arg(long, global = true)]
    bots_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start bot by name
    Start {
        /// Bot name, a directory under the bots dir
        name: String,

        /// Port to listen on, handed to the bot as PORT
        #[arg(short, long, default_value_t = 8080)]
        port: u16,

        /// Dev mode: watch files, reload plugins, restart on other changes
        #[arg(short, long)]
        dev: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!("botvisor={log_level}"))
        .with_target(false)
        .init();

    info!("🤖 Starting Botvisor v{}", env!("CARGO_PKG_VERSION"));

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let mut config = Config::load(&config_path).await?;
    if let Some(bots_dir) = cli.bots_dir {
        config.supervisor.bots_dir = bots_dir;
    }
    let cwd = std::env::current_dir().context("Cannot read working directory")?;
    config.resolve_bots_dir(&cwd);

    match cli.command {
        Commands::Start { name, port, dev } => {
            let mut supervisor = Supervisor::new(config, Arc::new(ProcessLauncher::new()));

            supervisor
                .start(&name, LaunchOptions { port, watch: dev })
                .await
                .with_context(|| format!("Failed to start bot `{name}`"))?;

            if let Err(e) = supervisor.run().await {
                error!("❌ Supervisor error: {}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
