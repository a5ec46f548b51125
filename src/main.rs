// ABOUTME: Main entry point for the mirai bot
// ABOUTME: Initializes logging and config, enables the session, runs the worker until Ctrl-C or failure

use anyhow::{Context, Result};
use clap::Parser;
use mirai::{bot, config::Config, runner};
use mirai_core::Session;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "mirai", version, about = "Event-driven bot session for the mirai HTTP API")]
struct Cli {
    /// Config file (defaults to $MIRAI_CONFIG_PATH, then ./config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Connection URL, overriding the config file (mirai://host:port/?authKey=..&qq=..)
    #[arg(long)]
    url: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    tracing::info!("Starting mirai bot");

    dotenvy::dotenv().ok();
    let mut config = match &cli.config {
        Some(path) => Config::load_from(Some(path.as_path()))?,
        None => Config::load()?,
    };
    if let Some(url) = cli.url {
        config.connection.url = Some(url);
    }

    let session_config = config.session_config()?;
    tracing::info!(
        base_url = %session_config.base_url,
        account_id = session_config.account_id,
        poll_count = session_config.polling.count,
        fail_fast = session_config.polling.fail_fast,
        "Configuration loaded"
    );

    let mut session =
        Session::connect_http(session_config).context("Failed to create gateway client")?;
    session
        .enable()
        .await
        .context("Failed to enable session")?;

    bot::register(&session, &config.bot);
    session
        .begin_worker()
        .context("Failed to start event worker")?;

    tracing::info!("Bot running - press Ctrl-C to stop");
    runner::run_until_shutdown(&mut session, async {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")
    })
    .await
}
