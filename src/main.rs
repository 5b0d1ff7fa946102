mod cli;
mod config;
mod error;
mod model;
mod providers;
mod sync;
mod util;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("ado_board_sync={level}").parse()?),
        )
        .init();

    let mut config = config::load_config(cli.config.as_deref())?;
    config.apply_env(|key| std::env::var(key).ok());

    // Ctrl-C stops the run after the board write in flight.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current write");
            on_signal.cancel();
        }
    });

    match cli.command.unwrap_or(Command::Sync) {
        Command::Sync => cli::handle_sync(&config, cancel).await,
        Command::Mappings => cli::handle_mappings(&config).await,
        Command::FillRates { limit } => cli::handle_fill_rates(&config, limit, cancel).await,
    }
}
