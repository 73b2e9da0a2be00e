// ABOUTME: Main entry point for relaybot
// ABOUTME: Parses arguments, initializes logging and config, then runs the bot or sends one message

use anyhow::Result;
use clap::Parser;
use relaybot::{bot, cli::Cli, config::Config, logging, metrics, send};
use relaybot_core::send::SendError;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    logging::install_panic_hook();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.debug_enabled(), cli.log_dir.as_deref());

    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(config = ?config.bot, "Configuration loaded");

    let flags = cli.format_flags();

    if let Some(room_id) = cli.room {
        return match send::run(config, &room_id, cli.message, flags).await {
            Ok(()) => Ok(ExitCode::SUCCESS),
            Err(e) if e.downcast_ref::<SendError>().is_some() => {
                tracing::error!(error = %e, "Message not sent");
                Ok(ExitCode::from(1))
            }
            Err(e) => Err(e),
        };
    }

    tracing::info!(
        homeserver = %config.bot.base_url,
        user_id = %config.bot.user_id,
        scripts_path = %config.bot.scripts_path,
        "Starting relaybot"
    );

    if let Some(ref addr) = config.bot.metrics_addr {
        metrics::init_metrics(addr)?;
    }

    bot::run(config, flags).await?;
    Ok(ExitCode::from(1))
}
