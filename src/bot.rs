// ABOUTME: Run mode - discovers handlers, connects to Matrix, and dispatches until interrupted
// ABOUTME: SIGHUP rebuilds the handler registry without dropping the connection

use crate::platform::{MatrixConnector, MatrixRoom, MatrixTransport};
use anyhow::{Context, Result};
use relaybot_core::config::Config;
use relaybot_core::handler::{Executor, FormatFlags, HandlerSource, SharedRegistry};
use relaybot_core::{ChatTransport, Dispatcher, Inbound, Supervisor};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Messages waiting for the dispatch worker
const INBOUND_QUEUE: usize = 256;

/// Discover handlers from the configured scripts directory
pub async fn load_registry(config: &Config) -> Result<Arc<SharedRegistry>> {
    let run_dir = Path::new(&config.bot.run_path);
    std::fs::create_dir_all(run_dir)
        .with_context(|| format!("Failed to create run directory {}", run_dir.display()))?;

    let registry = SharedRegistry::load(HandlerSource::from_config(config)).await?;
    let snapshot = registry.snapshot().await;
    if snapshot.is_empty() {
        tracing::warn!(
            scripts_path = %config.bot.scripts_path,
            "No handlers registered"
        );
    } else {
        tracing::info!(
            handlers = snapshot.len(),
            names = ?snapshot.names(),
            "Handlers registered"
        );
    }

    Ok(Arc::new(registry))
}

/// Serve forever; returns Ok only when interrupted
pub async fn run(config: Config, flags: FormatFlags) -> Result<()> {
    let registry = load_registry(&config).await?;
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&registry),
        Executor::new(&config.bot.run_path),
        flags,
        config.pacing(),
    ));

    let (tx, rx) = mpsc::channel::<Inbound<MatrixRoom>>(INBOUND_QUEUE);
    let worker = tokio::spawn(Arc::clone(&dispatcher).run_worker(rx));

    #[cfg(unix)]
    reload_on_hangup(Arc::clone(&registry))?;

    let connector = MatrixConnector::new(config.bot.clone())?.with_membership_handling();
    let supervisor = Supervisor::new(connector, config.reconnect_delay());

    let serve = |transport: MatrixTransport| {
        let tx = tx.clone();
        async move {
            transport.listen(tx);
            tracing::info!(user_id = %transport.bot_user_id(), "Listening for messages");
            transport.sync().await
        }
    };

    tokio::select! {
        () = supervisor.run(serve) => Ok(()),
        joined = worker => {
            joined.context("Dispatch worker panicked")?;
            anyhow::bail!("Dispatch worker stopped")
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Interrupted, shutting down");
            Ok(())
        }
    }
}

#[cfg(unix)]
fn reload_on_hangup(registry: Arc<SharedRegistry>) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            tracing::info!("SIGHUP received, reloading handlers");
            if let Err(e) = registry.reload().await {
                tracing::error!(error = %format!("{:#}", e), "Reload failed, keeping previous handlers");
            }
        }
    });
    Ok(())
}
