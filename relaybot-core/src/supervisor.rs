// ABOUTME: Connection supervisor - establishes transport sessions and retries forever on faults
// ABOUTME: Fixed retry delay, no backoff growth, no attempt limit; state published over a watch channel

use crate::metrics;
use crate::traits::Connector;
use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

/// Lifecycle of the transport session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

pub struct Supervisor<C: Connector> {
    connector: C,
    retry_delay: Duration,
    state: watch::Sender<ConnectionState>,
}

impl<C: Connector> Supervisor<C> {
    pub fn new(connector: C, retry_delay: Duration) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            retry_delay,
            state,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Connect, waiting `retry_delay` after every failure, until a session exists
    pub async fn establish(&self) -> C::Session {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            self.state.send_replace(ConnectionState::Connecting);
            match self.connector.connect().await {
                Ok(session) => {
                    self.state.send_replace(ConnectionState::Connected);
                    tracing::debug!(attempt, "Connection established");
                    return session;
                }
                Err(e) => {
                    self.state.send_replace(ConnectionState::Disconnected);
                    metrics::record_reconnect();
                    tracing::warn!(
                        attempt,
                        error = %format!("{:#}", e),
                        retry_in_secs = self.retry_delay.as_secs_f64(),
                        "Connection failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    /// Establish a session, hand it to `serve`, and start over whenever
    /// `serve` returns. Never returns.
    pub async fn run<F, Fut>(&self, mut serve: F)
    where
        F: FnMut(C::Session) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        loop {
            let session = self.establish().await;
            match serve(session).await {
                Ok(()) => tracing::warn!("Session ended, reconnecting"),
                Err(e) => tracing::warn!(error = %format!("{:#}", e), "Session failed, reconnecting"),
            }
            self.state.send_replace(ConnectionState::Disconnected);
            metrics::record_reconnect();
            tokio::time::sleep(self.retry_delay).await;
        }
    }
}
