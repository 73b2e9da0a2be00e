// ABOUTME: Dispatch pipeline - route, gate, execute, split, and send for each inbound message
// ABOUTME: A single worker drains the inbound queue so dispatches never interleave

use crate::handler::{split, Executor, FormatFlags, HandlerProfile, SharedRegistry};
use crate::metrics;
use crate::traits::{ChatRoom, InboundMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// A matched handler paired with the message that triggered it
#[derive(Debug, Clone, Copy)]
pub struct DispatchDecision<'a> {
    pub handler: &'a HandlerProfile,
    pub message: &'a InboundMessage,
}

/// An inbound message together with the room replies go to
#[derive(Debug)]
pub struct Inbound<R> {
    pub room: R,
    pub message: InboundMessage,
}

/// Counts from one dispatch, mostly for logging and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub matched: usize,
    pub executed: usize,
    pub fragments_sent: usize,
}

pub struct Dispatcher {
    registry: Arc<SharedRegistry>,
    executor: Executor,
    flags: FormatFlags,
    pacing: Duration,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<SharedRegistry>,
        executor: Executor,
        flags: FormatFlags,
        pacing: Duration,
    ) -> Self {
        Self {
            registry,
            executor,
            flags,
            pacing,
        }
    }

    /// Run every matching handler for `message` and relay its output into `room`.
    /// Handlers run in registry order; each handler's fragments are all sent
    /// before the next handler starts.
    pub async fn dispatch<R: ChatRoom + ?Sized>(
        &self,
        room: &R,
        message: &InboundMessage,
    ) -> DispatchSummary {
        metrics::record_message();
        let registry = self.registry.snapshot().await;
        let decisions: Vec<DispatchDecision> = crate::handler::route(message, registry.handlers())
            .into_iter()
            .map(|handler| DispatchDecision { handler, message })
            .collect();

        let mut summary = DispatchSummary {
            matched: decisions.len(),
            ..Default::default()
        };

        tracing::debug!(
            room_id = %message.room_id,
            sender = %message.sender,
            matched = summary.matched,
            "Routed message"
        );

        for decision in decisions {
            if let Some(sent) = self.run_one(room, decision).await {
                summary.executed += 1;
                summary.fragments_sent += sent;
            }
        }

        summary
    }

    async fn run_one<R: ChatRoom + ?Sized>(
        &self,
        room: &R,
        decision: DispatchDecision<'_>,
    ) -> Option<usize> {
        let handler = decision.handler;
        let result = self.executor.execute(handler, decision.message).await?;
        tokio::time::sleep(self.pacing).await;

        let output = result.effective_output(handler.name());
        let format = self.flags.resolve(handler.format());
        let mut sent = 0;

        for fragment in split(&output, format) {
            for line in fragment.text.lines() {
                tracing::debug!(handler = %handler.name(), line = %line, "Handler output");
            }
            match room.send(fragment.to_content()).await {
                Ok(()) => {
                    sent += 1;
                    metrics::record_fragment_sent();
                }
                Err(e) => {
                    tracing::warn!(
                        handler = %handler.name(),
                        room_id = %room.id(),
                        error = %e,
                        "Failed to send handler output"
                    );
                    metrics::record_send_failure();
                }
            }
            tokio::time::sleep(self.pacing).await;
        }

        Some(sent)
    }

    /// Drain `rx` one message at a time until every sender is dropped
    pub async fn run_worker<R: ChatRoom>(self: Arc<Self>, mut rx: mpsc::Receiver<Inbound<R>>) {
        tracing::debug!("Dispatch worker started");
        while let Some(Inbound { room, message }) = rx.recv().await {
            let summary = self.dispatch(&room, &message).await;
            if summary.matched > 0 {
                tracing::info!(
                    room_id = %message.room_id,
                    sender = %message.sender,
                    matched = summary.matched,
                    executed = summary.executed,
                    fragments = summary.fragments_sent,
                    "Dispatched message"
                );
            }
        }
        tracing::debug!("Dispatch worker stopped");
    }
}
