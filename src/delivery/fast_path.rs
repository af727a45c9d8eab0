//! Low-validation retry broadcaster
//!
//! Resubmits the same signed bytes with preflight skipped until a poll
//! confirms them or the broadcast window runs out. Rejected submissions are
//! classified and counted, then retried straight away.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::context::SendContext;
use super::poller::ConfirmationPoller;
use super::{SendOutcome, SendStrategy};
use crate::errors::DeliveryError;
use crate::metrics::metrics;
use crate::tx_builder::SignedTransaction;
use crate::types::{BroadcastOptions, ConfirmationStatus, DeliveryPath};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastPath {
    window: Duration,
    poller: ConfirmationPoller,
}

impl Default for FastPath {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(60),
            ConfirmationPoller::default(),
        )
    }
}

impl FastPath {
    pub fn new(window: Duration, poller: ConfirmationPoller) -> Self {
        Self { window, poller }
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[async_trait]
impl SendStrategy for FastPath {
    fn path(&self) -> DeliveryPath {
        DeliveryPath::Fast
    }

    async fn send(
        &self,
        ctx: &SendContext<'_>,
        tx: &SignedTransaction,
    ) -> Result<SendOutcome, DeliveryError> {
        let signature = tx.signature();
        let sig = Some(signature);
        let started = Instant::now();
        let mut attempts = 0u32;
        let mut status = ConfirmationStatus::Unseen;

        while started.elapsed() < self.window {
            ctx.ensure_active(sig)?;
            attempts += 1;
            metrics().broadcast_attempts_total.inc();
            ctx.logger
                .log_broadcast_attempt(&signature, attempts, started.elapsed());

            let submitted = ctx
                .cancellable(sig, ctx.ledger.broadcast(tx, BroadcastOptions::fast()))
                .await?;

            match submitted {
                Ok(accepted) => {
                    if accepted != signature {
                        debug!(
                            expected = %signature,
                            reported = %accepted,
                            "Node reported a different signature; tracking the local one"
                        );
                    }
                    status = status.on_broadcast_accepted();

                    match self.poller.poll(ctx, &signature).await {
                        Ok(()) => {
                            return Ok(SendOutcome::Confirmed {
                                signature,
                                attempts,
                            })
                        }
                        Err(DeliveryError::ConfirmationTimeout { elapsed, .. }) => {
                            status = status.on_window_elapsed();
                            ctx.logger.log_poll_timeout(&signature, elapsed);
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(e) => {
                    metrics().record_submission_error(e.class());
                    ctx.logger
                        .log_submission_error(&signature, e.class(), &e.to_string());
                    // Let the cancel token and other tasks in before resubmitting
                    ctx.cancellable(sig, tokio::task::yield_now()).await?;
                }
            }
        }

        debug!(
            signature = %signature,
            attempts,
            status = status.as_str(),
            "Broadcast window elapsed unconfirmed"
        );
        Ok(SendOutcome::Unconfirmed {
            signature,
            attempts,
        })
    }
}
