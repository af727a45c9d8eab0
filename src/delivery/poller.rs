//! Confirmation poller
//!
//! Polls one signature's status on a fixed tick up to a bounded window.
//! Holds no shared state, so any number of polls can run side by side.

use solana_sdk::signature::Signature;
use std::time::Duration;
use tracing::{debug, trace};

use super::context::SendContext;
use crate::errors::DeliveryError;
use crate::metrics::metrics;
use crate::types::ConfirmationStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPoller {
    interval: Duration,
    window: Duration,
}

impl Default for ConfirmationPoller {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(15))
    }
}

impl ConfirmationPoller {
    pub fn new(interval: Duration, window: Duration) -> Self {
        Self { interval, window }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait for `signature` to reach confirmed (or finalized) status.
    ///
    /// Each tick sleeps one interval and then queries the ledger; status
    /// query errors are treated as "not yet". Returns `ConfirmationTimeout`
    /// once the window is used up, `ExecutionFailed` if the ledger reports
    /// the transaction failed, and `Cancelled` on cancellation.
    pub async fn poll(
        &self,
        ctx: &SendContext<'_>,
        signature: &Signature,
    ) -> Result<(), DeliveryError> {
        let sig = Some(*signature);
        let mut status = ConfirmationStatus::Pending;
        let mut elapsed = Duration::ZERO;

        loop {
            ctx.sleep(self.interval, sig).await?;
            elapsed += self.interval;

            match ctx
                .cancellable(sig, ctx.ledger.signature_status(signature))
                .await?
            {
                Ok(reported) => {
                    trace!(signature = %signature, status = ?reported, "Signature status");
                    status = status.on_ledger_status(&reported);
                }
                Err(e) => {
                    debug!(
                        signature = %signature,
                        class = e.class(),
                        error = %e,
                        "Status query failed"
                    );
                }
            }

            if status.is_terminal() {
                return match status {
                    ConfirmationStatus::Failed(reason) => Err(DeliveryError::ExecutionFailed {
                        signature: *signature,
                        reason,
                    }),
                    _ => Ok(()),
                };
            }

            if elapsed >= self.window {
                debug_assert_eq!(status.on_window_elapsed(), ConfirmationStatus::TimedOut);
                metrics().poll_timeouts_total.inc();
                return Err(DeliveryError::ConfirmationTimeout {
                    signature: *signature,
                    elapsed,
                });
            }
        }
    }
}
