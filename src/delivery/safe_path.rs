//! Fully validated fallback sender

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use super::context::SendContext;
use super::{SendOutcome, SendStrategy};
use crate::errors::DeliveryError;
use crate::tx_builder::SignedTransaction;
use crate::types::{BroadcastOptions, DeliveryPath, LedgerStatus};

/// Pause before asking again after a transient confirmation error.
const CONFIRM_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// One preflight-checked submission, confirmed against the checkpoint the
/// message was compiled for. Transient confirmation errors are retried until
/// the checkpoint expires; every other failure is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafePath {
    max_retries: usize,
}

impl Default for SafePath {
    fn default() -> Self {
        Self::new(3)
    }
}

impl SafePath {
    pub fn new(max_retries: usize) -> Self {
        Self { max_retries }
    }
}

#[async_trait]
impl SendStrategy for SafePath {
    fn path(&self) -> DeliveryPath {
        DeliveryPath::Safe
    }

    async fn send(
        &self,
        ctx: &SendContext<'_>,
        tx: &SignedTransaction,
    ) -> Result<SendOutcome, DeliveryError> {
        let local = tx.signature();
        ctx.ensure_active(Some(local))?;

        let signature = ctx
            .cancellable(
                Some(local),
                ctx.ledger
                    .broadcast(tx, BroadcastOptions::validated(self.max_retries)),
            )
            .await?
            .map_err(|e| {
                DeliveryError::fallback(
                    Some(local),
                    format!("validated send rejected: {}", e),
                    ctx.elapsed(),
                )
            })?;

        info!(
            signature = %signature,
            last_valid_block_height = tx.checkpoint().last_valid_block_height,
            "Validated send accepted, awaiting confirmation"
        );

        let status = loop {
            let confirmed = ctx
                .cancellable(
                    Some(signature),
                    ctx.ledger.confirm_until(&signature, tx.checkpoint()),
                )
                .await?;

            match confirmed {
                Ok(status) => break status,
                Err(e) if e.is_transient() => {
                    debug!(
                        signature = %signature,
                        class = e.class(),
                        error = %e,
                        "Transient confirmation error, checkpoint still pending"
                    );
                    ctx.sleep(CONFIRM_RETRY_PAUSE, Some(signature)).await?;
                }
                Err(e) => {
                    return Err(DeliveryError::fallback(
                        Some(signature),
                        format!("confirmation failed: {}", e),
                        ctx.elapsed(),
                    ))
                }
            }
        };

        match status {
            s if s.is_confirmed() => Ok(SendOutcome::Confirmed {
                signature,
                attempts: 1,
            }),
            LedgerStatus::Failed(reason) => Err(DeliveryError::ExecutionFailed { signature, reason }),
            other => Err(DeliveryError::fallback(
                Some(signature),
                format!("confirmation ended unconfirmed ({:?})", other),
                ctx.elapsed(),
            )),
        }
    }
}
