//! Structured logging for delivery lifecycle events

use solana_sdk::signature::Signature;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::MonitoringConfig;
use crate::errors::DeliveryError;
use crate::metrics::metrics;
use crate::observability::CorrelationId;
use crate::types::{ComputeBudgetParameters, DeliveryPath, FeeTier};

const DEFAULT_FILTER: &str = "tx_delivery=info,warn";

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the default filter. Fails if a subscriber is already
/// installed.
pub fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }
    Ok(())
}

/// Install tracing per `config` and, when enabled, build the metrics registry.
pub fn init_monitoring(config: &MonitoringConfig) -> anyhow::Result<()> {
    init_tracing(config.json_logs)?;
    if config.enable_metrics {
        let families = metrics().registry().gather().len();
        tracing::info!(families, "Prometheus metrics registered");
    }
    Ok(())
}

/// Structured logger for one delivery
#[derive(Debug, Clone)]
pub struct DeliveryLogger {
    correlation_id: CorrelationId,
}

impl DeliveryLogger {
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self { correlation_id }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn log_estimated(&self, tier: FeeTier, budget: &ComputeBudgetParameters) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            tier = %tier,
            unit_limit = budget.unit_limit,
            unit_price = budget.unit_price_micro_lamports,
            max_fee_lamports = budget.max_priority_fee_lamports(),
            "Compute budget resolved"
        );
    }

    pub fn log_assembled(&self, signature: &Signature, last_valid_block_height: u64) {
        tracing::debug!(
            correlation_id = %self.correlation_id,
            signature = %signature,
            last_valid_block_height,
            "Transaction assembled and signed"
        );
    }

    pub fn log_broadcast_attempt(&self, signature: &Signature, attempt: u32, elapsed: Duration) {
        tracing::debug!(
            correlation_id = %self.correlation_id,
            signature = %signature,
            attempt,
            elapsed_ms = elapsed.as_millis() as u64,
            "Broadcasting signed transaction"
        );
    }

    pub fn log_submission_error(&self, signature: &Signature, class: &str, error: &str) {
        tracing::debug!(
            correlation_id = %self.correlation_id,
            signature = %signature,
            class,
            error,
            "Submission rejected, will resubmit"
        );
    }

    pub fn log_poll_timeout(&self, signature: &Signature, elapsed: Duration) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            signature = %signature,
            elapsed_ms = elapsed.as_millis() as u64,
            "Confirmation poll window elapsed"
        );
    }

    pub fn log_fallback(&self, signature: &Signature, attempts: u32) {
        tracing::warn!(
            correlation_id = %self.correlation_id,
            signature = %signature,
            attempts,
            "Broadcast window exhausted, falling back to validated send"
        );
    }

    pub fn log_success(&self, signature: &Signature, path: DeliveryPath, elapsed: Duration) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            signature = %signature,
            path = path.as_str(),
            latency_ms = elapsed.as_millis() as u64,
            "Transaction confirmed"
        );
    }

    pub fn log_failure(&self, error: &DeliveryError, elapsed: Duration) {
        tracing::warn!(
            correlation_id = %self.correlation_id,
            category = error.category(),
            signature = ?error.signature(),
            error = %error,
            latency_ms = elapsed.as_millis() as u64,
            "Delivery failed"
        );
    }
}
