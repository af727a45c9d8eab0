//! Local percentile pricing over recent prioritization fees

use tracing::debug;

use crate::errors::DeliveryError;
use crate::ledger::LedgerService;
use crate::types::{FeeSample, FeeTier};

/// Value at index `floor(len * percentile)` of an ascending slice.
///
/// The index is clamped to the last element. Returns `None` for an empty
/// slice.
pub fn select_percentile(sorted: &[u64], percentile: f64) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    let idx = (sorted.len() as f64 * percentile).floor() as usize;
    sorted.get(idx.min(sorted.len() - 1)).copied()
}

/// Sorted fees from samples no older than `max_age_slots` relative to `current_slot`.
pub fn fresh_fees(samples: &[FeeSample], current_slot: u64, max_age_slots: u64) -> Vec<u64> {
    let mut fees: Vec<u64> = samples
        .iter()
        .filter(|s| current_slot.saturating_sub(s.slot) <= max_age_slots)
        .map(|s| s.micro_lamports)
        .collect();
    fees.sort_unstable();
    fees
}

/// Price for `tier` from a sample set.
///
/// An empty set, or one where every sample is stale, is an estimation
/// failure rather than a zero price.
pub fn price_for_tier(
    samples: &[FeeSample],
    current_slot: u64,
    max_age_slots: u64,
    tier: FeeTier,
) -> Result<u64, DeliveryError> {
    if samples.is_empty() {
        return Err(DeliveryError::estimation(
            tier,
            "no recent prioritization fees observed",
        ));
    }

    let fees = fresh_fees(samples, current_slot, max_age_slots);
    select_percentile(&fees, tier.percentile()).ok_or_else(|| {
        DeliveryError::estimation(
            tier,
            format!(
                "all {} fee samples are older than {} slots",
                samples.len(),
                max_age_slots
            ),
        )
    })
}

/// Prices from the ledger's own recent fee observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalPercentileStrategy {
    pub max_sample_age_slots: u64,
}

impl LocalPercentileStrategy {
    pub fn new(max_sample_age_slots: u64) -> Self {
        Self {
            max_sample_age_slots,
        }
    }

    pub async fn price(
        &self,
        ledger: &dyn LedgerService,
        tier: FeeTier,
    ) -> Result<u64, DeliveryError> {
        let samples = ledger
            .recent_fee_samples()
            .await
            .map_err(|e| DeliveryError::estimation(tier, format!("fee samples: {}", e)))?;
        let current_slot = ledger
            .current_slot()
            .await
            .map_err(|e| DeliveryError::estimation(tier, format!("current slot: {}", e)))?;

        let price = price_for_tier(&samples, current_slot, self.max_sample_age_slots, tier)?;
        debug!(
            tier = %tier,
            samples = samples.len(),
            current_slot,
            price,
            "Local percentile fee selected"
        );
        Ok(price)
    }
}
