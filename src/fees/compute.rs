//! Compute-unit sizing
//!
//! The caller's instructions are simulated unsigned with the maximum unit
//! limit prepended, and the measured consumption is widened by both an
//! additive and a multiplicative margin. Small transactions are covered by
//! the additive margin and large ones by the multiplier.

use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount, instruction::Instruction, pubkey::Pubkey,
};
use tracing::{debug, warn};

use crate::config::FeeConfig;
use crate::errors::DeliveryError;
use crate::ledger::LedgerService;
use crate::tx_builder::simulate::build_sim_tx;
use crate::types::FeeTier;

/// Unit-limit policy derived from the fee configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitSizing {
    /// Limit used when simulation yields nothing usable
    pub default_limit: u32,
    pub safety_margin_units: u32,
    pub safety_multiplier: f64,
    /// Hard ceiling; also the limit the simulation runs under
    pub max_limit: u32,
}

impl Default for UnitSizing {
    fn default() -> Self {
        Self::from_config(&FeeConfig::default())
    }
}

impl UnitSizing {
    pub fn from_config(config: &FeeConfig) -> Self {
        Self {
            default_limit: config.default_unit_limit,
            safety_margin_units: config.safety_margin_units,
            safety_multiplier: config.safety_multiplier,
            max_limit: config.max_unit_limit,
        }
    }

    /// Unit limit for a simulated consumption.
    ///
    /// `None` and `Some(0)` both mean the simulation was inconclusive.
    pub fn unit_limit(&self, units_consumed: Option<u64>) -> u32 {
        match units_consumed {
            Some(units) if units > 0 => {
                let additive = units.saturating_add(u64::from(self.safety_margin_units)) as f64;
                let multiplicative = units as f64 * self.safety_multiplier;
                let widened = additive.max(multiplicative).ceil();
                let capped = widened.min(f64::from(self.max_limit));
                // capped is finite and within u32 range
                capped as u32
            }
            _ => self.default_limit.min(self.max_limit),
        }
    }

    /// Simulate `instructions` for `payer` and size the unit limit.
    ///
    /// Simulation errors are not fatal: they fall back to the default limit.
    pub async fn estimate(
        &self,
        ledger: &dyn LedgerService,
        payer: &Pubkey,
        instructions: &[Instruction],
        lookup_tables: &[AddressLookupTableAccount],
        tier: FeeTier,
    ) -> Result<u32, DeliveryError> {
        let tx = build_sim_tx(payer, instructions, lookup_tables, self.max_limit)
            .map_err(|e| DeliveryError::estimation(tier, e))?;

        let consumed = match ledger.simulate(&tx).await {
            Ok(units @ (None | Some(0))) => {
                warn!(
                    default_limit = self.default_limit,
                    "Simulation returned no unit consumption, using default limit"
                );
                units
            }
            Ok(units) => units,
            Err(e) => {
                warn!(
                    error = %e,
                    class = e.class(),
                    default_limit = self.default_limit,
                    "Simulation failed, using default compute-unit limit"
                );
                None
            }
        };

        let limit = self.unit_limit(consumed);
        debug!(units_consumed = ?consumed, unit_limit = limit, "Compute units sized");
        Ok(limit)
    }
}
