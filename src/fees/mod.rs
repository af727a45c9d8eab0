//! Fee estimation
//!
//! Produces the [`ComputeBudgetParameters`] for one delivery attempt:
//! the unit limit comes from simulation ([`compute`]), the unit price from
//! either the ledger's recent fee distribution ([`percentile`]) or an
//! external estimation service ([`external`]), chosen by configuration.

pub mod compute;
pub mod external;
pub mod percentile;

pub use compute::UnitSizing;
pub use external::HeliusFeeEstimator;
pub use percentile::LocalPercentileStrategy;

use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount, instruction::Instruction, pubkey::Pubkey,
};
use tracing::info;

use crate::config::{FeeConfig, FeeStrategyKind};
use crate::errors::DeliveryError;
use crate::ledger::LedgerService;
use crate::metrics::metrics;
use crate::tx_builder::simulate::build_sim_tx;
use crate::types::{ComputeBudgetParameters, FeeTier};

/// Interchangeable priority-fee pricing strategies.
#[derive(Debug, Clone)]
pub enum PriorityFeeStrategy {
    /// Percentile over the ledger's recent prioritization fees
    Local(LocalPercentileStrategy),
    /// Third-party estimation service, used verbatim
    External(HeliusFeeEstimator),
}

impl PriorityFeeStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            PriorityFeeStrategy::Local(_) => "local",
            PriorityFeeStrategy::External(_) => "external",
        }
    }
}

/// Sizes and prices the compute budget for a set of instructions.
#[derive(Debug, Clone)]
pub struct FeeEstimator {
    sizing: UnitSizing,
    strategy: PriorityFeeStrategy,
}

impl FeeEstimator {
    pub fn new(sizing: UnitSizing, strategy: PriorityFeeStrategy) -> Self {
        Self { sizing, strategy }
    }

    pub fn from_config(config: &FeeConfig) -> Result<Self, DeliveryError> {
        let strategy = match config.strategy {
            FeeStrategyKind::Local => PriorityFeeStrategy::Local(LocalPercentileStrategy::new(
                config.max_sample_age_slots,
            )),
            FeeStrategyKind::External => {
                PriorityFeeStrategy::External(HeliusFeeEstimator::from_config(&config.external)?)
            }
        };
        Ok(Self::new(UnitSizing::from_config(config), strategy))
    }

    pub fn sizing(&self) -> &UnitSizing {
        &self.sizing
    }

    pub fn strategy(&self) -> &PriorityFeeStrategy {
        &self.strategy
    }

    /// Compute budget for `instructions` paid by `payer` at `tier`.
    pub async fn estimate(
        &self,
        ledger: &dyn LedgerService,
        payer: &Pubkey,
        instructions: &[Instruction],
        lookup_tables: &[AddressLookupTableAccount],
        tier: FeeTier,
    ) -> Result<ComputeBudgetParameters, DeliveryError> {
        let unit_limit = self
            .sizing
            .estimate(ledger, payer, instructions, lookup_tables, tier)
            .await?;

        let unit_price = match &self.strategy {
            PriorityFeeStrategy::Local(local) => local.price(ledger, tier).await?,
            PriorityFeeStrategy::External(service) => {
                let tx = build_sim_tx(payer, instructions, lookup_tables, unit_limit)
                    .map_err(|e| DeliveryError::estimation(tier, e))?;
                service.estimate(&tx, tier).await?
            }
        };

        let m = metrics();
        m.compute_unit_limit.observe(f64::from(unit_limit));
        m.priority_fee.observe(unit_price as f64);

        info!(
            tier = %tier,
            strategy = self.strategy.name(),
            unit_limit,
            unit_price,
            "Compute budget estimated"
        );
        Ok(ComputeBudgetParameters::new(unit_limit, unit_price))
    }
}
