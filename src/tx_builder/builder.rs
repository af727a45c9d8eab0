//! Transaction assembly
//!
//! [`compile_message`] is pure: identical inputs always yield identical
//! bytes. [`TxAssembler`] adds the two network reads assembly needs, the
//! lookup-table fetch and a fresh checkpoint.

use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount,
    instruction::Instruction,
    message::{v0, VersionedMessage},
    pubkey::Pubkey,
};
use tracing::debug;

use super::instructions::plan_budgeted_instructions;
use super::lookup::resolve_lookup_tables;
use super::output::CompiledMessage;
use crate::compat;
use crate::errors::DeliveryError;
use crate::ledger::{LedgerService, LookupTableResolver};
use crate::types::{ComputeBudgetParameters, LookupTableRef, RecentCheckpoint};

/// Compile the budgeted instruction set into a V0 message bound to `checkpoint`.
pub fn compile_message(
    payer: &Pubkey,
    instructions: &[Instruction],
    budget: &ComputeBudgetParameters,
    lookup_tables: &[AddressLookupTableAccount],
    checkpoint: RecentCheckpoint,
) -> Result<CompiledMessage, DeliveryError> {
    let planned = plan_budgeted_instructions(budget, instructions)?;
    let message = v0::Message::try_compile(payer, &planned, lookup_tables, checkpoint.blockhash)
        .map_err(|e| DeliveryError::assembly(format!("message compilation: {}", e)))?;

    Ok(CompiledMessage::new(
        VersionedMessage::V0(message),
        checkpoint,
        *budget,
    ))
}

/// Builds compiled messages from the ledger handles of one delivery.
#[derive(Clone, Copy)]
pub struct TxAssembler<'a> {
    ledger: &'a dyn LedgerService,
    resolver: &'a dyn LookupTableResolver,
}

impl<'a> TxAssembler<'a> {
    pub fn new(ledger: &'a dyn LedgerService, resolver: &'a dyn LookupTableResolver) -> Self {
        Self { ledger, resolver }
    }

    /// Resolve lookup-table references (required/optional rule applies).
    pub async fn resolve_tables(
        &self,
        refs: &[LookupTableRef],
    ) -> Result<Vec<AddressLookupTableAccount>, DeliveryError> {
        resolve_lookup_tables(self.resolver, refs).await
    }

    /// Fetch a fresh checkpoint and compile against it.
    pub async fn assemble(
        &self,
        payer: &Pubkey,
        instructions: &[Instruction],
        budget: &ComputeBudgetParameters,
        lookup_tables: &[AddressLookupTableAccount],
    ) -> Result<CompiledMessage, DeliveryError> {
        let checkpoint = self
            .ledger
            .latest_checkpoint()
            .await
            .map_err(|e| DeliveryError::assembly(format!("latest checkpoint: {}", e)))?;

        let compiled = compile_message(payer, instructions, budget, lookup_tables, checkpoint)?;
        debug!(
            blockhash = %checkpoint.blockhash,
            last_valid_block_height = checkpoint.last_valid_block_height,
            message_len = compiled.bytes().len(),
            tables_used = ?compat::lookup_table_addresses(compiled.message()),
            "Message compiled"
        );
        Ok(compiled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{hash::Hash, instruction::AccountMeta};

    fn caller_ixs() -> Vec<Instruction> {
        (0..3)
            .map(|i| {
                Instruction::new_with_bytes(
                    Pubkey::new_unique(),
                    &[i],
                    vec![AccountMeta::new(Pubkey::new_unique(), false)],
                )
            })
            .collect()
    }

    #[test]
    fn test_compile_is_deterministic() {
        let payer = Pubkey::new_unique();
        let ixs = caller_ixs();
        let budget = ComputeBudgetParameters::new(180_000, 30);
        let checkpoint = RecentCheckpoint::new(Hash::new_unique(), 500);

        let a = compile_message(&payer, &ixs, &budget, &[], checkpoint).unwrap();
        let b = compile_message(&payer, &ixs, &budget, &[], checkpoint).unwrap();

        assert_eq!(a.bytes(), b.bytes());
        assert_eq!(a.checkpoint(), &checkpoint);
    }

    #[test]
    fn test_compiled_message_uses_checkpoint_and_lookup_table() {
        let payer = Pubkey::new_unique();
        let looked_up = Pubkey::new_unique();
        let table = AddressLookupTableAccount {
            key: Pubkey::new_unique(),
            addresses: vec![looked_up],
        };
        let ix = Instruction::new_with_bytes(
            Pubkey::new_unique(),
            &[7],
            vec![AccountMeta::new(looked_up, false)],
        );
        let checkpoint = RecentCheckpoint::new(Hash::new_unique(), 77);

        let compiled = compile_message(
            &payer,
            &[ix],
            &ComputeBudgetParameters::new(200_000, 5),
            &[table.clone()],
            checkpoint,
        )
        .unwrap();

        let VersionedMessage::V0(message) = compiled.message() else {
            panic!("expected v0 message");
        };
        assert_eq!(message.recent_blockhash, checkpoint.blockhash);
        assert_eq!(message.address_table_lookups[0].account_key, table.key);
        // limit, price, caller
        assert_eq!(message.instructions.len(), 3);
    }
}
