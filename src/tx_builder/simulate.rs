//! Unsigned transactions for simulation and fee estimation
//!
//! Neither the node's simulator nor the external fee service verify
//! signatures, so the transaction carries zeroed placeholders and a default
//! blockhash (the simulator is asked to replace it).

use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount,
    compute_budget::ComputeBudgetInstruction,
    hash::Hash,
    instruction::Instruction,
    message::{v0, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};

/// Build an unsigned V0 transaction with `set_compute_unit_limit(unit_limit)`
/// ahead of the caller's instructions.
pub fn build_sim_tx(
    payer: &Pubkey,
    instructions: &[Instruction],
    lookup_tables: &[AddressLookupTableAccount],
    unit_limit: u32,
) -> Result<VersionedTransaction, String> {
    let mut ixs = Vec::with_capacity(instructions.len() + 1);
    ixs.push(ComputeBudgetInstruction::set_compute_unit_limit(unit_limit));
    ixs.extend_from_slice(instructions);

    let message = v0::Message::try_compile(payer, &ixs, lookup_tables, Hash::default())
        .map_err(|e| format!("failed to compile simulation message: {}", e))?;
    let num_signatures = usize::from(message.header.num_required_signatures);

    Ok(VersionedTransaction {
        signatures: vec![Signature::default(); num_signatures],
        message: VersionedMessage::V0(message),
    })
}
