//! Instruction planning and ordering validation
//!
//! Every assembled message has the same shape:
//! 1. `set_compute_unit_limit`
//! 2. `set_compute_unit_price`
//! 3. the caller's instructions, in the order given
//!
//! The caller must not set a limit or price of its own; the runtime rejects
//! duplicate compute-budget directives.

use solana_sdk::{compute_budget::ComputeBudgetInstruction, instruction::Instruction};

use crate::errors::DeliveryError;
use crate::types::ComputeBudgetParameters;

// Borsh discriminants of ComputeBudgetInstruction
const SET_COMPUTE_UNIT_LIMIT: u8 = 2;
const SET_COMPUTE_UNIT_PRICE: u8 = 3;

fn compute_budget_discriminant(ix: &Instruction) -> Option<u8> {
    (ix.program_id == solana_sdk::compute_budget::id())
        .then(|| ix.data.first().copied())
        .flatten()
}

fn is_unit_limit(ix: &Instruction) -> bool {
    compute_budget_discriminant(ix) == Some(SET_COMPUTE_UNIT_LIMIT)
}

fn is_unit_price(ix: &Instruction) -> bool {
    compute_budget_discriminant(ix) == Some(SET_COMPUTE_UNIT_PRICE)
}

/// Prepend the budget directives to the caller's instructions.
///
/// # Errors
///
/// `AssemblyFailure` if the caller supplied no instructions or already sets a
/// compute-unit limit or price.
pub fn plan_budgeted_instructions(
    budget: &ComputeBudgetParameters,
    caller: &[Instruction],
) -> Result<Vec<Instruction>, DeliveryError> {
    if caller.is_empty() {
        return Err(DeliveryError::assembly("instruction set is empty"));
    }

    if let Some(idx) = caller.iter().position(|ix| is_unit_limit(ix) || is_unit_price(ix)) {
        return Err(DeliveryError::assembly(format!(
            "caller instruction {} already sets a compute-unit limit or price",
            idx
        )));
    }

    let mut instructions = Vec::with_capacity(caller.len() + 2);
    instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(
        budget.unit_limit,
    ));
    instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
        budget.unit_price_micro_lamports,
    ));
    instructions.extend_from_slice(caller);

    sanity_check_ix_order(&instructions)?;
    Ok(instructions)
}

/// Validate the budget prefix (debug/test builds only).
#[cfg(debug_assertions)]
pub fn sanity_check_ix_order(instructions: &[Instruction]) -> Result<(), DeliveryError> {
    match instructions {
        [limit, price, rest @ ..] if is_unit_limit(limit) && is_unit_price(price) => {
            if let Some(idx) = rest.iter().position(|ix| is_unit_limit(ix) || is_unit_price(ix)) {
                return Err(DeliveryError::assembly(format!(
                    "duplicate compute-budget directive at position {}",
                    idx + 2
                )));
            }
            Ok(())
        }
        _ => Err(DeliveryError::assembly(
            "message must start with set_compute_unit_limit then set_compute_unit_price",
        )),
    }
}

#[cfg(not(debug_assertions))]
#[inline]
pub fn sanity_check_ix_order(_instructions: &[Instruction]) -> Result<(), DeliveryError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{instruction::AccountMeta, pubkey::Pubkey};

    fn caller_ix(tag: u8) -> Instruction {
        Instruction::new_with_bytes(
            Pubkey::new_unique(),
            &[tag],
            vec![AccountMeta::new(Pubkey::new_unique(), false)],
        )
    }

    #[test]
    fn test_budget_prefix_then_caller_order() {
        let budget = ComputeBudgetParameters::new(180_000, 30);
        let caller = vec![caller_ix(1), caller_ix(2), caller_ix(3)];

        let planned = plan_budgeted_instructions(&budget, &caller).unwrap();

        assert_eq!(planned.len(), 5);
        assert_eq!(
            planned[0],
            ComputeBudgetInstruction::set_compute_unit_limit(180_000)
        );
        assert_eq!(
            planned[1],
            ComputeBudgetInstruction::set_compute_unit_price(30)
        );
        assert_eq!(&planned[2..], caller.as_slice());
    }

    #[test]
    fn test_empty_instruction_set_rejected() {
        let budget = ComputeBudgetParameters::new(200_000, 1);
        let err = plan_budgeted_instructions(&budget, &[]).unwrap_err();
        assert_eq!(err.category(), "assembly");
    }

    #[test]
    fn test_caller_budget_directive_rejected() {
        let budget = ComputeBudgetParameters::new(200_000, 1);
        let caller = vec![
            caller_ix(1),
            ComputeBudgetInstruction::set_compute_unit_price(99),
        ];
        let err = plan_budgeted_instructions(&budget, &caller).unwrap_err();
        assert!(err.to_string().contains("instruction 1"));
    }

    #[test]
    fn test_heap_frame_request_is_allowed() {
        let budget = ComputeBudgetParameters::new(200_000, 1);
        let caller = vec![ComputeBudgetInstruction::request_heap_frame(64 * 1024), caller_ix(1)];
        assert!(plan_budgeted_instructions(&budget, &caller).is_ok());
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_sanity_check_rejects_swapped_prefix() {
        let instructions = vec![
            ComputeBudgetInstruction::set_compute_unit_price(10),
            ComputeBudgetInstruction::set_compute_unit_limit(200_000),
            caller_ix(1),
        ];
        assert!(sanity_check_ix_order(&instructions).is_err());
        assert!(sanity_check_ix_order(&[]).is_err());
    }
}
