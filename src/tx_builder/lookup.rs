//! Lookup-table resolution for assembly

use solana_sdk::{address_lookup_table::AddressLookupTableAccount, pubkey::Pubkey};
use std::collections::HashMap;
use tracing::debug;

use crate::errors::DeliveryError;
use crate::ledger::LookupTableResolver;
use crate::types::LookupTableRef;

/// Resolve `refs` to their on-chain contents.
///
/// Duplicate references collapse to one, required if any copy is. A missing
/// required table fails assembly; a missing optional one is dropped. The
/// result keeps the first-seen order of the references.
pub async fn resolve_lookup_tables(
    resolver: &dyn LookupTableResolver,
    refs: &[LookupTableRef],
) -> Result<Vec<AddressLookupTableAccount>, DeliveryError> {
    if refs.is_empty() {
        return Ok(Vec::new());
    }

    let mut required: HashMap<Pubkey, bool> = HashMap::with_capacity(refs.len());
    let mut addresses = Vec::with_capacity(refs.len());
    for r in refs {
        required
            .entry(r.address)
            .and_modify(|req| *req |= r.required)
            .or_insert_with(|| {
                addresses.push(r.address);
                r.required
            });
    }

    let resolved = resolver
        .resolve(&addresses)
        .await
        .map_err(|e| DeliveryError::assembly(format!("lookup table resolution: {}", e)))?;

    if resolved.len() != addresses.len() {
        return Err(DeliveryError::assembly(format!(
            "resolver returned {} entries for {} lookup tables",
            resolved.len(),
            addresses.len()
        )));
    }

    let mut tables = Vec::with_capacity(addresses.len());
    for (address, table) in addresses.into_iter().zip(resolved) {
        match table {
            Some(table) => tables.push(table),
            None if required.get(&address).copied().unwrap_or(true) => {
                return Err(DeliveryError::assembly(format!(
                    "required lookup table {} does not exist",
                    address
                )));
            }
            None => debug!(table = %address, "Dropping missing optional lookup table"),
        }
    }

    Ok(tables)
}
