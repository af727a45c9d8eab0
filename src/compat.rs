//! Uniform accessors over `VersionedMessage`
//!
//! Legacy and V0 messages expose the same header and key information through
//! different structs. The signer and output modules only need a handful of
//! these fields, so they read them here instead of matching on the version.

use solana_sdk::{
    message::{MessageHeader, VersionedMessage},
    pubkey::Pubkey,
};

#[inline]
#[must_use]
pub fn message_header(message: &VersionedMessage) -> &MessageHeader {
    match message {
        VersionedMessage::Legacy(legacy) => &legacy.header,
        VersionedMessage::V0(v0) => &v0.header,
    }
}

/// Account keys embedded in the message, excluding lookup-table loads.
#[inline]
#[must_use]
pub fn static_account_keys(message: &VersionedMessage) -> &[Pubkey] {
    match message {
        VersionedMessage::Legacy(legacy) => &legacy.account_keys,
        VersionedMessage::V0(v0) => &v0.account_keys,
    }
}

/// Keys that must sign, in signature order.
///
/// Always the first `num_required_signatures` static keys; the fee payer
/// comes first.
#[inline]
#[must_use]
pub fn required_signers(message: &VersionedMessage) -> &[Pubkey] {
    let keys = static_account_keys(message);
    let n = usize::from(message_header(message).num_required_signatures);
    &keys[..n.min(keys.len())]
}

#[inline]
#[must_use]
pub fn num_required_signatures(message: &VersionedMessage) -> u8 {
    message_header(message).num_required_signatures
}

/// Lookup tables the message loads addresses from (empty for legacy).
#[must_use]
pub fn lookup_table_addresses(message: &VersionedMessage) -> Vec<Pubkey> {
    match message {
        VersionedMessage::Legacy(_) => Vec::new(),
        VersionedMessage::V0(v0) => v0
            .address_table_lookups
            .iter()
            .map(|lookup| lookup.account_key)
            .collect(),
    }
}
