//! Compiled and signed transaction outputs
//!
//! Both types are immutable once built: fields are private and only exposed
//! by reference. A [`SignedTransaction`] caches its wire bytes so every
//! resubmission replays exactly the same payload.

use solana_sdk::{
    message::VersionedMessage, pubkey::Pubkey, signature::Signature,
    transaction::VersionedTransaction,
};

use crate::compat;
use crate::errors::DeliveryError;
use crate::types::{ComputeBudgetParameters, RecentCheckpoint};

/// A message compiled against one checkpoint, ready for signing.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledMessage {
    message: VersionedMessage,
    bytes: Vec<u8>,
    checkpoint: RecentCheckpoint,
    budget: ComputeBudgetParameters,
}

impl CompiledMessage {
    pub(crate) fn new(
        message: VersionedMessage,
        checkpoint: RecentCheckpoint,
        budget: ComputeBudgetParameters,
    ) -> Self {
        let bytes = message.serialize();
        Self {
            message,
            bytes,
            checkpoint,
            budget,
        }
    }

    pub fn message(&self) -> &VersionedMessage {
        &self.message
    }

    /// Serialized message; the exact bytes each signer signs.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn checkpoint(&self) -> &RecentCheckpoint {
        &self.checkpoint
    }

    pub fn budget(&self) -> &ComputeBudgetParameters {
        &self.budget
    }

    /// Keys that must sign, fee payer first.
    pub fn required_signers(&self) -> &[Pubkey] {
        compat::required_signers(&self.message)
    }

    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.required_signers().first()
    }
}

/// A fully signed transaction.
///
/// Identified by its first signature, which is stable across any number of
/// resubmissions of the same bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedTransaction {
    transaction: VersionedTransaction,
    wire: Vec<u8>,
    checkpoint: RecentCheckpoint,
    budget: ComputeBudgetParameters,
}

impl SignedTransaction {
    /// Attach `signatures` (in required-signer order) to `compiled`.
    ///
    /// # Errors
    ///
    /// `Signing` if the count does not match the message header or any
    /// signature fails verification.
    pub fn from_signatures(
        compiled: CompiledMessage,
        signatures: Vec<Signature>,
    ) -> Result<Self, DeliveryError> {
        let expected = usize::from(compat::num_required_signatures(&compiled.message));
        if expected == 0 || signatures.len() != expected {
            return Err(DeliveryError::signing(format!(
                "expected {} signatures, got {}",
                expected,
                signatures.len()
            )));
        }

        let CompiledMessage {
            message,
            checkpoint,
            budget,
            ..
        } = compiled;
        let transaction = VersionedTransaction {
            signatures,
            message,
        };

        if let Some(idx) = transaction
            .verify_with_results()
            .iter()
            .position(|ok| !ok)
        {
            return Err(DeliveryError::signing(format!(
                "signature {} does not verify against the message",
                idx
            )));
        }

        let wire = bincode::serialize(&transaction)
            .map_err(|e| DeliveryError::signing(format!("serialize signed transaction: {}", e)))?;

        Ok(Self {
            transaction,
            wire,
            checkpoint,
            budget,
        })
    }

    /// Transaction identifier (the fee payer's signature).
    pub fn signature(&self) -> Signature {
        self.transaction
            .signatures
            .first()
            .copied()
            .unwrap_or_default()
    }

    pub fn transaction(&self) -> &VersionedTransaction {
        &self.transaction
    }

    /// Serialized signed transaction as submitted on the wire.
    pub fn wire_bytes(&self) -> &[u8] {
        &self.wire
    }

    /// Checkpoint the message was compiled against.
    pub fn checkpoint(&self) -> &RecentCheckpoint {
        &self.checkpoint
    }

    pub fn budget(&self) -> &ComputeBudgetParameters {
        &self.budget
    }
}
