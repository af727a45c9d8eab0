//! Signing capability and keypair-backed wallet

use anyhow::{Context, Result};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

use crate::errors::DeliveryError;
use crate::tx_builder::{CompiledMessage, SignedTransaction};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("Signer {pubkey} refused to sign: {reason}")]
    Refused { pubkey: Pubkey, reason: String },

    #[error("Signer unavailable: {0}")]
    Unavailable(String),
}

/// Produces signatures over arbitrary bytes for one identity.
pub trait TxSigner: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    fn sign_message(&self, message: &[u8]) -> Result<Signature, SignerError>;
}

/// Keypair loaded from a Solana CLI keypair file
pub struct WalletManager {
    keypair: Arc<Keypair>,
}

impl WalletManager {
    /// Load a keypair from a JSON byte array or a raw 64-byte file.
    ///
    /// A leading `~/` is expanded from `$HOME`. All-zero keys are rejected.
    pub fn from_file(path: &str) -> Result<Self> {
        let path = expand_home(path);
        let raw = Zeroizing::new(
            std::fs::read(&path).with_context(|| format!("Failed to read keypair file: {}", path))?,
        );

        let bytes: Zeroizing<Vec<u8>> = if raw.len() == 64 {
            Zeroizing::new(raw.to_vec())
        } else {
            Zeroizing::new(
                serde_json::from_slice::<Vec<u8>>(&raw).context("Failed to parse keypair JSON")?,
            )
        };

        if bytes.len() != 64 {
            anyhow::bail!("Invalid keypair length: expected 64 bytes, got {}", bytes.len());
        }
        if bytes.iter().all(|&b| b == 0) {
            anyhow::bail!("Invalid keypair: all-zero key rejected");
        }

        let keypair = Keypair::try_from(bytes.as_slice()).context("Invalid keypair bytes")?;
        debug!(pubkey = %keypair.pubkey(), "Wallet keypair loaded");
        Ok(Self::from_keypair(keypair))
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }
}

impl Clone for WalletManager {
    fn clone(&self) -> Self {
        Self {
            keypair: Arc::clone(&self.keypair),
        }
    }
}

impl TxSigner for WalletManager {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    fn sign_message(&self, message: &[u8]) -> Result<Signature, SignerError> {
        self.keypair
            .try_sign_message(message)
            .map_err(|e| SignerError::Refused {
                pubkey: self.keypair.pubkey(),
                reason: e.to_string(),
            })
    }
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path.to_string(),
    }
}

/// Sign `compiled` once per required signer.
///
/// Signatures follow the message's required-signer order. The fee payer
/// signs first; every other required key must be among `additional`.
pub fn sign_compiled(
    compiled: CompiledMessage,
    payer: &dyn TxSigner,
    additional: &[Arc<dyn TxSigner>],
) -> Result<SignedTransaction, DeliveryError> {
    let payer_key = payer.pubkey();
    let mut signatures = Vec::with_capacity(compiled.required_signers().len());

    for key in compiled.required_signers() {
        let signer: &dyn TxSigner = if *key == payer_key {
            payer
        } else {
            additional
                .iter()
                .find(|s| s.pubkey() == *key)
                .map(|s| s.as_ref())
                .ok_or_else(|| {
                    DeliveryError::signing(format!("no signer supplied for required key {}", key))
                })?
        };

        let signature = signer
            .sign_message(compiled.bytes())
            .map_err(|e| DeliveryError::signing(e.to_string()))?;
        signatures.push(signature);
    }

    SignedTransaction::from_signatures(compiled, signatures)
}
