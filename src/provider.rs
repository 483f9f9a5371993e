//! # Provider Traits
//!
//! Collaborators the core depends on but does not implement: the consensus
//! log transport, the store holding the network's signing keys, and signers.
//! Implementers adapt whichever ledger client or database they use.

use std::future::Future;

use anyhow::{Result, anyhow};
use ed25519_dalek::{Signer as _, SigningKey};
use rand::rngs::OsRng;

use crate::identifier::LogAddress;
use crate::operation::EventId;

/// A raw message as recorded by the log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogMessage {
    /// Position assigned to the message by the log.
    pub event_id: EventId,

    /// Message bytes exactly as submitted.
    pub contents: Vec<u8>,
}

/// [`LogTransport`] gives access to the append-only, totally ordered message
/// log that is the source of truth for document history.
///
/// Several identifiers may share one log address.
pub trait LogTransport: Send + Sync + Clone {
    /// Read up to `limit` messages recorded against `address`, in ascending
    /// [`EventId`] order, starting strictly after `after` (or from the
    /// beginning when `None`).
    ///
    /// An empty page marks the end of the stream. Every call reads the log
    /// afresh; nothing is consumed.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    fn read(
        &self, address: &LogAddress, after: Option<EventId>, limit: usize,
    ) -> impl Future<Output = Result<Vec<LogMessage>>> + Send;

    /// Submit a message to the log.
    ///
    /// Resolves only once the log has durably ordered the message, returning
    /// the position it was assigned. Local acceptance of the submission is not
    /// confirmation.
    ///
    /// # Errors
    ///
    /// Returns an error if the submission is rejected.
    fn append(
        &self, address: &LogAddress, payload: Vec<u8>,
    ) -> impl Future<Output = Result<EventId>> + Send;
}

/// [`KeyStore`] holds the private keys the network signs log operations
/// with, keyed by DID.
///
/// Only used when composing operations, never by resolution.
pub trait KeyStore: Send + Sync + Clone {
    /// Fetch the secret signing key for a DID, or `None` if not held.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, did: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Store the secret signing key for a DID.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn put(&self, did: &str, secret: &[u8]) -> impl Future<Output = Result<()>> + Send;
}

/// [`Signer`] produces ed25519 signatures.
///
/// Async and fallible because the implementer may hold keys remotely.
pub trait Signer: Send + Sync {
    /// Sign the message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be signed.
    fn try_sign(&self, msg: &[u8]) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// The public key that verifies this signer's signatures.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be retrieved.
    fn verifying_key(&self) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// An in-memory ed25519 key pair.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random key pair.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Load a key pair from its 32 byte secret.
    ///
    /// # Errors
    ///
    /// Returns an error if `secret` is not 32 bytes.
    pub fn from_secret(secret: &[u8]) -> Result<Self> {
        let secret: [u8; 32] = secret.try_into().map_err(|_| anyhow!("invalid secret key"))?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&secret),
        })
    }

    /// The 32 byte secret.
    #[must_use]
    pub fn secret(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// The 32 byte public key.
    #[must_use]
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair").field("public_key", &self.public_key()).finish_non_exhaustive()
    }
}

impl Signer for Keypair {
    async fn try_sign(&self, msg: &[u8]) -> Result<Vec<u8>> {
        Ok(self.signing_key.sign(msg).to_bytes().to_vec())
    }

    async fn verifying_key(&self) -> Result<Vec<u8>> {
        Ok(self.public_key().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keypair_round_trip() {
        let keypair = Keypair::generate();
        let restored = Keypair::from_secret(&keypair.secret()).expect("should restore");
        assert_eq!(restored.public_key(), keypair.public_key());

        let sig = restored.try_sign(b"message").await.expect("should sign");
        let vk = ed25519_dalek::VerifyingKey::from_bytes(&keypair.public_key())
            .expect("should decode");
        let sig = ed25519_dalek::Signature::from_slice(&sig).expect("should decode");
        assert!(vk.verify_strict(b"message", &sig).is_ok());
    }

    #[test]
    fn short_secret() {
        assert!(Keypair::from_secret(&[1, 2, 3]).is_err());
    }
}
