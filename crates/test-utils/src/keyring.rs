//! # Keyring
//!
//! A DID holder's own key: the key that signs requests.

use anyhow::Result;
use hcs_did::identifier::encode_key;
use hcs_did::{Keypair, Signer};

/// An ed25519 key held by a DID holder.
#[derive(Clone, Debug)]
pub struct Keyring {
    keypair: Keypair,
}

impl Default for Keyring {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyring {
    /// Generate a new holder key.
    #[must_use]
    pub fn new() -> Self {
        Self {
            keypair: Keypair::generate(),
        }
    }

    /// The public key as a multibase ed25519 key.
    #[must_use]
    pub fn public_key_multibase(&self) -> String {
        encode_key(&self.keypair.public_key())
    }
}

impl Signer for Keyring {
    async fn try_sign(&self, msg: &[u8]) -> Result<Vec<u8>> {
        self.keypair.try_sign(msg).await
    }

    async fn verifying_key(&self) -> Result<Vec<u8>> {
        self.keypair.verifying_key().await
    }
}
