//! # Key Store

use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use hcs_did::KeyStore;

/// Holds signing keys in memory, keyed by DID.
#[derive(Clone, Debug, Default)]
pub struct MemoryKeyStore {
    keys: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryKeyStore {
    /// Create an empty key store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the key held for `did`.
    pub fn remove(&self, did: &str) {
        self.keys.remove(did);
    }
}

impl KeyStore for MemoryKeyStore {
    async fn get(&self, did: &str) -> Result<Option<Vec<u8>>> {
        let Some(secret) = self.keys.get(did) else {
            return Ok(None);
        };
        Ok(Some(secret.to_vec()))
    }

    async fn put(&self, did: &str, secret: &[u8]) -> Result<()> {
        self.keys.insert(did.to_string(), secret.to_vec());
        Ok(())
    }
}
