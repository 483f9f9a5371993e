//! In-memory collaborators for testing

mod keyring;
mod keystore;
mod log;

pub use crate::keyring::Keyring;
pub use crate::keystore::MemoryKeyStore;
pub use crate::log::MemoryLog;
