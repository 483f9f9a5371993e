//! # `did:hedera` Resolution and Authorization
//!
//! The history of every `did:hedera` document lives in an append-only,
//! totally ordered consensus log. This crate derives the current state of a
//! document by replaying that history, and guards changes to it.
//!
//! * The [`Resolver`] replays the operation events recorded for an
//!   identifier, verifying each event's signature against the state built so
//!   far, and folds them into a [`DocumentState`].
//! * [`authorize`] checks that a [`SignedEnvelope`] is fresh and signed by a
//!   verification method the target document grants the required capability.
//! * The [`Registrar`] registers new identifiers and turns authorized requests
//!   into operation events on the log.
//!
//! The log itself, key custody and any transport (HTTP or otherwise) are
//! supplied by the caller through the traits in [`provider`].
//!
//! # Example
//!
//! ```rust,ignore
//! let registrar = Registrar::new(log, keystore, Config::default());
//! let state = registrar.register("z6MkreRjoWnX5sCbQRxJUbcCneSqfbbzuTWh62wUmqrSoT47").await?;
//!
//! let resolver = registrar.resolver();
//! let state = resolver.resolve(&state.document.id).await?;
//! ```

pub mod authorize;
pub mod config;
pub mod document;
pub mod error;
pub mod identifier;
pub mod mutate;
pub mod operation;
pub mod provider;
pub mod resolve;
mod state;

pub use self::authorize::{
    ActionDescriptor, Authorized, EnvelopeBuilder, SignedEnvelope, authorize, authorize_at,
    payload_hash,
};
pub use self::config::Config;
pub use self::document::{
    Document, DocumentMetadata, DocumentState, MethodType, Service, VerificationMethod,
    VerificationRelationship,
};
pub use self::error::{Error, IdentifierError, Result};
pub use self::identifier::{Identifier, LogAddress, Network};
pub use self::mutate::{MutationIntent, Registrar};
pub use self::operation::{EventId, Operation, OperationEvent, RelationshipEntry};
pub use self::provider::{KeyStore, Keypair, LogMessage, LogTransport, Signer};
pub use self::resolve::Resolver;
