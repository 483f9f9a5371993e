//! # Mutation Orchestrator
//!
//! Turns authorized requests into signed operation events on the consensus
//! log, then returns the document as it stands once the log has confirmed the
//! event.
//!
//! Operations are signed by the identity network's root key for the DID, held
//! in the [`KeyStore`]. The caller's own key only authorizes the request (see
//! [`crate::authorize`]).

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::authorize::{SignedEnvelope, authorize, payload_hash};
use crate::config::Config;
use crate::document::{
    DocumentState, MethodType, Service, VerificationMethod, VerificationRelationship,
};
use crate::error::{Error, Result};
use crate::identifier::{Identifier, decode_key, encode_key};
use crate::operation::{self, EventId, Operation, RelationshipEntry};
use crate::provider::{KeyStore, Keypair, LogTransport};
use crate::resolve::Resolver;

/// Fragment of the verification method holding the network's root key.
pub const ROOT_KEY_FRAGMENT: &str = "did-root-key";

/// Fragment of the verification method holding the registrant's key.
pub const USER_KEY_FRAGMENT: &str = "key-1";

/// Changes a client can request to a DID document.
///
/// Serializes the same way as the corresponding log [`Operation`], which is
/// the form clients hash into [`crate::authorize::ActionDescriptor::payload_hash`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "operation", content = "event", rename_all = "camelCase")]
pub enum MutationIntent {
    /// Add a service.
    AddService(Service),

    /// Replace a service.
    UpdateService(Service),

    /// Remove a service.
    RemoveService {
        /// Service id.
        id: String,
    },

    /// Add a verification method.
    AddVerificationMethod(VerificationMethod),

    /// Replace a verification method.
    UpdateVerificationMethod(VerificationMethod),

    /// Remove a verification method.
    RemoveVerificationMethod {
        /// Verification method id.
        id: String,
    },

    /// Add a verification method to a relationship.
    AddVerificationRelationship(RelationshipEntry),

    /// Replace a verification method referenced by a relationship.
    UpdateVerificationRelationship(RelationshipEntry),

    /// Remove a verification method from a relationship.
    RemoveVerificationRelationship {
        /// Verification method id.
        id: String,

        /// Relationship to remove it from.
        relationship_type: VerificationRelationship,
    },

    /// Deactivate the document.
    Revoke,
}

impl MutationIntent {
    /// The relationship a request signer must hold for this change.
    #[must_use]
    pub const fn capability(&self) -> VerificationRelationship {
        VerificationRelationship::Authentication
    }

    /// The action verb requests for this change carry.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.clone().into_operation().name()
    }

    /// Id of the verification method the change adds, replaces or removes.
    #[must_use]
    pub fn method_id(&self) -> Option<&str> {
        match self {
            Self::AddVerificationMethod(vm) | Self::UpdateVerificationMethod(vm) => Some(&vm.id),
            Self::AddVerificationRelationship(entry)
            | Self::UpdateVerificationRelationship(entry) => Some(&entry.method.id),
            Self::RemoveVerificationMethod { id }
            | Self::RemoveVerificationRelationship { id, .. } => Some(id),
            _ => None,
        }
    }

    /// The log operation that records this change.
    #[must_use]
    pub fn into_operation(self) -> Operation {
        match self {
            Self::AddService(service) => Operation::AddService(service),
            Self::UpdateService(service) => Operation::UpdateService(service),
            Self::RemoveService { id } => Operation::RemoveService { id },
            Self::AddVerificationMethod(vm) => Operation::AddVerificationMethod(vm),
            Self::UpdateVerificationMethod(vm) => Operation::UpdateVerificationMethod(vm),
            Self::RemoveVerificationMethod { id } => Operation::RemoveVerificationMethod { id },
            Self::AddVerificationRelationship(entry) => {
                Operation::AddVerificationRelationship(entry)
            }
            Self::UpdateVerificationRelationship(entry) => {
                Operation::UpdateVerificationRelationship(entry)
            }
            Self::RemoveVerificationRelationship {
                id,
                relationship_type,
            } => Operation::RemoveVerificationRelationship {
                id,
                relationship_type,
            },
            Self::Revoke => Operation::Revoke,
        }
    }
}

/// Registers DIDs and submits document mutations to the log.
#[derive(Clone, Debug)]
pub struct Registrar<L, K> {
    resolver: Resolver<L>,
    keystore: K,
}

impl<L: LogTransport, K: KeyStore> Registrar<L, K> {
    /// Create a registrar writing to `log`, signing with keys from `keystore`.
    #[must_use]
    pub fn new(log: L, keystore: K, config: Config) -> Self {
        Self {
            resolver: Resolver::new(log, config),
            keystore,
        }
    }

    /// The resolver the registrar reads documents with. Shares its cache.
    #[must_use]
    pub const fn resolver(&self) -> &Resolver<L> {
        &self.resolver
    }

    fn config(&self) -> &Config {
        self.resolver.config()
    }

    /// Register a new DID for the holder of `public_key_multibase`.
    ///
    /// A fresh root key is generated for the network to sign operations with
    /// and the DID is derived from it. The document is created with the root
    /// key as owner, then the holder's key is added to `authentication` so
    /// the holder can authorize future changes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if the key is not a multibase
    /// ed25519 public key, or a submission error (see [`Self::submit_mutation`]).
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn register(&self, public_key_multibase: &str) -> Result<DocumentState> {
        let user_key = decode_key(public_key_multibase)?;

        let root = Keypair::generate();
        let identifier = Identifier::from_public_key(
            self.config().network,
            &root.public_key(),
            self.config().log_address,
        );
        let did = identifier.did();
        self.keystore
            .put(&did, &root.secret())
            .await
            .map_err(|e| Error::Other(format!("issue storing signing key: {e}")))?;

        let owner = VerificationMethod {
            id: format!("{did}#{ROOT_KEY_FRAGMENT}"),
            type_: MethodType::Ed25519VerificationKey2018,
            controller: did.clone(),
            public_key_multibase: encode_key(&root.public_key()),
        };
        self.submit(&identifier, Operation::Create { owner }, &root).await?;

        let holder = RelationshipEntry {
            relationship_type: VerificationRelationship::Authentication,
            method: VerificationMethod {
                id: format!("{did}#{USER_KEY_FRAGMENT}"),
                type_: MethodType::Ed25519VerificationKey2018,
                controller: did.clone(),
                public_key_multibase: encode_key(&user_key),
            },
        };
        let operation = Operation::AddVerificationRelationship(holder);
        let event_id = self.submit(&identifier, operation, &root).await?;

        tracing::info!(%did, "registered DID");
        self.read_back(&did, "addVerificationRelationship", event_id).await
    }

    /// Deactivate a DID document. Final: no later change is applied.
    ///
    /// # Errors
    ///
    /// See [`Self::submit_mutation`].
    pub async fn revoke(&self, did: &str, envelope: &SignedEnvelope) -> Result<DocumentState> {
        self.submit_mutation(did, envelope, MutationIntent::Revoke).await
    }

    /// Apply a change to a DID document on behalf of the request signer.
    ///
    /// The envelope must target `did`, name the intent's action and carry the
    /// hash of `intent`. Once the request is authorized the change is signed
    /// with the DID's root key and appended to the log. The returned state is
    /// read back from the log after confirmation and includes the change.
    ///
    /// The root key's verification method cannot be changed this way: the
    /// network would no longer be able to sign for the document.
    ///
    /// # Cancellation
    ///
    /// Dropping the returned future after the append has been submitted does
    /// not withdraw it: the change may still be recorded by the log. The same
    /// holds when [`Error::SubmissionTimeout`] is returned. Resolve the
    /// document to find out.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EnvelopeMalformed`] if the envelope does not describe
    /// `intent` for `did`, any error from [`authorize`],
    /// [`Error::ProtectedMethod`] if the change targets the root key,
    /// [`Error::SigningKeyNotFound`] if the network holds no key for the DID,
    /// [`Error::SubmissionTimeout`] or [`Error::LogUnavailable`] if the log
    /// does not confirm the change, and [`Error::MutationNotApplied`] if the
    /// confirmed change is not part of the resolved document.
    #[tracing::instrument(
        level = "debug", skip(self, envelope, intent), fields(operation = intent.name())
    )]
    pub async fn submit_mutation(
        &self, did: &str, envelope: &SignedEnvelope, intent: MutationIntent,
    ) -> Result<DocumentState> {
        let identifier = Identifier::from_str(did)?;
        let did = identifier.did();

        if envelope.action.target != did {
            return Err(Error::EnvelopeMalformed("request targets another DID".into()));
        }
        if envelope.action.method != intent.name() {
            return Err(Error::EnvelopeMalformed(format!(
                "request action {} does not match {}",
                envelope.action.method,
                intent.name()
            )));
        }
        if envelope.action.payload_hash != payload_hash(&intent)? {
            return Err(Error::EnvelopeMalformed("payload hash does not match the change".into()));
        }

        authorize(envelope, intent.capability(), &self.resolver).await?;

        let root_id = format!("{did}#{ROOT_KEY_FRAGMENT}");
        if intent.method_id() == Some(root_id.as_str()) {
            return Err(Error::ProtectedMethod(root_id));
        }

        let root = self.signing_key(&did).await?;
        let name = intent.name();
        let event_id = self.submit(&identifier, intent.into_operation(), &root).await?;
        self.read_back(&did, name, event_id).await
    }

    // Resolve the document once the log has confirmed `event_id`, which must
    // have been applied.
    async fn read_back(
        &self, did: &str, operation: &'static str, event_id: EventId,
    ) -> Result<DocumentState> {
        self.resolver.invalidate(did);
        let state = self.resolver.resolve_fresh(did).await?;
        if state.metadata.version_id < Some(event_id) && !state.is_deactivated() {
            tracing::error!(%did, operation, ?event_id, "confirmed operation was not applied");
            return Err(Error::MutationNotApplied(operation.to_string()));
        }
        Ok(state)
    }

    async fn signing_key(&self, did: &str) -> Result<Keypair> {
        let secret = self
            .keystore
            .get(did)
            .await
            .map_err(|e| Error::Other(format!("issue reading signing key: {e}")))?;
        let Some(secret) = secret else {
            return Err(Error::SigningKeyNotFound(did.to_string()));
        };
        Ok(Keypair::from_secret(&secret)?)
    }

    async fn submit(
        &self, identifier: &Identifier, operation: Operation, root: &Keypair,
    ) -> Result<EventId> {
        let did = identifier.did();
        let signer_id = format!("{did}#{ROOT_KEY_FRAGMENT}");
        let name = operation.name();
        let payload = operation::encode(&did, operation, &signer_id, root).await?;

        let timeout = self.config().submission_timeout;
        let append = self.resolver.log().append(&identifier.log_address, payload);
        match tokio::time::timeout(timeout, append).await {
            Ok(Ok(event_id)) => {
                tracing::info!(%did, operation = name, ?event_id, "submission confirmed");
                Ok(event_id)
            }
            Ok(Err(e)) => {
                tracing::error!(%did, operation = name, "submission failed: {e:#}");
                Err(Error::LogUnavailable(format!("{e:#}")))
            }
            Err(_) => {
                let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::error!(%did, operation = name, millis, "submission not confirmed");
                Err(Error::SubmissionTimeout(millis))
            }
        }
    }
}
