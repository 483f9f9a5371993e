//! # Operations
//!
//! Typed operation events and their wire representation on the consensus log.
//!
//! Each log message is a JSON object holding the unsigned `message` and a
//! multibase (base58btc) ed25519 `signature` over the JCS canonical form of
//! that message:
//!
//! ```json
//! {
//!   "message": {
//!     "did": "did:hedera:testnet:z6Mk..._0.0.3",
//!     "signer": "did:hedera:testnet:z6Mk..._0.0.3#did-root-key",
//!     "timestamp": "2024-05-01T10:00:00Z",
//!     "operation": "addService",
//!     "event": { "id": "...#service-1", "type": "LinkedDomains", "serviceEndpoint": "..." }
//!   },
//!   "signature": "z3yT..."
//! }
//! ```

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use ed25519_dalek::Signature;
use multibase::Base;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{
    DocumentState, Service, VerificationMethod, VerificationRelationship,
};
use crate::error::{Error, Result};
use crate::identifier::{Identifier, decode_key};
use crate::provider::{LogMessage, Signer};

/// Position of an event in the log: consensus timestamp, then the log's
/// sequence number. Gives a total order across all events of a log.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct EventId {
    /// Consensus timestamp assigned by the log.
    pub timestamp: DateTime<Utc>,

    /// Sequence number assigned by the log.
    pub sequence: u64,
}

impl EventId {
    /// Create a new event id.
    #[must_use]
    pub const fn new(timestamp: DateTime<Utc>, sequence: u64) -> Self {
        Self { timestamp, sequence }
    }
}

impl Ord for EventId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp.cmp(&other.timestamp).then(self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for EventId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A verification method together with the relationship it is added to.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipEntry {
    /// The relationship the method is referenced by.
    pub relationship_type: VerificationRelationship,

    /// The verification method.
    #[serde(flatten)]
    pub method: VerificationMethod,
}

/// Operations that can be recorded against a DID document.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "operation", content = "event", rename_all = "camelCase")]
pub enum Operation {
    /// Establish the document and its owner (root) key.
    Create {
        /// The owner verification method.
        owner: VerificationMethod,
    },

    /// Deactivate the document. Final.
    Revoke,

    /// Add a service.
    AddService(Service),

    /// Replace a service with the same id.
    UpdateService(Service),

    /// Remove a service.
    RemoveService {
        /// Id of the service to remove.
        id: String,
    },

    /// Add a verification method without any relationship.
    AddVerificationMethod(VerificationMethod),

    /// Replace a verification method with the same id.
    UpdateVerificationMethod(VerificationMethod),

    /// Remove a verification method and every reference to it.
    RemoveVerificationMethod {
        /// Id of the verification method to remove.
        id: String,
    },

    /// Add a verification method to a relationship.
    AddVerificationRelationship(RelationshipEntry),

    /// Replace the verification method referenced by a relationship.
    UpdateVerificationRelationship(RelationshipEntry),

    /// Remove a verification method from a relationship.
    RemoveVerificationRelationship {
        /// Id of the verification method.
        id: String,

        /// The relationship to remove it from.
        relationship_type: VerificationRelationship,
    },
}

impl Operation {
    /// Short name of the operation, as used on the wire.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Revoke => "revoke",
            Self::AddService(_) => "addService",
            Self::UpdateService(_) => "updateService",
            Self::RemoveService { .. } => "removeService",
            Self::AddVerificationMethod(_) => "addVerificationMethod",
            Self::UpdateVerificationMethod(_) => "updateVerificationMethod",
            Self::RemoveVerificationMethod { .. } => "removeVerificationMethod",
            Self::AddVerificationRelationship(_) => "addVerificationRelationship",
            Self::UpdateVerificationRelationship(_) => "updateVerificationRelationship",
            Self::RemoveVerificationRelationship { .. } => "removeVerificationRelationship",
        }
    }
}

/// A decoded operation event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationEvent {
    /// Position of the event in the log.
    pub event_id: EventId,

    /// The DID the event applies to.
    pub did: String,

    /// Id of the verification method that signed the event.
    pub signer: String,

    /// Submitter's clock when the event was composed.
    pub timestamp: DateTime<Utc>,

    /// The operation.
    pub operation: Operation,

    /// Signature over `signed_payload`.
    pub signature: Vec<u8>,

    /// Canonical bytes the signature covers.
    pub signed_payload: Vec<u8>,
}

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct Message {
    did: String,
    signer: String,
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    operation: Operation,
}

#[derive(Deserialize, Serialize)]
struct SignedMessage {
    message: Value,
    signature: String,
}

/// Decode a raw log message into an [`OperationEvent`].
///
/// Only checks structure. Use [`verify`] to check the signature against a
/// document state.
///
/// # Errors
///
/// Returns [`Error::MalformedEvent`] if the message is not a well-formed
/// signed operation.
pub fn decode(msg: &LogMessage) -> Result<OperationEvent> {
    let signed: SignedMessage = serde_json::from_slice(&msg.contents)
        .map_err(|e| Error::MalformedEvent(format!("invalid message envelope: {e}")))?;
    let signed_payload = serde_json_canonicalizer::to_vec(&signed.message)
        .map_err(|e| Error::MalformedEvent(format!("issue canonicalizing message: {e}")))?;
    let message: Message = serde_json::from_value(signed.message)
        .map_err(|e| Error::MalformedEvent(format!("invalid message: {e}")))?;

    let (base, signature) = multibase::decode(&signed.signature)
        .map_err(|e| Error::MalformedEvent(format!("invalid signature encoding: {e}")))?;
    if base != Base::Base58Btc {
        return Err(Error::MalformedEvent("unsupported signature encoding".into()));
    }

    Ok(OperationEvent {
        event_id: msg.event_id,
        did: message.did,
        signer: message.signer,
        timestamp: message.timestamp,
        operation: message.operation,
        signature,
        signed_payload,
    })
}

/// Compose and sign the wire bytes for an operation.
///
/// `signer_id` is the verification method id the resolver will look up to
/// verify the signature; `signer` must hold the matching private key.
///
/// # Errors
///
/// Returns an error if the message cannot be serialized or signed.
pub async fn encode(
    did: &str, operation: Operation, signer_id: &str, signer: &impl Signer,
) -> Result<Vec<u8>> {
    let message = Message {
        did: did.to_string(),
        signer: signer_id.to_string(),
        timestamp: Utc::now(),
        operation,
    };
    let message = serde_json::to_value(&message)?;
    let payload = serde_json_canonicalizer::to_vec(&message)
        .map_err(|e| Error::Other(format!("issue canonicalizing message: {e}")))?;
    let signature = signer.try_sign(&payload).await?;

    let signed = SignedMessage {
        message,
        signature: multibase::encode(Base::Base58Btc, signature),
    };
    Ok(serde_json::to_vec(&signed)?)
}

/// Verify an event's signature in the context of the document it applies to.
///
/// A `Create` is the bootstrap exception: no authority exists yet, so it must
/// be signed by the owner key it introduces, and that key must be the one the
/// identifier's routing key encodes. Every other event must be signed by a
/// verification method of `state` referenced by `authentication`.
///
/// # Errors
///
/// Returns [`Error::MalformedEvent`] describing why the event is not
/// acceptable.
pub fn verify(event: &OperationEvent, state: &DocumentState) -> Result<()> {
    let malformed = |reason: &str| Error::MalformedEvent(reason.to_string());

    let method = match &event.operation {
        Operation::Create { owner } => {
            if event.signer != owner.id {
                return Err(malformed("create must be signed by the owner key"));
            }
            if owner.did() != event.did {
                return Err(malformed("owner key belongs to another DID"));
            }
            let identifier = Identifier::from_str(&event.did)
                .map_err(|e| Error::MalformedEvent(format!("invalid DID: {e}")))?;
            let owner_key = decode_key(&owner.public_key_multibase)
                .map_err(|_| malformed("owner key is not an ed25519 key"))?;
            if identifier.public_key().ok() != Some(owner_key) {
                return Err(malformed("owner key does not match the DID routing key"));
            }
            owner
        }
        _ => {
            let Some(method) = state.document.verification_method(&event.signer) else {
                return Err(malformed("signer is not a verification method of the document"));
            };
            if !state.document.is_authorized(&method.id, VerificationRelationship::Authentication) {
                return Err(malformed("signer is not authorized to update the document"));
            }
            method
        }
    };

    let key = method
        .public_key()
        .map_err(|e| Error::MalformedEvent(format!("invalid signer key: {e}")))?;
    let signature =
        Signature::from_slice(&event.signature).map_err(|_| malformed("invalid signature"))?;
    key.verify_strict(&event.signed_payload, &signature)
        .map_err(|_| malformed("signature does not verify"))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::document::MethodType;
    use crate::identifier::{LogAddress, Network, encode_key};
    use crate::provider::Keypair;

    fn owner(keypair: &Keypair) -> (String, VerificationMethod) {
        let address = LogAddress::new(0, 0, 5);
        let did =
            Identifier::from_public_key(Network::Testnet, &keypair.public_key(), address).did();
        let vm = VerificationMethod {
            id: format!("{did}#did-root-key"),
            type_: MethodType::Ed25519VerificationKey2018,
            controller: did.clone(),
            public_key_multibase: encode_key(&keypair.public_key()),
        };
        (did, vm)
    }

    fn log_message(contents: Vec<u8>, sequence: u64) -> LogMessage {
        LogMessage {
            event_id: EventId::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap(), sequence),
            contents,
        }
    }

    #[test]
    fn event_order() {
        let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let later = Utc.timestamp_opt(1_700_000_001, 0).unwrap();
        assert!(EventId::new(t, 2) < EventId::new(later, 1));
        assert!(EventId::new(t, 1) < EventId::new(t, 2));
    }

    #[test]
    fn wire_shape() {
        let op = Operation::RemoveService { id: "did:x#service-1".into() };
        let value = serde_json::to_value(&op).expect("should serialize");
        assert_eq!(
            value,
            json!({"operation": "removeService", "event": {"id": "did:x#service-1"}})
        );

        let value = serde_json::to_value(Operation::Revoke).expect("should serialize");
        assert_eq!(value, json!({"operation": "revoke"}));
    }

    #[tokio::test]
    async fn create_verifies() {
        let keypair = Keypair::generate();
        let (did, vm) = owner(&keypair);
        let op = Operation::Create { owner: vm.clone() };
        let bytes = encode(&did, op.clone(), &vm.id, &keypair).await.expect("should encode");

        let event = decode(&log_message(bytes, 1)).expect("should decode");
        assert_eq!(event.operation, op);
        assert_eq!(event.did, did);
        verify(&event, &DocumentState::empty(&did)).expect("should verify");
    }

    #[tokio::test]
    async fn create_by_foreign_key() {
        let keypair = Keypair::generate();
        let (did, mut vm) = owner(&keypair);
        let intruder = Keypair::generate();
        vm.public_key_multibase = encode_key(&intruder.public_key());

        let bytes = encode(&did, Operation::Create { owner: vm.clone() }, &vm.id, &intruder)
            .await
            .expect("should encode");
        let event = decode(&log_message(bytes, 1)).expect("should decode");
        let Err(Error::MalformedEvent(reason)) = verify(&event, &DocumentState::empty(&did)) else {
            panic!("should not verify");
        };
        assert_eq!(reason, "owner key does not match the DID routing key");
    }

    #[tokio::test]
    async fn tampered_payload() {
        let keypair = Keypair::generate();
        let (did, vm) = owner(&keypair);
        let bytes = encode(&did, Operation::Create { owner: vm.clone() }, &vm.id, &keypair)
            .await
            .expect("should encode");

        let mut value: Value = serde_json::from_slice(&bytes).expect("should parse");
        value["message"]["timestamp"] = json!("2001-01-01T00:00:00Z");
        let bytes = serde_json::to_vec(&value).expect("should serialize");

        let event = decode(&log_message(bytes, 1)).expect("should decode");
        assert!(verify(&event, &DocumentState::empty(&did)).is_err());
    }

    #[test]
    fn garbage() {
        let err = decode(&log_message(b"not json".to_vec(), 1)).expect_err("should fail");
        assert_eq!(err.kind(), "malformed_event");

        let unknown = json!({
            "message": {
                "did": "did:x",
                "signer": "did:x#k",
                "timestamp": "2024-01-01T00:00:00Z",
                "operation": "explode"
            },
            "signature": "z1111"
        });
        let bytes = serde_json::to_vec(&unknown).expect("should serialize");
        assert!(decode(&log_message(bytes, 1)).is_err());
    }
}
