//! # DID Document
//!
//! A DID Document is a JSON-LD document that contains information related to a
//! DID: the keys that can act for the subject, the purposes those keys are
//! authorized for, and the services the subject advertises.

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifier::decode_key;
use crate::operation::EventId;

/// Default JSON-LD context of a DID document.
pub const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";

/// DID Document
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// The context of the DID document.
    #[serde(rename = "@context")]
    pub context: String,

    /// The DID for a particular DID subject.
    pub id: String,

    /// The verification methods (public keys) of the DID subject.
    #[serde(default)]
    pub verification_method: Vec<VerificationMethod>,

    /// Methods the subject authenticates with. Also the capability required
    /// to mutate the document.
    ///
    /// <https://www.w3.org/TR/did-core/#authentication>
    #[serde(default)]
    pub authentication: Vec<String>,

    /// Methods the subject expresses claims with.
    ///
    /// <https://www.w3.org/TR/did-core/#assertion>
    #[serde(default)]
    pub assertion_method: Vec<String>,

    /// Methods used to establish confidential communication with the subject.
    ///
    /// <https://www.w3.org/TR/did-core/#key-agreement>
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_agreement: Vec<String>,

    /// Methods the subject invokes cryptographic capabilities with.
    ///
    /// <https://www.w3.org/TR/did-core/#capability-invocation>
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capability_invocation: Vec<String>,

    /// Methods the subject delegates cryptographic capabilities with.
    ///
    /// <https://www.w3.org/TR/did-core/#capability-delegation>
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capability_delegation: Vec<String>,

    /// Services expressing ways of communicating with the subject.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<Service>,
}

impl Document {
    /// An empty document for `did`: no keys, relationships or services.
    #[must_use]
    pub fn new(did: impl Into<String>) -> Self {
        Self {
            context: DID_CONTEXT.to_string(),
            id: did.into(),
            verification_method: Vec::new(),
            authentication: Vec::new(),
            assertion_method: Vec::new(),
            key_agreement: Vec::new(),
            capability_invocation: Vec::new(),
            capability_delegation: Vec::new(),
            service: Vec::new(),
        }
    }

    /// Find a verification method by id.
    #[must_use]
    pub fn verification_method(&self, id: &str) -> Option<&VerificationMethod> {
        self.verification_method.iter().find(|vm| vm.id == id)
    }

    /// Find a service by id.
    #[must_use]
    pub fn service(&self, id: &str) -> Option<&Service> {
        self.service.iter().find(|s| s.id == id)
    }

    /// The references held by a verification relationship.
    #[must_use]
    pub fn relationship(&self, relationship: VerificationRelationship) -> &[String] {
        match relationship {
            VerificationRelationship::Authentication => &self.authentication,
            VerificationRelationship::AssertionMethod => &self.assertion_method,
            VerificationRelationship::KeyAgreement => &self.key_agreement,
            VerificationRelationship::CapabilityInvocation => &self.capability_invocation,
            VerificationRelationship::CapabilityDelegation => &self.capability_delegation,
        }
    }

    pub(crate) fn relationship_mut(
        &mut self, relationship: VerificationRelationship,
    ) -> &mut Vec<String> {
        match relationship {
            VerificationRelationship::Authentication => &mut self.authentication,
            VerificationRelationship::AssertionMethod => &mut self.assertion_method,
            VerificationRelationship::KeyAgreement => &mut self.key_agreement,
            VerificationRelationship::CapabilityInvocation => &mut self.capability_invocation,
            VerificationRelationship::CapabilityDelegation => &mut self.capability_delegation,
        }
    }

    /// Returns `true` if the method is referenced by the relationship.
    #[must_use]
    pub fn is_authorized(&self, method_id: &str, relationship: VerificationRelationship) -> bool {
        self.relationship(relationship).iter().any(|r| r == method_id)
    }
}

/// Services are used to express ways of communicating with the DID subject or
/// associated entities.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// A URI unique to the service.
    pub id: String,

    /// The service type. SHOULD be registered in the DID Specification
    /// Registries.
    #[serde(rename = "type")]
    pub type_: String,

    /// One or more endpoints for the service.
    #[allow(clippy::struct_field_names)]
    pub service_endpoint: Value,
}

/// A public key that can be used to authenticate or authorize interactions
/// with the DID subject.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    /// A DID URL that identifies the verification method.
    pub id: String,

    /// The type of verification method.
    #[serde(rename = "type")]
    pub type_: MethodType,

    /// The DID of the controller of the verification method.
    pub controller: String,

    /// The public key encoded as a Multibase.
    pub public_key_multibase: String,
}

impl VerificationMethod {
    /// Infer the DID from the key ID.
    #[must_use]
    pub fn did(&self) -> String {
        self.id.split('#').next().unwrap_or_default().to_string()
    }

    /// Decode the ed25519 public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not a multibase ed25519 public key.
    pub fn public_key(&self) -> anyhow::Result<ed25519_dalek::VerifyingKey> {
        let bytes = decode_key(&self.public_key_multibase)?;
        Ok(ed25519_dalek::VerifyingKey::from_bytes(&bytes)?)
    }
}

/// Verification method types supported by this library.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub enum MethodType {
    /// `ED25519` Verification key, version 2018.
    #[default]
    Ed25519VerificationKey2018,

    /// `ED25519` Verification key, version 2020.
    Ed25519VerificationKey2020,

    /// Generic Multi-key format.
    Multikey,
}

impl Display for MethodType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ed25519VerificationKey2018 => write!(f, "Ed25519VerificationKey2018"),
            Self::Ed25519VerificationKey2020 => write!(f, "Ed25519VerificationKey2020"),
            Self::Multikey => write!(f, "Multikey"),
        }
    }
}

/// Verification relationships.
///
/// <https://www.w3.org/TR/did-1.0/#verification-relationships>
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum VerificationRelationship {
    /// <https://www.w3.org/TR/did-1.0/#authentication>
    Authentication,

    /// <https://www.w3.org/TR/did-1.0/#assertion>
    AssertionMethod,

    /// <https://www.w3.org/TR/did-1.0/#key-agreement>
    KeyAgreement,

    /// <https://www.w3.org/TR/did-1.0/#capability-invocation>
    CapabilityInvocation,

    /// <https://www.w3.org/TR/did-1.0/#capability-delegation>
    CapabilityDelegation,
}

impl VerificationRelationship {
    /// All relationship kinds, in document order.
    pub const ALL: [Self; 5] = [
        Self::Authentication,
        Self::AssertionMethod,
        Self::KeyAgreement,
        Self::CapabilityInvocation,
        Self::CapabilityDelegation,
    ];
}

impl Display for VerificationRelationship {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::AssertionMethod => write!(f, "assertionMethod"),
            Self::KeyAgreement => write!(f, "keyAgreement"),
            Self::CapabilityInvocation => write!(f, "capabilityInvocation"),
            Self::CapabilityDelegation => write!(f, "capabilityDelegation"),
        }
    }
}

/// DID document metadata. Derived from the log events folded into the
/// document.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    /// Log timestamp of the `Create` event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    /// Log timestamp of the last applied event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,

    /// Set once the document has been deactivated. Never unset.
    pub deactivated: bool,

    /// Log position of the last applied event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<EventId>,
}

/// A resolved snapshot: the document plus metadata about how it was derived.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentState {
    /// The DID document.
    pub document: Document,

    /// Metadata describing the document's history.
    pub metadata: DocumentMetadata,
}

impl DocumentState {
    /// The empty skeleton for `did`: a valid document that no event has
    /// animated yet.
    #[must_use]
    pub fn empty(did: impl Into<String>) -> Self {
        Self {
            document: Document::new(did),
            metadata: DocumentMetadata::default(),
        }
    }

    /// Returns `true` once the document has been deactivated.
    #[must_use]
    pub const fn is_deactivated(&self) -> bool {
        self.metadata.deactivated
    }
}
