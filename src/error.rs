//! # Errors
//!
//! Typed errors for identifier parsing, document resolution, request
//! authorization and mutation submission.
//!
//! Every error carries a stable `kind` code and a human-readable `detail` so
//! callers (and tests) can tell exactly which validation step failed. Mapping
//! kinds to transport status codes is left to the transport adapter.

use serde_json::{Value, json};
use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by the resolution engine and authorization gate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The DID string could not be parsed.
    #[error(transparent)]
    InvalidIdentifier(#[from] IdentifierError),

    /// A log message could not be decoded or its signature did not verify.
    ///
    /// Recovered locally during replay: the event is skipped.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// The signed request envelope is structurally invalid.
    #[error("request envelope is malformed: {0}")]
    EnvelopeMalformed(String),

    /// The request envelope is outside its validity window.
    #[error("Request has expired")]
    RequestExpired,

    /// The document targeted by a request could not be resolved.
    #[error("target DID could not be resolved: {0}")]
    TargetNotResolvable(String),

    /// The document targeted by a request has been deactivated.
    #[error("DID has been deactivated: {0}")]
    DidDeactivated(String),

    /// The signing key is not a verification method of the target document.
    #[error("signer {0} is not a verification method of the document")]
    UnknownSigner(String),

    /// The signing key is not authorized for the required relationship.
    #[error("signer {signer} is not authorized for {capability}")]
    InsufficientCapability {
        /// Verification method id of the signer.
        signer: String,

        /// Verification relationship the request required.
        capability: String,
    },

    /// The request signature does not verify against the signer's key.
    #[error("request signature is invalid")]
    SignatureInvalid,

    /// The log did not confirm a submitted operation in time.
    ///
    /// The operation may still appear in the log later.
    #[error("log did not confirm submission within {0} ms")]
    SubmissionTimeout(u64),

    /// The request would change a verification method the identity network
    /// signs operations with.
    #[error("verification method {0} is managed by the identity-network")]
    ProtectedMethod(String),

    /// The log confirmed an operation that replay did not apply.
    ///
    /// The document is unchanged by the operation.
    #[error("operation {0} was recorded but not applied to the document")]
    MutationNotApplied(String),

    /// No signing key is held for the DID.
    #[error("DID is not controlled by the identity-network: {0}")]
    SigningKeyNotFound(String),

    /// The log transport failed to read or append.
    #[error("log unavailable: {0}")]
    LogUnavailable(String),

    /// Some other error (see message for details).
    #[error("{0}")]
    Other(String),
}

/// Reasons a DID string fails to parse.
///
/// Variants are listed in the order validation is performed; the first
/// failure wins.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    /// The string does not have the overall DID shape or the routing key is
    /// not valid key material.
    #[error("DID string is invalid. ID holds incorrect format.")]
    IncorrectFormat,

    /// The scheme prefix is not `did`.
    #[error("DID string is invalid: invalid prefix.")]
    InvalidPrefix,

    /// The method name is not the supported method.
    #[error("DID string is invalid: invalid method name: {0}")]
    InvalidMethodName(String),

    /// The network is not one of the supported networks.
    #[error("DID string is invalid. Invalid Hedera network.")]
    InvalidNetwork,

    /// The log address suffix is not `shard.realm.num`.
    #[error("failed to parse entity id: {0}")]
    EntityIdParseError(String),
}

impl IdentifierError {
    /// Stable code for the failed validation step.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::IncorrectFormat => "incorrect_format",
            Self::InvalidPrefix => "invalid_prefix",
            Self::InvalidMethodName(_) => "invalid_method_name",
            Self::InvalidNetwork => "invalid_network",
            Self::EntityIdParseError(_) => "entity_id_parse_error",
        }
    }
}

impl Error {
    /// Stable code identifying the kind of error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidIdentifier(e) => e.kind(),
            Self::MalformedEvent(_) => "malformed_event",
            Self::EnvelopeMalformed(_) => "envelope_malformed",
            Self::RequestExpired => "request_expired",
            Self::TargetNotResolvable(_) => "target_not_resolvable",
            Self::DidDeactivated(_) => "did_deactivated",
            Self::UnknownSigner(_) => "unknown_signer",
            Self::InsufficientCapability { .. } => "insufficient_capability",
            Self::SignatureInvalid => "signature_invalid",
            Self::SubmissionTimeout(_) => "submission_timeout",
            Self::ProtectedMethod(_) => "protected_method",
            Self::MutationNotApplied(_) => "mutation_not_applied",
            Self::SigningKeyNotFound(_) => "signing_key_not_found",
            Self::LogUnavailable(_) => "log_unavailable",
            Self::Other(_) => "other",
        }
    }

    /// Human-readable description of the error.
    #[must_use]
    pub fn detail(&self) -> String {
        self.to_string()
    }

    /// Returns `true` for errors caused by caller input. These are never
    /// worth retrying without changing the request.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidIdentifier(_)
                | Self::EnvelopeMalformed(_)
                | Self::RequestExpired
                | Self::DidDeactivated(_)
                | Self::UnknownSigner(_)
                | Self::InsufficientCapability { .. }
                | Self::SignatureInvalid
                | Self::ProtectedMethod(_)
        )
    }

    /// Render the error for a transport adapter.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "kind": self.kind(),
            "detail": self.detail(),
        })
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(format!("serialization: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_messages() {
        let err: Error = IdentifierError::InvalidMethodName("invalid".into()).into();
        assert_eq!(err.kind(), "invalid_method_name");
        assert_eq!(err.detail(), "DID string is invalid: invalid method name: invalid");

        let err: Error = IdentifierError::EntityIdParseError("0.0".into()).into();
        assert_eq!(err.detail(), "failed to parse entity id: 0.0");
    }

    #[test]
    fn json_shape() {
        assert_eq!(
            Error::RequestExpired.to_json(),
            json!({"kind": "request_expired", "detail": "Request has expired"})
        );
    }

    #[test]
    fn client_errors() {
        assert!(Error::RequestExpired.is_client_error());
        assert!(!Error::SubmissionTimeout(10).is_client_error());
        assert!(!Error::MalformedEvent("bad".into()).is_client_error());
        assert!(Error::ProtectedMethod("did:x#did-root-key".into()).is_client_error());
        assert!(!Error::MutationNotApplied("addService".into()).is_client_error());
    }
}
