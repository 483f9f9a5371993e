//! # Signed Request Authorization
//!
//! Verifies that a mutation request is signed by a key the target document
//! grants the required capability to, and that the request is fresh.
//!
//! Requests arrive as a [`SignedEnvelope`]: a description of the action, the
//! id of the verification method that signed it, a validity window, and an
//! ed25519 signature over the JCS canonical form of everything but the
//! signature itself. The validity window is signed, so a captured request
//! cannot be re-dated.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use ed25519_dalek::Signature;
use multibase::Base;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::instrument;

use crate::document::{DocumentState, VerificationMethod, VerificationRelationship};
use crate::error::{Error, Result};
use crate::identifier::Identifier;
use crate::provider::{LogTransport, Signer};
use crate::resolve::Resolver;

/// What a request asks to do.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActionDescriptor {
    /// The DID the action targets.
    pub target: String,

    /// Action verb, for example `addService`.
    pub method: String,

    /// Multibase SHA-256 of the JCS canonical form of the action payload. See
    /// [`payload_hash`].
    pub payload_hash: String,
}

/// A signed, time-bounded request.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignedEnvelope {
    /// The requested action.
    pub action: ActionDescriptor,

    /// Id (DID URL) of the verification method that signed the request.
    pub signer_key_id: String,

    /// Start of the request's validity window.
    pub valid_from: DateTime<Utc>,

    /// Length of the validity window, in milliseconds.
    pub valid_duration_ms: u64,

    /// Multibase (base58btc) ed25519 signature.
    pub signature: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Unsigned<'a> {
    action: &'a ActionDescriptor,
    signer_key_id: &'a str,
    valid_from: &'a DateTime<Utc>,
    valid_duration_ms: u64,
}

impl SignedEnvelope {
    /// The bytes the signature covers: JCS canonical JSON of every field
    /// except `signature`.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope cannot be canonicalized.
    pub fn signing_input(&self) -> Result<Vec<u8>> {
        let unsigned = Unsigned {
            action: &self.action,
            signer_key_id: &self.signer_key_id,
            valid_from: &self.valid_from,
            valid_duration_ms: self.valid_duration_ms,
        };
        serde_json_canonicalizer::to_vec(&unsigned)
            .map_err(|e| Error::Other(format!("issue canonicalizing envelope: {e}")))
    }

    /// The instant the request stops being acceptable, given an upper bound
    /// on request age.
    #[must_use]
    pub fn valid_until(&self, max_age: Duration) -> DateTime<Utc> {
        let claimed = Duration::from_millis(self.valid_duration_ms);
        let window = TimeDelta::from_std(claimed.min(max_age)).unwrap_or(TimeDelta::MAX);
        self.valid_from.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Hash an action payload for an [`ActionDescriptor`]: multibase (base58btc)
/// SHA-256 of the payload's JCS canonical JSON.
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized.
pub fn payload_hash(payload: &impl Serialize) -> Result<String> {
    let bytes = serde_json_canonicalizer::to_vec(payload)
        .map_err(|e| Error::Other(format!("issue canonicalizing payload: {e}")))?;
    let digest = Sha256::digest(&bytes);
    Ok(multibase::encode(Base::Base58Btc, digest.as_slice()))
}

/// The outcome of a successful authorization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Authorized {
    /// The resolved target document the request was checked against.
    pub document: DocumentState,

    /// The verification method that signed the request.
    pub signer: VerificationMethod,
}

/// Authorize a signed request against the current state of its target.
///
/// See [`authorize_at`].
///
/// # Errors
///
/// See [`authorize_at`].
pub async fn authorize<L: LogTransport>(
    envelope: &SignedEnvelope, capability: VerificationRelationship, resolver: &Resolver<L>,
) -> Result<Authorized> {
    authorize_at(envelope, capability, resolver, Utc::now()).await
}

/// Authorize a signed request as of `now`.
///
/// Checks run in a fixed order and the first failure is returned:
///
/// 1. the envelope is well formed ([`Error::EnvelopeMalformed`]),
/// 2. `now` lies within the validity window, capped by the configured maximum
///    request age ([`Error::RequestExpired`]),
/// 3. the target resolves to a created document ([`Error::TargetNotResolvable`])
///    that is still active ([`Error::DidDeactivated`]),
/// 4. the signer is a verification method of the target
///    ([`Error::UnknownSigner`]),
/// 5. the signer is referenced by `capability`
///    ([`Error::InsufficientCapability`]),
/// 6. the signature verifies ([`Error::SignatureInvalid`]).
///
/// The target is always read fresh from the log; a cached snapshot could
/// still hold a key that has since been removed.
///
/// # Errors
///
/// Returns the error for the first check that fails.
#[instrument(level = "debug", skip(envelope, resolver), fields(target = %envelope.action.target))]
pub async fn authorize_at<L: LogTransport>(
    envelope: &SignedEnvelope, capability: VerificationRelationship, resolver: &Resolver<L>,
    now: DateTime<Utc>,
) -> Result<Authorized> {
    let signature = check_structure(envelope)?;

    if now < envelope.valid_from || now >= envelope.valid_until(resolver.config().max_request_age)
    {
        return Err(Error::RequestExpired);
    }

    let state = resolver
        .resolve_fresh(&envelope.action.target)
        .await
        .map_err(|e| Error::TargetNotResolvable(e.to_string()))?;
    if state.metadata.created.is_none() {
        return Err(Error::TargetNotResolvable(format!(
            "{} has no recorded history",
            state.document.id
        )));
    }
    if state.is_deactivated() {
        return Err(Error::DidDeactivated(state.document.id));
    }

    let Some(method) = state.document.verification_method(&envelope.signer_key_id) else {
        return Err(Error::UnknownSigner(envelope.signer_key_id.clone()));
    };
    if !state.document.is_authorized(&method.id, capability) {
        return Err(Error::InsufficientCapability {
            signer: method.id.clone(),
            capability: capability.to_string(),
        });
    }

    let key = method.public_key().map_err(|_| Error::SignatureInvalid)?;
    key.verify_strict(&envelope.signing_input()?, &signature)
        .map_err(|_| Error::SignatureInvalid)?;

    tracing::debug!(signer = %method.id, %capability, "request authorized");
    let signer = method.clone();
    Ok(Authorized {
        document: state,
        signer,
    })
}

fn check_structure(envelope: &SignedEnvelope) -> Result<Signature> {
    let malformed = |reason: &str| Error::EnvelopeMalformed(reason.to_string());

    let target = Identifier::from_str(&envelope.action.target)
        .map_err(|e| Error::EnvelopeMalformed(format!("invalid target: {e}")))?;
    if target.fragment.is_some() {
        return Err(malformed("target must not carry a fragment"));
    }
    if envelope.action.method.is_empty() {
        return Err(malformed("missing action method"));
    }

    let Some((signer_did, fragment)) = envelope.signer_key_id.split_once('#') else {
        return Err(malformed("signer key id must be a DID URL with a fragment"));
    };
    if fragment.is_empty() {
        return Err(malformed("signer key id must be a DID URL with a fragment"));
    }
    if signer_did != target.did() {
        return Err(malformed("signer key does not belong to the target DID"));
    }

    match multibase::decode(&envelope.action.payload_hash) {
        Ok((_, digest)) if digest.len() == Sha256::output_size() => {}
        _ => return Err(malformed("invalid payload hash")),
    }
    if envelope.valid_duration_ms == 0 {
        return Err(malformed("validity window must not be empty"));
    }

    let Ok((Base::Base58Btc, bytes)) = multibase::decode(&envelope.signature) else {
        return Err(malformed("signature is not base58btc multibase"));
    };
    Signature::from_slice(&bytes).map_err(|_| malformed("invalid signature length"))
}

/// Builder for [`SignedEnvelope`]s.
///
/// Clients compose the action, then supply a signer to produce the signed
/// envelope.
pub struct EnvelopeBuilder<S> {
    action: ActionDescriptor,
    signer_key_id: String,
    valid_from: Option<DateTime<Utc>>,
    valid_duration: Duration,

    signer: S,
}

/// Builder does not have a signer (can't build).
pub struct WithoutSigner;

/// Builder has a signer (can build).
pub struct WithSigner<'a, S: Signer>(pub &'a S);

impl Default for EnvelopeBuilder<WithoutSigner> {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvelopeBuilder<WithoutSigner> {
    /// Create a new builder. Requests are valid for 30 seconds from the time
    /// they are built unless configured otherwise.
    #[must_use]
    pub fn new() -> Self {
        Self {
            action: ActionDescriptor::default(),
            signer_key_id: String::new(),
            valid_from: None,
            valid_duration: Duration::from_secs(30),
            signer: WithoutSigner,
        }
    }

    /// Set the target DID.
    #[must_use]
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.action.target = target.into();
        self
    }

    /// Set the action verb and hash its payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn action(mut self, method: impl Into<String>, payload: &impl Serialize) -> Result<Self> {
        self.action.method = method.into();
        self.action.payload_hash = payload_hash(payload)?;
        Ok(self)
    }

    /// Set the start of the validity window. Defaults to the time of signing.
    #[must_use]
    pub const fn valid_from(mut self, valid_from: DateTime<Utc>) -> Self {
        self.valid_from = Some(valid_from);
        self
    }

    /// Set the length of the validity window.
    #[must_use]
    pub const fn valid_for(mut self, duration: Duration) -> Self {
        self.valid_duration = duration;
        self
    }

    /// Sign with `signer`, identified in the document by `key_id`.
    #[must_use]
    pub fn signer<S: Signer>(
        self, key_id: impl Into<String>, signer: &S,
    ) -> EnvelopeBuilder<WithSigner<'_, S>> {
        EnvelopeBuilder {
            action: self.action,
            signer_key_id: key_id.into(),
            valid_from: self.valid_from,
            valid_duration: self.valid_duration,
            signer: WithSigner(signer),
        }
    }
}

impl<S: Signer> EnvelopeBuilder<WithSigner<'_, S>> {
    /// Build and sign the envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope cannot be canonicalized or signed.
    pub async fn build(self) -> Result<SignedEnvelope> {
        let valid_duration_ms = u64::try_from(self.valid_duration.as_millis()).unwrap_or(u64::MAX);
        let mut envelope = SignedEnvelope {
            action: self.action,
            signer_key_id: self.signer_key_id,
            valid_from: self.valid_from.unwrap_or_else(Utc::now),
            valid_duration_ms,
            signature: String::new(),
        };
        let signature = self.signer.0.try_sign(&envelope.signing_input()?).await?;
        envelope.signature = multibase::encode(Base::Base58Btc, signature);
        Ok(envelope)
    }
}
