//! Tests for authorizing signed requests against resolved documents.

use std::time::Duration;

use chrono::{TimeDelta, Utc};
use hcs_did::operation::encode;
use hcs_did::{
    Config, EnvelopeBuilder, KeyStore, Keypair, LogAddress, MethodType, MutationIntent, Operation,
    Registrar, RelationshipEntry, SignedEnvelope, VerificationMethod, VerificationRelationship,
    authorize, authorize_at,
};
use test_utils::{Keyring, MemoryKeyStore, MemoryLog};

const ADDRESS: LogAddress = LogAddress::new(0, 0, 7);
const AUTHENTICATION: VerificationRelationship = VerificationRelationship::Authentication;

struct Fixture {
    log: MemoryLog,
    keystore: MemoryKeyStore,
    registrar: Registrar<MemoryLog, MemoryKeyStore>,
    holder: Keyring,
    did: String,
}

impl Fixture {
    async fn new(config: Config) -> Self {
        let log = MemoryLog::new();
        let keystore = MemoryKeyStore::new();
        let registrar = Registrar::new(log.clone(), keystore.clone(), config.log_address(ADDRESS));
        let holder = Keyring::new();
        let state =
            registrar.register(&holder.public_key_multibase()).await.expect("should register");
        Self {
            log,
            keystore,
            registrar,
            holder,
            did: state.document.id,
        }
    }

    fn key_id(&self, fragment: &str) -> String {
        format!("{}#{fragment}", self.did)
    }

    fn intent(&self) -> MutationIntent {
        MutationIntent::RemoveService {
            id: self.key_id("service-1"),
        }
    }

    // An envelope for `intent()` signed by `signer` as `key_id`.
    async fn envelope(&self, key_id: &str, signer: &Keyring) -> SignedEnvelope {
        let intent = self.intent();
        EnvelopeBuilder::new()
            .target(&self.did)
            .action(intent.name(), &intent)
            .expect("should hash")
            .signer(key_id, signer)
            .build()
            .await
            .expect("should sign")
    }

    // Record an operation signed by the root key, bypassing the registrar.
    async fn record(&self, operation: Operation) {
        let secret =
            self.keystore.get(&self.did).await.expect("should read").expect("should hold key");
        let root = Keypair::from_secret(&secret).expect("should load key");
        let bytes = encode(&self.did, operation, &self.key_id("did-root-key"), &root)
            .await
            .expect("should encode");
        self.log.inject(&ADDRESS, bytes);
    }
}

// A fresh request signed by an authentication key is authorized.
#[tokio::test]
async fn authorized() {
    let fx = Fixture::new(Config::default()).await;
    let envelope = fx.envelope(&fx.key_id("key-1"), &fx.holder).await;

    let authorized = authorize(&envelope, AUTHENTICATION, fx.registrar.resolver())
        .await
        .expect("should authorize");
    assert_eq!(authorized.signer.id, fx.key_id("key-1"));
    assert_eq!(authorized.signer.public_key_multibase, fx.holder.public_key_multibase());
    assert_eq!(authorized.document.document.id, fx.did);
}

// A request 1000ms old with a shorter validity window has expired, though
// its signature and capability are valid.
#[tokio::test]
async fn request_expired() {
    let fx = Fixture::new(Config::default()).await;
    let intent = fx.intent();
    let envelope = EnvelopeBuilder::new()
        .target(&fx.did)
        .action(intent.name(), &intent)
        .expect("should hash")
        .valid_from(Utc::now() - TimeDelta::milliseconds(1000))
        .valid_for(Duration::from_millis(500))
        .signer(fx.key_id("key-1"), &fx.holder)
        .build()
        .await
        .expect("should sign");

    let err = authorize(&envelope, AUTHENTICATION, fx.registrar.resolver())
        .await
        .expect_err("should be expired");
    assert_eq!(err.kind(), "request_expired");
    assert_eq!(err.detail(), "Request has expired");
}

// The configured maximum age caps whatever window the request claims.
#[tokio::test]
async fn max_request_age() {
    let fx = Fixture::new(Config::default().max_request_age(Duration::from_secs(1))).await;
    let envelope = fx.envelope(&fx.key_id("key-1"), &fx.holder).await;
    let resolver = fx.registrar.resolver();
    let capability = VerificationRelationship::Authentication;

    let now = envelope.valid_from + TimeDelta::milliseconds(999);
    authorize_at(&envelope, capability, resolver, now).await.expect("should authorize");

    let now = envelope.valid_from + TimeDelta::milliseconds(1000);
    let err = authorize_at(&envelope, capability, resolver, now).await.expect_err("should fail");
    assert_eq!(err.kind(), "request_expired");

    let now = envelope.valid_from - TimeDelta::milliseconds(1);
    let err = authorize_at(&envelope, capability, resolver, now).await.expect_err("should fail");
    assert_eq!(err.kind(), "request_expired");
}

// Structural problems are reported before anything else.
#[tokio::test]
async fn envelope_malformed() {
    let fx = Fixture::new(Config::default()).await;
    let resolver = fx.registrar.resolver();
    let capability = VerificationRelationship::Authentication;

    let mut envelope = fx.envelope(&fx.key_id("key-1"), &fx.holder).await;
    envelope.signature = "not a signature".into();
    let err = authorize(&envelope, capability, resolver).await.expect_err("should fail");
    assert_eq!(err.kind(), "envelope_malformed");

    let other = Fixture::new(Config::default()).await;
    let envelope = fx.envelope(&other.key_id("key-1"), &other.holder).await;
    let err = authorize(&envelope, capability, resolver).await.expect_err("should fail");
    assert_eq!(err.kind(), "envelope_malformed");
}

// A target with no history cannot be authorized against.
#[tokio::test]
async fn target_not_resolvable() {
    let fx = Fixture::new(Config::default()).await;
    let stranger = Keyring::new();
    let did = format!("did:hedera:testnet:{}_{ADDRESS}", stranger.public_key_multibase());
    let intent = fx.intent();
    let envelope = EnvelopeBuilder::new()
        .target(&did)
        .action(intent.name(), &intent)
        .expect("should hash")
        .signer(format!("{did}#key-1"), &stranger)
        .build()
        .await
        .expect("should sign");

    let err = authorize(&envelope, AUTHENTICATION, fx.registrar.resolver())
        .await
        .expect_err("should fail");
    assert_eq!(err.kind(), "target_not_resolvable");
}

// Requests against a deactivated document are refused.
#[tokio::test]
async fn did_deactivated() {
    let fx = Fixture::new(Config::default()).await;
    fx.record(Operation::Revoke).await;

    let envelope = fx.envelope(&fx.key_id("key-1"), &fx.holder).await;
    let err = authorize(&envelope, AUTHENTICATION, fx.registrar.resolver())
        .await
        .expect_err("should fail");
    assert_eq!(err.kind(), "did_deactivated");
}

// The signing key must be a verification method of the document.
#[tokio::test]
async fn unknown_signer() {
    let fx = Fixture::new(Config::default()).await;
    let envelope = fx.envelope(&fx.key_id("key-9"), &Keyring::new()).await;
    let err = authorize(&envelope, AUTHENTICATION, fx.registrar.resolver())
        .await
        .expect_err("should fail");
    assert_eq!(err.kind(), "unknown_signer");
}

// The signing key must hold the required relationship.
#[tokio::test]
async fn insufficient_capability() {
    let fx = Fixture::new(Config::default()).await;
    let assertion = Keyring::new();
    fx.record(Operation::AddVerificationRelationship(RelationshipEntry {
        relationship_type: VerificationRelationship::AssertionMethod,
        method: VerificationMethod {
            id: fx.key_id("key-2"),
            type_: MethodType::Ed25519VerificationKey2018,
            controller: fx.did.clone(),
            public_key_multibase: assertion.public_key_multibase(),
        },
    }))
    .await;

    let envelope = fx.envelope(&fx.key_id("key-2"), &assertion).await;
    let resolver = fx.registrar.resolver();

    let err = authorize(&envelope, VerificationRelationship::Authentication, resolver)
        .await
        .expect_err("should fail");
    assert_eq!(err.kind(), "insufficient_capability");

    authorize(&envelope, VerificationRelationship::AssertionMethod, resolver)
        .await
        .expect("should authorize assertions");
}

// The signature must verify against the signer's key and cover the request.
#[tokio::test]
async fn signature_invalid() {
    let fx = Fixture::new(Config::default()).await;
    let resolver = fx.registrar.resolver();
    let capability = VerificationRelationship::Authentication;

    let envelope = fx.envelope(&fx.key_id("key-1"), &Keyring::new()).await;
    let err = authorize(&envelope, capability, resolver).await.expect_err("should fail");
    assert_eq!(err.kind(), "signature_invalid");

    let mut envelope = fx.envelope(&fx.key_id("key-1"), &fx.holder).await;
    envelope.action.method = "revoke".into();
    let err = authorize(&envelope, capability, resolver).await.expect_err("should fail");
    assert_eq!(err.kind(), "signature_invalid");

    let mut envelope = fx.envelope(&fx.key_id("key-1"), &fx.holder).await;
    envelope.valid_duration_ms += 1;
    let err = authorize(&envelope, capability, resolver).await.expect_err("should fail");
    assert_eq!(err.kind(), "signature_invalid");
}

// Authorization reads the log, not a cached snapshot: a key removed since the
// last resolution no longer authorizes.
#[tokio::test]
async fn reads_fresh_state() {
    let fx = Fixture::new(Config::default().cache_ttl(Duration::from_secs(60))).await;
    let resolver = fx.registrar.resolver();
    resolver.resolve(&fx.did).await.expect("should resolve");

    fx.record(Operation::RemoveVerificationMethod {
        id: fx.key_id("key-1"),
    })
    .await;
    let cached = resolver.resolve(&fx.did).await.expect("should resolve");
    assert!(cached.document.verification_method(&fx.key_id("key-1")).is_some());

    let envelope = fx.envelope(&fx.key_id("key-1"), &fx.holder).await;
    let err = authorize(&envelope, VerificationRelationship::Authentication, resolver)
        .await
        .expect_err("should fail");
    assert_eq!(err.kind(), "unknown_signer");
}

// A key replaced through an update verifies with its new material only.
#[tokio::test]
async fn rotated_key() {
    let fx = Fixture::new(Config::default()).await;
    let rotated = Keyring::new();
    fx.record(Operation::UpdateVerificationRelationship(RelationshipEntry {
        relationship_type: VerificationRelationship::Authentication,
        method: VerificationMethod {
            id: fx.key_id("key-1"),
            type_: MethodType::Ed25519VerificationKey2018,
            controller: fx.did.clone(),
            public_key_multibase: rotated.public_key_multibase(),
        },
    }))
    .await;
    let resolver = fx.registrar.resolver();
    let capability = VerificationRelationship::Authentication;

    let envelope = fx.envelope(&fx.key_id("key-1"), &fx.holder).await;
    let err = authorize(&envelope, capability, resolver).await.expect_err("should fail");
    assert_eq!(err.kind(), "signature_invalid");

    let envelope = fx.envelope(&fx.key_id("key-1"), &rotated).await;
    authorize(&envelope, capability, resolver).await.expect("should authorize");
}
