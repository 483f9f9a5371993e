//! # Identifier
//!
//! Destructure `did:hedera` identifiers into strongly typed components.
//!
//! An identifier is of the form
//!
//! `did:hedera:<network>:<routing-key>_<shard>.<realm>.<num>[#<fragment>]`
//!
//! where the routing key is the multibase (base58btc) encoding of the
//! ed25519 public key that created the document, and the suffix addresses the
//! consensus log (topic) holding the document's history.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::LazyLock;

use multibase::Base;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::IdentifierError;

/// The DID method handled by this crate.
pub const METHOD: &str = "hedera";

/// Multicodec prefix for an ed25519 public key.
pub const ED25519_CODEC: [u8; 2] = [0xed, 0x01];

const PUBLIC_KEY_LENGTH: usize = 32;

static DID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        "^(?<prefix>[^:]+):(?<method>[^:]+):(?<network>[^:]+):(?<key>[^:_]+)_(?<address>[^:_]+)$",
    )
    .expect("should compile")
});

static ENTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?<shard>0|[1-9]\d*)\.(?<realm>0|[1-9]\d*)\.(?<num>0|[1-9]\d*)$")
        .expect("should compile")
});

/// A parsed `did:hedera` identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Identifier {
    /// Network the identifier lives on.
    pub network: Network,

    /// Multibase encoded public key used as the log's addressing seed.
    pub routing_key: String,

    /// Address of the log (topic) recording the document's operations.
    pub log_address: LogAddress,

    /// Fragment referencing a resource inside the document, if any.
    pub fragment: Option<String>,
}

impl Identifier {
    /// Build the identifier owned by `public_key` on the given network and log.
    #[must_use]
    pub fn from_public_key(
        network: Network, public_key: &[u8; PUBLIC_KEY_LENGTH], log_address: LogAddress,
    ) -> Self {
        Self {
            network,
            routing_key: encode_key(public_key),
            log_address,
            fragment: None,
        }
    }

    /// The DID without any fragment.
    ///
    /// This is the `id` of the DID document.
    #[must_use]
    pub fn did(&self) -> String {
        format!("did:{METHOD}:{}:{}_{}", self.network, self.routing_key, self.log_address)
    }

    /// The raw public key bytes encoded in the routing key.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::IncorrectFormat`] if the routing key is not
    /// a multibase ed25519 public key. Never fails for parsed identifiers.
    pub fn public_key(&self) -> Result<[u8; PUBLIC_KEY_LENGTH], IdentifierError> {
        decode_key(&self.routing_key)
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.did())?;
        if let Some(fragment) = &self.fragment {
            write!(f, "#{fragment}")?;
        }
        Ok(())
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    /// Parse a DID string.
    ///
    /// Validation runs in a fixed order and the first failure is returned:
    /// overall shape, prefix, method name, network, routing key, then log
    /// address.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (did, fragment) = match s.split_once('#') {
            Some((did, fragment)) => (did, Some(fragment.to_string())),
            None => (s, None),
        };

        let Some(caps) = DID_REGEX.captures(did) else {
            return Err(IdentifierError::IncorrectFormat);
        };
        if &caps["prefix"] != "did" {
            return Err(IdentifierError::InvalidPrefix);
        }
        if &caps["method"] != METHOD {
            return Err(IdentifierError::InvalidMethodName(caps["method"].to_string()));
        }
        let network = Network::from_str(&caps["network"])?;
        let routing_key = caps["key"].to_string();
        decode_key(&routing_key)?;
        let log_address = LogAddress::from_str(&caps["address"])?;

        Ok(Self {
            network,
            routing_key,
            log_address,
            fragment: fragment.filter(|f| !f.is_empty()),
        })
    }
}

/// Encode a raw ed25519 public key as a routing key.
#[must_use]
pub fn encode_key(public_key: &[u8; PUBLIC_KEY_LENGTH]) -> String {
    let mut bytes = ED25519_CODEC.to_vec();
    bytes.extend_from_slice(public_key);
    multibase::encode(Base::Base58Btc, bytes)
}

/// Decode a multibase ed25519 public key into raw key bytes.
///
/// # Errors
///
/// Returns [`IdentifierError::IncorrectFormat`] unless the value is base58btc
/// multibase holding the ed25519 multicodec prefix and 32 key bytes.
pub fn decode_key(multibase_key: &str) -> Result<[u8; PUBLIC_KEY_LENGTH], IdentifierError> {
    let Ok((Base::Base58Btc, bytes)) = multibase::decode(multibase_key) else {
        return Err(IdentifierError::IncorrectFormat);
    };
    let Some(key) = bytes.strip_prefix(&ED25519_CODEC) else {
        return Err(IdentifierError::IncorrectFormat);
    };
    key.try_into().map_err(|_| IdentifierError::IncorrectFormat)
}

/// Networks an identifier may live on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production network.
    Mainnet,

    /// Public test network.
    #[default]
    Testnet,

    /// Preview network.
    Previewnet,
}

impl FromStr for Network {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "previewnet" => Ok(Self::Previewnet),
            _ => Err(IdentifierError::InvalidNetwork),
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mainnet => write!(f, "mainnet"),
            Self::Testnet => write!(f, "testnet"),
            Self::Previewnet => write!(f, "previewnet"),
        }
    }
}

/// Address of a consensus log (topic): `shard.realm.num`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogAddress {
    /// Shard number.
    pub shard: u64,

    /// Realm number.
    pub realm: u64,

    /// Entity number within the realm.
    pub num: u64,
}

impl LogAddress {
    /// Create a new log address.
    #[must_use]
    pub const fn new(shard: u64, realm: u64, num: u64) -> Self {
        Self { shard, realm, num }
    }
}

impl Display for LogAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.shard, self.realm, self.num)
    }
}

impl FromStr for LogAddress {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || IdentifierError::EntityIdParseError(s.to_string());
        let Some(caps) = ENTITY_REGEX.captures(s) else {
            return Err(err());
        };
        let part = |name: &str| caps[name].parse::<u64>().map_err(|_| err());
        Ok(Self::new(part("shard")?, part("realm")?, part("num")?))
    }
}

impl Serialize for LogAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LogAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "z6MkreRjoWnX5sCbQRxJUbcCneSqfbbzuTWh62wUmqrSoT47";

    #[test]
    fn parse_valid() {
        let did = format!("did:hedera:testnet:{KEY}_0.0.3");
        let id = Identifier::from_str(&did).expect("should parse");
        assert_eq!(id.network, Network::Testnet);
        assert_eq!(id.routing_key, KEY);
        assert_eq!(id.log_address, LogAddress::new(0, 0, 3));
        assert_eq!(id.fragment, None);
        assert_eq!(id.to_string(), did);
    }

    #[test]
    fn parse_fragment() {
        let did = format!("did:hedera:mainnet:{KEY}_1.2.3#key-1");
        let id = Identifier::from_str(&did).expect("should parse");
        assert_eq!(id.fragment.as_deref(), Some("key-1"));
        assert_eq!(id.did(), format!("did:hedera:mainnet:{KEY}_1.2.3"));
        assert_eq!(id.to_string(), did);
    }

    #[test]
    fn incorrect_format() {
        for did in [
            "did:hedera:testnet",
            "did:hedera:testnet:_0.0.3",
            &format!("did:hedera:testnet:{KEY}"),
            &format!("did:hedera:testnet:extra:{KEY}_0.0.3"),
            "did:hedera:testnet:z6MkreRjoWnX5sCbQRxJUbcCneSqfbbzuTWh62wUmqrSoT4_0.0.30787373",
            "did:hedera:testnet:zNotBase58OIl_0.0.3",
        ] {
            assert_eq!(Identifier::from_str(did), Err(IdentifierError::IncorrectFormat), "{did}");
        }
    }

    #[test]
    fn invalid_prefix() {
        let did = format!("invalid:hedera:testnet:{KEY}_0.0.3");
        assert_eq!(Identifier::from_str(&did), Err(IdentifierError::InvalidPrefix));
    }

    #[test]
    fn invalid_method() {
        let did = format!("did:invalid:testnet:{KEY}_0.0.3");
        assert_eq!(
            Identifier::from_str(&did),
            Err(IdentifierError::InvalidMethodName("invalid".into()))
        );
    }

    #[test]
    fn invalid_network() {
        let did = format!("did:hedera:invalid:{KEY}_0.0.3");
        assert_eq!(Identifier::from_str(&did), Err(IdentifierError::InvalidNetwork));
    }

    #[test]
    fn entity_id() {
        let did = format!("did:hedera:testnet:{KEY}_0.0");
        assert_eq!(
            Identifier::from_str(&did),
            Err(IdentifierError::EntityIdParseError("0.0".into()))
        );
        let did = format!("did:hedera:testnet:{KEY}_0.0.x");
        assert_eq!(
            Identifier::from_str(&did),
            Err(IdentifierError::EntityIdParseError("0.0.x".into()))
        );
    }

    // Each segment must be written in its one canonical form.
    #[test]
    fn entity_id_not_canonical() {
        let overflow = "0.0.18446744073709551616";
        for address in ["+0.0.3", "00.0.3", "0.0.03", "0.-0.3", "0.0.3.", overflow] {
            let did = format!("did:hedera:testnet:{KEY}_{address}");
            assert_eq!(
                Identifier::from_str(&did),
                Err(IdentifierError::EntityIdParseError(address.into())),
                "{address}"
            );
        }
        assert_eq!("0.0.10".parse::<LogAddress>(), Ok(LogAddress::new(0, 0, 10)));
    }

    // Earlier steps win over later ones.
    #[test]
    fn first_failure_wins() {
        let did = "invalid:invalid:invalid:z123_0.0";
        assert_eq!(Identifier::from_str(did), Err(IdentifierError::InvalidPrefix));
        let did = "did:hedera:invalid:z123_0.0";
        assert_eq!(Identifier::from_str(did), Err(IdentifierError::InvalidNetwork));
    }

    #[test]
    fn key_round_trip() {
        let key = [7u8; 32];
        let id = Identifier::from_public_key(Network::Previewnet, &key, LogAddress::new(0, 0, 9));
        let parsed = Identifier::from_str(&id.did()).expect("should parse");
        assert_eq!(parsed.public_key().expect("should decode"), key);
        assert!(parsed.routing_key.starts_with("z6Mk"));
    }
}
