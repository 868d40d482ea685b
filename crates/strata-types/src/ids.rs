use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A UTC instant with microsecond precision, rendered ISO-8601 with a
/// trailing `Z` by `chrono`'s default serde implementation.
pub type Timestamp = DateTime<Utc>;

/// Digest algorithm tag. The core currently supports exactly one: SHA-256.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DigestAlgorithm {
    /// SHA-256, wire tag `1`.
    Sha256 = 1,
}

impl DigestAlgorithm {
    /// Numeric wire tag for this algorithm (`hash_type` on the wire).
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Resolve a wire tag back into an algorithm.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Sha256),
            _ => None,
        }
    }
}

/// A named-algorithm digest over some byte string, rendered as lowercase
/// hex on the wire and in `Display`. Serializes as `{"hash": "<hex>",
/// "hash_type": <tag>}`, matching the wire contract's field names (spec
/// §6.1) and satisfying the canonical-serialization rule that byte
/// values are hex-lowercase (spec §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    /// Which hash function produced `bytes`.
    pub algorithm: DigestAlgorithm,
    /// Raw digest bytes.
    pub bytes: Vec<u8>,
}

impl Serialize for Digest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("Digest", 2)?;
        s.serialize_field("hash", &self.to_hex())?;
        s.serialize_field("hash_type", &self.algorithm.tag())?;
        s.end()
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Wire {
            hash: String,
            hash_type: u8,
        }
        let wire = Wire::deserialize(deserializer)?;
        let algorithm = DigestAlgorithm::from_tag(wire.hash_type)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown hash_type {}", wire.hash_type)))?;
        Digest::from_hex(algorithm, &wire.hash).map_err(serde::de::Error::custom)
    }
}

impl Digest {
    /// Compute the SHA-256 digest of `data`.
    pub fn sha256(data: &[u8]) -> Self {
        use sha2::{Digest as _, Sha256};
        let bytes = Sha256::digest(data).to_vec();
        Self { algorithm: DigestAlgorithm::Sha256, bytes }
    }

    /// Parse a lowercase-hex digest under the given algorithm.
    pub fn from_hex(algorithm: DigestAlgorithm, hex_str: &str) -> Result<Self, hex::FromHexError> {
        Ok(Self { algorithm, bytes: hex::decode(hex_str)? })
    }

    /// Render as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Opaque per-event integrity value. Its meaning depends on the
/// installation's configured integrity mode (hash-chain or signature);
/// `strata-record-keeper-core` is the only crate that interprets the
/// bytes, everyone else treats this as an opaque blob.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IntegrityToken(pub Vec<u8>);

impl IntegrityToken {
    /// The token preceding the first event in a chain.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Render as lowercase hex for logs and diagnostics.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl Serialize for IntegrityToken {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for IntegrityToken {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(IntegrityToken(hex::decode(s).map_err(serde::de::Error::custom)?))
    }
}

/// A (UUID, version) pair uniquely identifying one revision of a
/// versioned entity (object, schema, or annotation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionedId {
    /// Stable identifier shared by every version of the entity.
    pub uuid: Uuid,
    /// Monotonic version, dense from 0.
    pub version: u32,
}

impl VersionedId {
    /// Construct a versioned identifier.
    pub fn new(uuid: Uuid, version: u32) -> Self {
        Self { uuid, version }
    }
}

impl fmt::Display for VersionedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.uuid, self.version)
    }
}
