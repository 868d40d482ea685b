use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{Digest, DigestAlgorithm};

/// Fixed mimetype recorded on every schema version.
pub const SCHEMA_FORMAT: &str = "application/schema+json";

/// Required name prefix for every schema (spec §4.2: `SchemaCreate`).
pub const SCHEMA_NAME_PREFIX: &str = "schema-";

/// One version of an object: an arbitrary binary file plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Stable identifier shared across versions.
    pub uuid: Uuid,
    /// Monotonic version, 0 on create.
    pub version: u32,
    /// Caller-supplied display name.
    pub name: String,
    /// Caller-supplied mimetype ("format" in the wire contract).
    pub format: String,
    /// Size of the underlying bytes, in bytes.
    pub size: u64,
    /// Digest of the underlying bytes.
    pub digest: Digest,
}

/// One version of a schema: a JSON Schema document plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRecord {
    /// Stable identifier shared across versions.
    pub uuid: Uuid,
    /// Monotonic version, 0 on create.
    pub version: u32,
    /// Unique (among non-deprecated schemas) name, always `schema-`-prefixed.
    pub name: String,
    /// Always [`SCHEMA_FORMAT`].
    pub format: String,
    /// Size of the schema document bytes.
    pub size: u64,
    /// Digest of the schema document bytes.
    pub digest: Digest,
}

impl SchemaRecord {
    /// Build a schema record, defaulting `format` to [`SCHEMA_FORMAT`].
    pub fn new(uuid: Uuid, version: u32, name: String, size: u64, digest: Digest) -> Self {
        Self { uuid, version, name, format: SCHEMA_FORMAT.to_string(), size, digest }
    }
}

/// One version of an annotation: schema-validated JSON linked to one or
/// more object versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    /// Stable identifier shared across versions.
    pub uuid: Uuid,
    /// Monotonic version, 0 on create.
    pub version: u32,
    /// The schema version this annotation was validated against at
    /// creation time (spec I6: later schema evolutions do not
    /// retroactively invalidate).
    pub schema: crate::ids::VersionedId,
    /// Object versions this annotation is linked to; non-empty.
    pub object_identifiers: Vec<crate::ids::VersionedId>,
    /// Size of the annotation JSON bytes.
    pub size: u64,
    /// Digest of the annotation JSON bytes.
    pub digest: Digest,
}

/// Resolve the digest algorithm used by a legacy `hash_type` wire tag.
pub fn digest_algorithm_from_hash_type(hash_type: u8) -> Option<DigestAlgorithm> {
    DigestAlgorithm::from_tag(hash_type)
}
