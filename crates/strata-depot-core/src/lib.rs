#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **strata-depot-core** – Core `Depot` abstraction.
//!
//! Defines the content-addressed blob store contract keyed by
//! `(entity UUID, version)` with digest verification (spec §2, §6.2, I2).
//! Storage drivers (`strata-depot-fs`, `strata-depot-sql`) implement
//! [`Depot`] against their own backend; this crate contains no I/O.

use std::sync::Arc;

use async_trait::async_trait;
use strata_types::error::StrataError;
use strata_types::ids::{Digest, VersionedId};

/// Abstraction over a content-addressed blob store (spec §2, §6.2).
///
/// Keyed by `(entity UUID, version)`, deduplicated and integrity-verified
/// by digest. Once written, a blob is immutable and shared across readers
/// without locking (spec §5).
#[async_trait]
pub trait Depot: Send + Sync {
    /// Write `bytes` under `id`, after verifying they hash to
    /// `expected_digest`. Returns `MismatchError` (surfaced as
    /// [`strata_types::error::IntegrityError::DigestMismatch`]) if the
    /// recomputed digest differs.
    async fn write(
        &self,
        id: VersionedId,
        bytes: &[u8],
        expected_digest: &Digest,
    ) -> Result<(), StrataError>;

    /// Read the bytes stored under `id`, verifying them against the
    /// digest recorded at write time. Returns `NotFound` if no bytes were
    /// ever written for `id` (spec §4.6 "log-present, bytes-missing").
    async fn read(&self, id: VersionedId) -> Result<Vec<u8>, StrataError>;

    /// Whether bytes exist for `id`, without reading or verifying them.
    async fn exists(&self, id: VersionedId) -> Result<bool, StrataError>;
}

/// Verify that `bytes` hashes to `expected`, returning a digest-mismatch
/// `IntegrityError` otherwise. Shared by every `Depot` implementation so
/// the mismatch message stays consistent (spec I2, P1).
pub fn verify_digest(
    id: VersionedId,
    bytes: &[u8],
    expected: &Digest,
) -> Result<(), StrataError> {
    let actual = Digest::sha256(bytes);
    if &actual == expected {
        Ok(())
    } else {
        Err(strata_types::error::IntegrityError::DigestMismatch(
            id.to_string(),
            expected.to_hex(),
            actual.to_hex(),
        )
        .into())
    }
}

/// Shared handle to a depot, as held by `strata-core`.
pub type SharedDepot = Arc<dyn Depot>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_digest_accepts_matching_bytes() {
        let id = VersionedId::new(uuid::Uuid::new_v4(), 0);
        let digest = Digest::sha256(b"hello");
        assert!(verify_digest(id, b"hello", &digest).is_ok());
    }

    #[test]
    fn verify_digest_rejects_mismatched_bytes() {
        let id = VersionedId::new(uuid::Uuid::new_v4(), 0);
        let digest = Digest::sha256(b"hello");
        assert!(verify_digest(id, b"goodbye", &digest).is_err());
    }
}
