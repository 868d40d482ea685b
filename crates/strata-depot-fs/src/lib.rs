#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **strata-depot-fs** – Filesystem-backed `Depot`.
//!
//! Implements spec.md §6.3's "Filesystem depot" contract literally: a
//! directory tree `depot/<uuid>/<version>` holds the raw bytes, and a
//! sidecar `<version>.digest` file records the declared digest so reads
//! can verify on open without needing a separate index.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use strata_depot_core::{verify_digest, Depot};
use strata_types::error::{retry_io, IntegrityError, NotFoundError, StrataError};
use strata_types::ids::{Digest, DigestAlgorithm, VersionedId};
use tokio::fs;
use tokio::io::ErrorKind;

/// Filesystem-backed, durable `Depot`.
pub struct FsDepot {
    root: PathBuf,
}

impl FsDepot {
    /// Open (creating if necessary) a depot rooted at `root`.
    pub async fn open<P: AsRef<Path>>(root: P) -> Result<Self, StrataError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn entity_dir(&self, id: VersionedId) -> PathBuf {
        self.root.join(id.uuid.to_string())
    }

    fn bytes_path(&self, id: VersionedId) -> PathBuf {
        self.entity_dir(id).join(id.version.to_string())
    }

    fn digest_path(&self, id: VersionedId) -> PathBuf {
        self.entity_dir(id).join(format!("{}.digest", id.version))
    }
}

fn encode_sidecar(digest: &Digest) -> String {
    format!("{}:{}", digest.algorithm.tag(), digest.to_hex())
}

fn decode_sidecar(id: VersionedId, raw: &str) -> Result<Digest, StrataError> {
    let (tag, hex_str) = raw.trim().split_once(':').ok_or_else(|| {
        StrataError::Io(format!("malformed digest sidecar for {id}"))
    })?;
    let tag: u8 = tag
        .parse()
        .map_err(|_| StrataError::Io(format!("malformed digest sidecar tag for {id}")))?;
    let algorithm = DigestAlgorithm::from_tag(tag)
        .ok_or_else(|| StrataError::Io(format!("unknown digest algorithm tag {tag} for {id}")))?;
    Digest::from_hex(algorithm, hex_str).map_err(|e| StrataError::Io(e.to_string()))
}

#[async_trait]
impl Depot for FsDepot {
    async fn write(
        &self,
        id: VersionedId,
        bytes: &[u8],
        expected_digest: &Digest,
    ) -> Result<(), StrataError> {
        verify_digest(id, bytes, expected_digest)?;

        retry_io(|| fs::create_dir_all(self.entity_dir(id))).await?;
        retry_io(|| fs::write(self.bytes_path(id), bytes)).await?;
        retry_io(|| fs::write(self.digest_path(id), encode_sidecar(expected_digest))).await?;
        Ok(())
    }

    async fn read(&self, id: VersionedId) -> Result<Vec<u8>, StrataError> {
        let bytes = match retry_io(|| fs::read(self.bytes_path(id))).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(NotFoundError {
                    kind: "depot blob".to_string(),
                    id: id.to_string(),
                }
                .into());
            }
            Err(e) => return Err(e.into()),
        };

        let sidecar = retry_io(|| fs::read_to_string(self.digest_path(id))).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StrataError::Integrity(IntegrityError::BytesMissing(id.to_string()))
            } else {
                StrataError::from(e)
            }
        })?;
        let expected = decode_sidecar(id, &sidecar)?;
        verify_digest(id, &bytes, &expected)?;
        Ok(bytes)
    }

    async fn exists(&self, id: VersionedId) -> Result<bool, StrataError> {
        Ok(retry_io(|| fs::try_exists(self.bytes_path(id))).await?)
    }
}
