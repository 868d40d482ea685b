#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **strata-depot-sql** – Relational `Depot`.
//!
//! Implements spec.md §6.3's relational blob store: a `depot_blobs` table
//! keyed by digest, deduplicated exactly like the teacher's event-payload
//! table, plus a `depot_versions` table mapping `(uuid, version)` to the
//! digest recorded for that version (the depot is keyed by versioned
//! identifier, spec §2, even though bytes are stored once per digest).

use std::path::Path;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use strata_depot_core::{verify_digest, Depot};
use strata_types::error::{retry_io, NotFoundError, StrataError};
use strata_types::ids::{Digest, DigestAlgorithm, VersionedId};

/// SQLite-backed `Depot`.
pub struct SqlDepot {
    pool: SqlitePool,
}

impl SqlDepot {
    /// Open or create a SQLite-backed depot at `path`, running migrations.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StrataError> {
        let url = format!("sqlite://{}?mode=rwc", path.as_ref().display());
        let pool = retry_io(|| SqlitePool::connect(&url)).await.map_err(|e| StrataError::Io(e.to_string()))?;
        Self::from_pool(pool).await
    }

    /// Open an in-memory instance (tests).
    pub async fn in_memory() -> Result<Self, StrataError> {
        let pool = retry_io(|| SqlitePool::connect("sqlite::memory:"))
            .await
            .map_err(|e| StrataError::Io(e.to_string()))?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self, StrataError> {
        retry_io(|| {
            sqlx::query(
                r#"
            CREATE TABLE IF NOT EXISTS depot_blobs (
                digest BLOB PRIMARY KEY,
                bytes BLOB NOT NULL
            ) STRICT
            "#,
            )
            .execute(&pool)
        })
        .await
        .map_err(|e| StrataError::Io(e.to_string()))?;

        retry_io(|| {
            sqlx::query(
                r#"
            CREATE TABLE IF NOT EXISTS depot_versions (
                uuid BLOB NOT NULL,
                version INTEGER NOT NULL,
                hash_type INTEGER NOT NULL,
                digest BLOB NOT NULL,
                PRIMARY KEY (uuid, version)
            ) STRICT
            "#,
            )
            .execute(&pool)
        })
        .await
        .map_err(|e| StrataError::Io(e.to_string()))?;

        Ok(Self { pool })
    }

    /// One attempt at the write transaction: insert-or-ignore the blob,
    /// point this version at its digest, commit. Failing midway leaves
    /// nothing committed, so retrying from scratch is safe.
    async fn write_once(&self, id: VersionedId, bytes: &[u8], expected_digest: &Digest) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO depot_blobs (digest, bytes) VALUES (?, ?)")
            .bind(expected_digest.bytes.clone())
            .bind(bytes)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO depot_versions (uuid, version, hash_type, digest)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id.uuid.as_bytes().to_vec())
        .bind(id.version as i64)
        .bind(expected_digest.algorithm.tag() as i64)
        .bind(expected_digest.bytes.clone())
        .execute(&mut *tx)
        .await?;

        tx.commit().await
    }
}

#[async_trait]
impl Depot for SqlDepot {
    async fn write(
        &self,
        id: VersionedId,
        bytes: &[u8],
        expected_digest: &Digest,
    ) -> Result<(), StrataError> {
        verify_digest(id, bytes, expected_digest)?;
        retry_io(|| self.write_once(id, bytes, expected_digest)).await.map_err(|e| StrataError::Io(e.to_string()))
    }

    async fn read(&self, id: VersionedId) -> Result<Vec<u8>, StrataError> {
        let version_row = retry_io(|| {
            sqlx::query("SELECT hash_type, digest FROM depot_versions WHERE uuid = ? AND version = ?")
                .bind(id.uuid.as_bytes().to_vec())
                .bind(id.version as i64)
                .fetch_optional(&self.pool)
        })
        .await
        .map_err(|e| StrataError::Io(e.to_string()))?
        .ok_or_else(|| NotFoundError { kind: "depot blob".to_string(), id: id.to_string() })?;

        let hash_type: i64 = version_row.get("hash_type");
        let digest_bytes: Vec<u8> = version_row.get("digest");
        let algorithm = DigestAlgorithm::from_tag(hash_type as u8)
            .ok_or_else(|| StrataError::Io(format!("unknown digest algorithm tag {hash_type}")))?;
        let expected = Digest { algorithm, bytes: digest_bytes.clone() };

        let blob_row = retry_io(|| {
            sqlx::query("SELECT bytes FROM depot_blobs WHERE digest = ?")
                .bind(digest_bytes.clone())
                .fetch_optional(&self.pool)
        })
        .await
        .map_err(|e| StrataError::Io(e.to_string()))?
        .ok_or_else(|| NotFoundError { kind: "depot blob".to_string(), id: id.to_string() })?;

        let bytes: Vec<u8> = blob_row.get("bytes");
        verify_digest(id, &bytes, &expected)?;
        Ok(bytes)
    }

    async fn exists(&self, id: VersionedId) -> Result<bool, StrataError> {
        let row = retry_io(|| {
            sqlx::query("SELECT 1 FROM depot_versions WHERE uuid = ? AND version = ?")
                .bind(id.uuid.as_bytes().to_vec())
                .bind(id.version as i64)
                .fetch_optional(&self.pool)
        })
        .await
        .map_err(|e| StrataError::Io(e.to_string()))?;
        Ok(row.is_some())
    }
}
