#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **strata-record-keeper-sql** – Relational `RecordKeeper`.
//!
//! Implements spec.md §6.3's "Relational record keeper" contract: a
//! single `events` table (sequence number, UUID, author, timestamp,
//! msgpack payload, integrity token), backed by SQLite via `sqlx`. Useful
//! when an installation wants a single file for record-keeping, depot,
//! and state, or wants to query event history with SQL.

use std::path::Path;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use strata_record_keeper_core::integrity::Integrity;
use strata_record_keeper_core::{RecordKeeper, Seq, StoredEvent, VerifyOutcome};
use strata_types::error::{retry_io, StrataError, ValidationError, ValidationReason};
use strata_types::event::Event;
use strata_types::ids::IntegrityToken;
use tokio::sync::Mutex;
use uuid::Uuid;

struct ChainState {
    next_seq: Seq,
    last_token: IntegrityToken,
}

/// SQLite-backed `RecordKeeper`.
pub struct SqlRecordKeeper {
    pool: SqlitePool,
    integrity: Integrity,
    chain: Mutex<ChainState>,
}

impl SqlRecordKeeper {
    /// Open or create a SQLite-backed record keeper at `path`, running
    /// migrations and recovering the chain position from whatever is
    /// already on disk.
    pub async fn open<P: AsRef<Path>>(path: P, integrity: Integrity) -> Result<Self, StrataError> {
        let url = format!("sqlite://{}?mode=rwc", path.as_ref().display());
        let pool = retry_io(|| SqlitePool::connect(&url)).await.map_err(|e| StrataError::Io(e.to_string()))?;
        Self::from_pool(pool, integrity).await
    }

    /// Open an in-memory instance (tests).
    pub async fn in_memory(integrity: Integrity) -> Result<Self, StrataError> {
        let pool = retry_io(|| SqlitePool::connect("sqlite::memory:"))
            .await
            .map_err(|e| StrataError::Io(e.to_string()))?;
        Self::from_pool(pool, integrity).await
    }

    async fn from_pool(pool: SqlitePool, integrity: Integrity) -> Result<Self, StrataError> {
        retry_io(|| {
            sqlx::query(
                r#"
            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                uuid BLOB NOT NULL UNIQUE,
                type TEXT NOT NULL,
                author TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                payload BLOB NOT NULL,
                integrity BLOB NOT NULL
            ) STRICT
            "#,
            )
            .execute(&pool)
        })
        .await
        .map_err(|e| StrataError::Io(e.to_string()))?;

        retry_io(|| sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_uuid ON events(uuid)").execute(&pool))
            .await
            .map_err(|e| StrataError::Io(e.to_string()))?;

        let last = retry_io(|| {
            sqlx::query("SELECT seq, payload, integrity FROM events ORDER BY seq DESC LIMIT 1").fetch_optional(&pool)
        })
        .await
        .map_err(|e| StrataError::Io(e.to_string()))?;

        let (next_seq, last_token) = match last {
            Some(row) => {
                let seq: i64 = row.get("seq");
                let integrity_bytes: Vec<u8> = row.get("integrity");
                (seq as u64 + 1, IntegrityToken(integrity_bytes))
            }
            None => (0, IntegrityToken::empty()),
        };

        Ok(Self { pool, integrity, chain: Mutex::new(ChainState { next_seq, last_token }) })
    }

    fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<StoredEvent, StrataError> {
        let seq: i64 = row.get("seq");
        let payload: Vec<u8> = row.get("payload");
        let integrity_bytes: Vec<u8> = row.get("integrity");
        let mut event: Event =
            rmp_serde::from_slice(&payload).map_err(|e| StrataError::Io(e.to_string()))?;
        event.integrity = IntegrityToken(integrity_bytes);
        Ok(StoredEvent { seq: seq as u64, event })
    }
}

#[async_trait]
impl RecordKeeper for SqlRecordKeeper {
    async fn append(&self, mut event: Event) -> Result<IntegrityToken, StrataError> {
        let mut chain = self.chain.lock().await;
        let token = self
            .integrity
            .compute_token(&event, &chain.last_token)
            .map_err(StrataError::from)?;
        event.integrity = token.clone();

        let payload = rmp_serde::to_vec_named(&event).map_err(|e| StrataError::Io(e.to_string()))?;
        retry_io(|| {
            sqlx::query(
                r#"
            INSERT INTO events (uuid, type, author, timestamp, payload, integrity)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            )
            .bind(event.uuid.as_bytes().to_vec())
            .bind(event.body.kind_tag())
            .bind(&event.author)
            .bind(event.timestamp.to_rfc3339())
            .bind(&payload)
            .bind(&token.0)
            .execute(&self.pool)
        })
        .await
        .map_err(|e| StrataError::Io(e.to_string()))?;

        chain.next_seq += 1;
        chain.last_token = token.clone();
        Ok(token)
    }

    async fn at(&self, seq: Seq) -> Result<Option<StoredEvent>, StrataError> {
        let row = retry_io(|| {
            sqlx::query("SELECT seq, payload, integrity FROM events WHERE seq = ?")
                .bind(seq as i64)
                .fetch_optional(&self.pool)
        })
        .await
        .map_err(|e| StrataError::Io(e.to_string()))?;
        row.as_ref().map(Self::row_to_event).transpose()
    }

    async fn by_uuid(&self, uuid: Uuid) -> Result<Option<StoredEvent>, StrataError> {
        let row = retry_io(|| {
            sqlx::query("SELECT seq, payload, integrity FROM events WHERE uuid = ?")
                .bind(uuid.as_bytes().to_vec())
                .fetch_optional(&self.pool)
        })
        .await
        .map_err(|e| StrataError::Io(e.to_string()))?;
        row.as_ref().map(Self::row_to_event).transpose()
    }

    async fn next(&self, after: Option<Uuid>, limit: usize) -> Result<Vec<StoredEvent>, StrataError> {
        let start_seq = match after {
            None => 0i64,
            Some(uuid) => {
                let row = retry_io(|| {
                    sqlx::query("SELECT seq FROM events WHERE uuid = ?")
                        .bind(uuid.as_bytes().to_vec())
                        .fetch_optional(&self.pool)
                })
                .await
                .map_err(|e| StrataError::Io(e.to_string()))?
                .ok_or_else(|| {
                    StrataError::Validation(ValidationError::new(
                        ValidationReason::UnknownCursor,
                        format!("no event with uuid {uuid}"),
                    ))
                })?;
                let seq: i64 = row.get("seq");
                seq + 1
            }
        };

        let rows = retry_io(|| {
            sqlx::query("SELECT seq, payload, integrity FROM events WHERE seq >= ? ORDER BY seq ASC LIMIT ?")
                .bind(start_seq)
                .bind(limit as i64)
                .fetch_all(&self.pool)
        })
        .await
        .map_err(|e| StrataError::Io(e.to_string()))?;

        rows.iter().map(Self::row_to_event).collect()
    }

    async fn len(&self) -> Result<u64, StrataError> {
        let row = retry_io(|| sqlx::query("SELECT COUNT(*) AS count FROM events").fetch_one(&self.pool))
            .await
            .map_err(|e| StrataError::Io(e.to_string()))?;
        let count: i64 = row.get("count");
        Ok(count as u64)
    }

    async fn verify(&self, integrity: &Integrity) -> Result<VerifyOutcome, StrataError> {
        let mut previous = IntegrityToken::empty();
        let rows = retry_io(|| sqlx::query("SELECT seq, payload, integrity FROM events ORDER BY seq ASC").fetch_all(&self.pool))
            .await
            .map_err(|e| StrataError::Io(e.to_string()))?;
        for row in &rows {
            let stored = Self::row_to_event(row)?;
            if integrity.verify_token(&stored.event, &previous).is_err() {
                return Ok(VerifyOutcome::FirstBadSeq(stored.seq));
            }
            previous = stored.event.integrity;
        }
        Ok(VerifyOutcome::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use strata_types::event::EventBody;

    fn sample(author: &str) -> Event {
        Event::new(Uuid::new_v4(), author.into(), Utc::now(), EventBody::OwnerAdd { owner: author.into() })
    }

    #[tokio::test]
    async fn append_then_read_back() {
        let rk = SqlRecordKeeper::in_memory(Integrity::HashChain).await.unwrap();
        let event = sample("alice");
        let uuid = event.uuid;
        rk.append(event).await.unwrap();

        let stored = rk.at(0).await.unwrap().unwrap();
        assert_eq!(stored.event.uuid, uuid);

        let by_uuid = rk.by_uuid(uuid).await.unwrap().unwrap();
        assert_eq!(by_uuid.seq, 0);
        assert_eq!(rk.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("events.db");
        {
            let rk = SqlRecordKeeper::open(&db_path, Integrity::HashChain).await.unwrap();
            rk.append(sample("alice")).await.unwrap();
        }
        let rk = SqlRecordKeeper::open(&db_path, Integrity::HashChain).await.unwrap();
        assert_eq!(rk.len().await.unwrap(), 1);
        let token = rk.append(sample("bob")).await.unwrap();
        assert!(!token.0.is_empty());
        assert_eq!(rk.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn next_pages_after_cursor_and_rejects_unknown_cursor() {
        let rk = SqlRecordKeeper::in_memory(Integrity::HashChain).await.unwrap();
        let first = sample("alice");
        let first_uuid = first.uuid;
        rk.append(first).await.unwrap();
        rk.append(sample("bob")).await.unwrap();
        rk.append(sample("carol")).await.unwrap();

        let page = rk.next(Some(first_uuid), 10).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].seq, 1);

        assert!(rk.next(Some(Uuid::new_v4()), 10).await.is_err());
    }

    #[tokio::test]
    async fn verify_detects_tampering() {
        let rk = SqlRecordKeeper::in_memory(Integrity::HashChain).await.unwrap();
        for i in 0..4 {
            rk.append(sample(&format!("user{i}"))).await.unwrap();
        }
        sqlx::query("UPDATE events SET author = 'mallory' WHERE seq = 2")
            .execute(&rk.pool)
            .await
            .unwrap();

        let outcome = rk.verify(&Integrity::HashChain).await.unwrap();
        match outcome {
            VerifyOutcome::FirstBadSeq(seq) => assert_eq!(seq, 2),
            VerifyOutcome::Ok => panic!("expected tampering to be detected"),
        }
    }
}
