#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **strata-record-keeper-sled** – Filesystem-backed `RecordKeeper`.
//!
//! Implements spec.md §6.3's "Filesystem record keeper" contract (an
//! append-only log plus a UUID→offset index) using `sled`, an embedded,
//! crash-safe, local-filesystem store: one tree holds the log keyed by
//! sequence number, a second holds the UUID→sequence index.

use std::path::Path;

use async_trait::async_trait;
use sled::{Db, Tree};
use strata_record_keeper_core::integrity::Integrity;
use strata_record_keeper_core::{RecordKeeper, Seq, StoredEvent, VerifyOutcome};
use strata_types::error::{retry_sync, StrataError, ValidationError, ValidationReason};
use strata_types::event::Event;
use strata_types::ids::IntegrityToken;
use tokio::sync::Mutex;
use uuid::Uuid;

struct ChainState {
    next_seq: Seq,
    last_token: IntegrityToken,
}

/// Sled-backed, durable `RecordKeeper`.
pub struct SledRecordKeeper {
    _db: Db,
    log: Tree,
    index: Tree,
    integrity: Integrity,
    chain: Mutex<ChainState>,
}

fn seq_key(seq: Seq) -> [u8; 8] {
    seq.to_be_bytes()
}

fn seq_from_key(key: &[u8]) -> Result<Seq, StrataError> {
    let arr: [u8; 8] = key
        .try_into()
        .map_err(|_| StrataError::Io("corrupt sequence key".into()))?;
    Ok(Seq::from_be_bytes(arr))
}

impl SledRecordKeeper {
    /// Open or create a sled-backed record keeper at `path`, recovering
    /// the chain position from whatever was already on disk.
    pub fn open<P: AsRef<Path>>(path: P, integrity: Integrity) -> Result<Self, StrataError> {
        let db = retry_sync(|| sled::open(path.as_ref())).map_err(|e| StrataError::Io(e.to_string()))?;
        Self::from_db(db, integrity)
    }

    /// Open an ephemeral, temporary-directory-backed instance (tests).
    pub fn temporary(integrity: Integrity) -> Result<Self, StrataError> {
        let db = retry_sync(|| sled::Config::new().temporary(true).open())
            .map_err(|e| StrataError::Io(e.to_string()))?;
        Self::from_db(db, integrity)
    }

    fn from_db(db: Db, integrity: Integrity) -> Result<Self, StrataError> {
        let log = retry_sync(|| db.open_tree("log")).map_err(|e| StrataError::Io(e.to_string()))?;
        let index = retry_sync(|| db.open_tree("index")).map_err(|e| StrataError::Io(e.to_string()))?;

        let (next_seq, last_token) = match retry_sync(|| log.last()).map_err(|e| StrataError::Io(e.to_string()))? {
            Some((key, value)) => {
                let seq = seq_from_key(&key)?;
                let event: Event =
                    rmp_serde::from_slice(&value).map_err(|e| StrataError::Io(e.to_string()))?;
                (seq + 1, event.integrity)
            }
            None => (0, IntegrityToken::empty()),
        };

        Ok(Self {
            _db: db,
            log,
            index,
            integrity,
            chain: Mutex::new(ChainState { next_seq, last_token }),
        })
    }
}

#[async_trait]
impl RecordKeeper for SledRecordKeeper {
    async fn append(&self, mut event: Event) -> Result<IntegrityToken, StrataError> {
        let mut chain = self.chain.lock().await;
        let token = self
            .integrity
            .compute_token(&event, &chain.last_token)
            .map_err(StrataError::from)?;
        event.integrity = token.clone();

        let seq = chain.next_seq;
        let bytes = rmp_serde::to_vec_named(&event).map_err(|e| StrataError::Io(e.to_string()))?;
        retry_sync(|| self.log.insert(seq_key(seq), bytes.clone()))
            .map_err(|e| StrataError::Io(e.to_string()))?;
        retry_sync(|| self.index.insert(event.uuid.as_bytes(), &seq_key(seq)))
            .map_err(|e| StrataError::Io(e.to_string()))?;

        chain.next_seq += 1;
        chain.last_token = token.clone();
        Ok(token)
    }

    async fn at(&self, seq: Seq) -> Result<Option<StoredEvent>, StrataError> {
        match retry_sync(|| self.log.get(seq_key(seq))).map_err(|e| StrataError::Io(e.to_string()))? {
            Some(bytes) => {
                let event: Event =
                    rmp_serde::from_slice(&bytes).map_err(|e| StrataError::Io(e.to_string()))?;
                Ok(Some(StoredEvent { seq, event }))
            }
            None => Ok(None),
        }
    }

    async fn by_uuid(&self, uuid: Uuid) -> Result<Option<StoredEvent>, StrataError> {
        match retry_sync(|| self.index.get(uuid.as_bytes())).map_err(|e| StrataError::Io(e.to_string()))? {
            Some(seq_bytes) => {
                let seq = seq_from_key(&seq_bytes)?;
                self.at(seq).await
            }
            None => Ok(None),
        }
    }

    async fn next(&self, after: Option<Uuid>, limit: usize) -> Result<Vec<StoredEvent>, StrataError> {
        let start_seq = match after {
            None => 0,
            Some(uuid) => {
                let seq_bytes = retry_sync(|| self.index.get(uuid.as_bytes()))
                    .map_err(|e| StrataError::Io(e.to_string()))?
                    .ok_or_else(|| {
                        StrataError::Validation(ValidationError::new(
                            ValidationReason::UnknownCursor,
                            format!("no event with uuid {uuid}"),
                        ))
                    })?;
                seq_from_key(&seq_bytes)? + 1
            }
        };

        let mut out = Vec::with_capacity(limit.min(64));
        for item in self.log.range(seq_key(start_seq)..).take(limit) {
            let (key, value) = item.map_err(|e| StrataError::Io(e.to_string()))?;
            let seq = seq_from_key(&key)?;
            let event: Event =
                rmp_serde::from_slice(&value).map_err(|e| StrataError::Io(e.to_string()))?;
            out.push(StoredEvent { seq, event });
        }
        Ok(out)
    }

    async fn len(&self) -> Result<u64, StrataError> {
        Ok(self.log.len() as u64)
    }

    async fn verify(&self, integrity: &Integrity) -> Result<VerifyOutcome, StrataError> {
        let mut previous = IntegrityToken::empty();
        for item in self.log.iter() {
            let (key, value) = item.map_err(|e| StrataError::Io(e.to_string()))?;
            let seq = seq_from_key(&key)?;
            let event: Event =
                rmp_serde::from_slice(&value).map_err(|e| StrataError::Io(e.to_string()))?;
            if integrity.verify_token(&event, &previous).is_err() {
                return Ok(VerifyOutcome::FirstBadSeq(seq));
            }
            previous = event.integrity;
        }
        Ok(VerifyOutcome::Ok)
    }
}
