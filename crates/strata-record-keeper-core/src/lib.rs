#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **strata-record-keeper-core** – Core `RecordKeeper` abstraction.
//!
//! Defines the append-only event log contract, canonical event
//! serialization, and integrity token computation for both supported
//! modes (hash-chain and signature). Storage drivers (`strata-record-
//! keeper-sled`, `strata-record-keeper-sql`) implement [`RecordKeeper`]
//! against their own backend; this crate contains no I/O.

use std::sync::Arc;

use async_trait::async_trait;
use strata_types::error::StrataError;
use strata_types::event::Event;
use uuid::Uuid;

/// Total-order position of an event within one dataset's log.
pub type Seq = u64;

/// Integrity token computation and verification.
pub mod integrity;
pub use integrity::{AuthorKeystore, Integrity};

/// An event together with the sequence number `RecordKeeper::append`
/// assigned it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    /// Position in the append-only log, starting at 0.
    pub seq: Seq,
    /// The event itself, integrity token included.
    pub event: Event,
}

/// Result of an offline integrity verification pass (spec §4.6, §6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Every event's integrity token checks out.
    Ok,
    /// The chain/signature first diverges at this sequence number.
    FirstBadSeq(Seq),
}

/// Abstraction over an append-only event log (spec §2, §6.2).
///
/// Guarantees total ordering of successfully appended events and
/// computes/stores an integrity token per event. Implementations must
/// treat events as immutable once appended (I1).
#[async_trait]
pub trait RecordKeeper: Send + Sync {
    /// Append `event` (with an already-computed, provisional integrity
    /// token slot) to the log, compute its real integrity token given the
    /// previous event's token, and return that token. The log is the
    /// source of truth for the token once this returns `Ok`.
    async fn append(&self, event: Event) -> Result<strata_types::ids::IntegrityToken, StrataError>;

    /// Fetch the event at a given sequence number.
    async fn at(&self, seq: Seq) -> Result<Option<StoredEvent>, StrataError>;

    /// Fetch an event by its UUID, regardless of position.
    async fn by_uuid(&self, uuid: Uuid) -> Result<Option<StoredEvent>, StrataError>;

    /// Page through events in append order, strictly after `after` if
    /// given. Returns at most `limit` events. An `after` UUID that does
    /// not exist in the log is a validation error (spec §9, Open
    /// Question (c)).
    async fn next(&self, after: Option<Uuid>, limit: usize) -> Result<Vec<StoredEvent>, StrataError>;

    /// Total number of events appended so far.
    async fn len(&self) -> Result<u64, StrataError>;

    /// Recompute every event's integrity token from scratch and compare
    /// against what is stored, returning the first divergence if any
    /// (spec §4.6). The default implementation replays the log via
    /// [`RecordKeeper::at`]; backends may override it with a more
    /// efficient native scan.
    async fn verify(&self, integrity: &Integrity) -> Result<VerifyOutcome, StrataError> {
        let mut previous = strata_types::ids::IntegrityToken::empty();
        let total = self.len().await?;
        for seq in 0..total {
            let stored = self
                .at(seq)
                .await?
                .ok_or_else(|| StrataError::Conflict(format!("log gap at sequence {seq}")))?;
            if integrity.verify_token(&stored.event, &previous).is_err() {
                return Ok(VerifyOutcome::FirstBadSeq(seq));
            }
            previous = stored.event.integrity.clone();
        }
        Ok(VerifyOutcome::Ok)
    }
}

/// Shared handle to a record keeper, as held by `strata-core`.
pub type SharedRecordKeeper = Arc<dyn RecordKeeper>;
