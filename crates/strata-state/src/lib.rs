#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **strata-state** – The projection/validator component (spec §2, §6.2).
//!
//! Holds derived indices (by name, by status, by entity), validates
//! proposed events against the current projection, and transitions
//! entity status on accept/reject. [`MemoryState`] is the in-memory
//! implementation; `strata-state-sql` provides a relational one.

use async_trait::async_trait;
use strata_types::error::StrataError;
use strata_types::event::Event;
use strata_types::ids::VersionedId;
use strata_types::status::{EntityKind, Status};
use uuid::Uuid;

/// Entity insertion/bookkeeping shared by every `State` backend.
pub mod entity_table;
/// In-memory `State` implementation.
pub mod memory;
/// Derived projection data and its pure `apply` transition logic.
pub mod projection;
/// Pure replay of a `RecordKeeper` log into a fresh `State` (spec §4.6).
pub mod rebuild;
/// Validation rules gating `State::validate` (spec §4.2).
pub mod validate;

pub use memory::MemoryState;

/// One page of a `State::list` query: the matching versioned
/// identifiers and an opaque cursor to resume from the next page.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Matching versioned identifiers, in stable insertion order.
    pub items: Vec<VersionedId>,
    /// Pass this back as `after` to continue; `None` once exhausted.
    pub next_after: Option<Uuid>,
}

/// The projection/validator abstraction (spec §2, §6.2).
#[async_trait]
pub trait State: Send + Sync {
    /// Validate `event` against the current projection without
    /// mutating it (spec §4.2).
    async fn validate(&self, event: &Event) -> Result<(), StrataError>;

    /// Apply an already-validated event, mutating the projection (spec
    /// §4.4). Must only be called after a successful `validate` for the
    /// same event.
    async fn apply(&self, event: &Event) -> Result<(), StrataError>;

    /// Current projected status of one versioned entity.
    async fn status(&self, kind: EntityKind, id: VersionedId) -> Result<Status, StrataError>;

    /// Page through versioned identifiers of `kind`, optionally filtered
    /// by `status`, starting strictly after `after` (spec §9, Open
    /// Question (c): an unknown `after` UUID is a `ValidationError`).
    async fn list(
        &self,
        kind: EntityKind,
        status: Option<Status>,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<ListPage, StrataError>;

    /// Resolve a schema name (optionally pinned to a version) to its
    /// versioned identifier.
    async fn resolve_schema(&self, name: &str, version: Option<u32>) -> Result<VersionedId, StrataError>;

    /// Highest version on record for `uuid` under `kind`, or `None` if no
    /// version of that UUID has ever been created. Used by the mutation
    /// pipeline to assign `max_version + 1` on update (spec §4.3 step 2).
    async fn current_version(&self, kind: EntityKind, uuid: Uuid) -> Result<Option<u32>, StrataError>;

    /// The dataset's current owner set (I7/P8: never empty once created).
    async fn owners(&self) -> Result<std::collections::HashSet<String>, StrataError>;
}
