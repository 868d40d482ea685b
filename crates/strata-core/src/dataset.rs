//! [`Dataset`]: the orchestrator tying one installation's `RecordKeeper`,
//! `Depot`, and `State` together behind a single write lock (spec §5).
//!
//! Reshaped from the teacher's `toka-kernel::Kernel` (`submit()` over
//! `Arc<RwLock<WorldState>>`): here the three capabilities are separate
//! trait objects rather than one monolithic state, and the per-dataset
//! lock serializes the whole validate/append/write/apply pipeline (spec
//! §4.3) instead of guarding a single in-memory map.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use strata_depot_core::{Depot, SharedDepot};
use strata_record_keeper_core::integrity::Integrity;
use strata_record_keeper_core::{RecordKeeper, SharedRecordKeeper, VerifyOutcome};
use strata_schema::{parses_as_json_schema, validate_instance};
use strata_state::{ListPage, State};
use strata_types::entity::{AnnotationRecord, ObjectRecord, SchemaRecord, SCHEMA_FORMAT};
use strata_types::error::{NotFoundError, StrataError, ValidationError, ValidationReason};
use strata_types::event::{Event, EventBody};
use strata_types::ids::{Digest, VersionedId};
use strata_types::status::{EntityKind, Status};
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

/// One dataset's three capabilities plus the write lock serializing
/// mutations against them (spec §5: "single-writer per dataset,
/// unlimited concurrent readers"). `state` is not itself wrapped in an
/// extra lock — every `State` implementation already synchronizes its
/// own projection internally, so the write lock here exists only to
/// serialize the *pipeline* (validate against a consistent snapshot,
/// append, write bytes, apply) end to end, not to protect any one field.
pub struct Dataset {
    name: String,
    record_keeper: SharedRecordKeeper,
    depot: SharedDepot,
    state: Arc<dyn State>,
    integrity: Integrity,
    write_lock: Mutex<()>,
}

impl Dataset {
    /// Open a dataset over already-constructed backend handles. Building
    /// those handles (choosing filesystem vs. relational backends,
    /// resolving storage paths from [`crate::config::InstallConfig`]) is
    /// the caller's job; `Dataset` only orchestrates.
    pub fn new(
        name: impl Into<String>,
        record_keeper: SharedRecordKeeper,
        depot: SharedDepot,
        state: Arc<dyn State>,
        integrity: Integrity,
    ) -> Self {
        Self { name: name.into(), record_keeper, depot, state, integrity, write_lock: Mutex::new(()) }
    }

    /// The dataset's name, as used in storage paths and logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn not_found(kind: EntityKind, uuid: Uuid) -> StrataError {
        NotFoundError::entity(kind, uuid, 0).into()
    }

    /// Run one event through the full mutation pipeline: validate
    /// against the current projection, append to the log (which assigns
    /// the real integrity token), then apply to the projection. Must be
    /// called with `write_lock` held.
    #[instrument(skip(self, event), fields(dataset = %self.name, kind = event.body.kind_tag()))]
    async fn submit(&self, event: Event) -> Result<Event, StrataError> {
        self.state.validate(&event).await?;
        let token = self.record_keeper.append(event.clone()).await?;
        let mut event = event;
        event.integrity = token;
        self.state.apply(&event).await?;
        Ok(event)
    }

    /// Like [`Dataset::submit`], but additionally writes `bytes` to the
    /// depot under `id` once the event has been durably appended. If the
    /// blob write fails, the event is already logged and its identifier
    /// already resolvable — "log-present, bytes-missing" (spec §4.6) —
    /// recoverable later via [`crate::repair`] rather than left stuck
    /// half-applied. The projection is only mutated once the bytes are
    /// safely down, keeping an unresolved read from ever observing an
    /// entity it cannot fetch.
    #[instrument(skip(self, event, bytes), fields(dataset = %self.name, kind = event.body.kind_tag(), %id))]
    async fn submit_with_bytes(
        &self,
        event: Event,
        id: VersionedId,
        bytes: &[u8],
        digest: &Digest,
    ) -> Result<Event, StrataError> {
        self.state.validate(&event).await?;
        let token = self.record_keeper.append(event.clone()).await?;
        let mut event = event;
        event.integrity = token;
        self.depot.write(id, bytes, digest).await?;
        self.state.apply(&event).await?;
        Ok(event)
    }

    fn author_event(author: impl Into<String>, body: EventBody) -> Event {
        Event::new(Uuid::new_v4(), author.into(), Utc::now(), body)
    }

    /// Like [`Dataset::submit_with_bytes`], but skips the validate step:
    /// used where the caller has already validated the event and needs to
    /// read the depot (e.g. a referenced schema's bytes) in between, so
    /// validation must run before that read rather than being folded back
    /// into the submit call.
    #[instrument(skip(self, event, bytes), fields(dataset = %self.name, kind = event.body.kind_tag(), %id))]
    async fn submit_with_bytes_prevalidated(
        &self,
        event: Event,
        id: VersionedId,
        bytes: &[u8],
        digest: &Digest,
    ) -> Result<Event, StrataError> {
        let token = self.record_keeper.append(event.clone()).await?;
        let mut event = event;
        event.integrity = token;
        self.depot.write(id, bytes, digest).await?;
        self.state.apply(&event).await?;
        Ok(event)
    }

    // -- owners (spec §4.1: direct, no review) --------------------------

    /// Add `owner` to the dataset's owner set.
    pub async fn add_owner(&self, author: impl Into<String>, owner: impl Into<String>) -> Result<(), StrataError> {
        let _guard = self.write_lock.lock().await;
        let event = Self::author_event(author, EventBody::OwnerAdd { owner: owner.into() });
        self.submit(event).await?;
        Ok(())
    }

    /// Remove `owner` from the dataset's owner set (I7/P8: the floor of
    /// one remaining owner is enforced by `State::validate`).
    pub async fn remove_owner(&self, author: impl Into<String>, owner: impl Into<String>) -> Result<(), StrataError> {
        let _guard = self.write_lock.lock().await;
        let event = Self::author_event(author, EventBody::OwnerRemove { owner: owner.into() });
        self.submit(event).await?;
        Ok(())
    }

    /// The dataset's current owner set.
    pub async fn owners(&self) -> Result<HashSet<String>, StrataError> {
        self.state.owners().await
    }

    // -- objects ---------------------------------------------------------

    /// Create object version 0 from `bytes`, pending review.
    pub async fn create_object(
        &self,
        author: impl Into<String>,
        name: impl Into<String>,
        format: impl Into<String>,
        bytes: &[u8],
    ) -> Result<VersionedId, StrataError> {
        let _guard = self.write_lock.lock().await;
        let uuid = Uuid::new_v4();
        let digest = Digest::sha256(bytes);
        let record = ObjectRecord { uuid, version: 0, name: name.into(), format: format.into(), size: bytes.len() as u64, digest: digest.clone() };
        let id = VersionedId::new(uuid, 0);
        let event = Self::author_event(author, EventBody::ObjectCreate { object: record });
        self.submit_with_bytes(event, id, bytes, &digest).await?;
        Ok(id)
    }

    /// Create the next object version from `bytes`, pending review.
    pub async fn update_object(
        &self,
        author: impl Into<String>,
        uuid: Uuid,
        name: impl Into<String>,
        format: impl Into<String>,
        bytes: &[u8],
    ) -> Result<VersionedId, StrataError> {
        let _guard = self.write_lock.lock().await;
        let current = self.state.current_version(EntityKind::Object, uuid).await?;
        let version = current.map(|v| v + 1).ok_or_else(|| Self::not_found(EntityKind::Object, uuid))?;
        let digest = Digest::sha256(bytes);
        let record = ObjectRecord { uuid, version, name: name.into(), format: format.into(), size: bytes.len() as u64, digest: digest.clone() };
        let id = VersionedId::new(uuid, version);
        let event = Self::author_event(author, EventBody::ObjectUpdate { object: record });
        self.submit_with_bytes(event, id, bytes, &digest).await?;
        Ok(id)
    }

    /// Propose deletion of an object version, pending review.
    pub async fn delete_object(&self, author: impl Into<String>, id: VersionedId) -> Result<Uuid, StrataError> {
        let _guard = self.write_lock.lock().await;
        let event = Self::author_event(author, EventBody::ObjectDelete { object_identifier: id });
        let event = self.submit(event).await?;
        Ok(event.uuid)
    }

    /// Fetch the bytes of an object version.
    pub async fn read_object_bytes(&self, id: VersionedId) -> Result<Vec<u8>, StrataError> {
        self.depot.read(id).await
    }

    // -- schemas -----------------------------------------------------------

    /// Create schema version 0 from a JSON Schema document, pending
    /// review. `name` must be `schema-`-prefixed and not already in use
    /// by a non-deprecated schema.
    pub async fn create_schema(
        &self,
        author: impl Into<String>,
        name: impl Into<String>,
        bytes: &[u8],
    ) -> Result<VersionedId, StrataError> {
        let _guard = self.write_lock.lock().await;
        parses_as_json_schema(bytes)
            .map_err(|e| ValidationError::new(ValidationReason::SchemaInvalid, e.to_string()))?;
        let uuid = Uuid::new_v4();
        let digest = Digest::sha256(bytes);
        let record = SchemaRecord { uuid, version: 0, name: name.into(), format: SCHEMA_FORMAT.to_string(), size: bytes.len() as u64, digest: digest.clone() };
        let id = VersionedId::new(uuid, 0);
        let event = Self::author_event(author, EventBody::SchemaCreate { schema: record });
        self.submit_with_bytes(event, id, bytes, &digest).await?;
        Ok(id)
    }

    /// Create the next schema version. `name` must match the name
    /// recorded at version 0 (spec §4.2: "name may not change on update").
    pub async fn update_schema(
        &self,
        author: impl Into<String>,
        uuid: Uuid,
        name: impl Into<String>,
        bytes: &[u8],
    ) -> Result<VersionedId, StrataError> {
        let _guard = self.write_lock.lock().await;
        parses_as_json_schema(bytes)
            .map_err(|e| ValidationError::new(ValidationReason::SchemaInvalid, e.to_string()))?;
        let current = self.state.current_version(EntityKind::Schema, uuid).await?;
        let version = current.map(|v| v + 1).ok_or_else(|| Self::not_found(EntityKind::Schema, uuid))?;
        let digest = Digest::sha256(bytes);
        let record = SchemaRecord { uuid, version, name: name.into(), format: SCHEMA_FORMAT.to_string(), size: bytes.len() as u64, digest: digest.clone() };
        let id = VersionedId::new(uuid, version);
        let event = Self::author_event(author, EventBody::SchemaUpdate { schema: record });
        self.submit_with_bytes(event, id, bytes, &digest).await?;
        Ok(id)
    }

    /// Propose deprecation of a schema version, pending review.
    pub async fn deprecate_schema(&self, author: impl Into<String>, id: VersionedId) -> Result<Uuid, StrataError> {
        let _guard = self.write_lock.lock().await;
        let event = Self::author_event(author, EventBody::SchemaDeprecate { schema_identifier: id });
        let event = self.submit(event).await?;
        Ok(event.uuid)
    }

    /// Fetch the JSON Schema document bytes of a schema version.
    pub async fn read_schema_bytes(&self, id: VersionedId) -> Result<Vec<u8>, StrataError> {
        self.depot.read(id).await
    }

    /// Resolve a schema name (optionally pinned to a version) to its
    /// versioned identifier.
    pub async fn resolve_schema(&self, name: &str, version: Option<u32>) -> Result<VersionedId, StrataError> {
        self.state.resolve_schema(name, version).await
    }

    // -- annotations -------------------------------------------------------

    /// Create annotation version 0, validating `bytes` against the
    /// referenced schema's document (spec I6) before submission.
    pub async fn create_annotation(
        &self,
        author: impl Into<String>,
        schema: VersionedId,
        object_identifiers: Vec<VersionedId>,
        bytes: &[u8],
    ) -> Result<VersionedId, StrataError> {
        let _guard = self.write_lock.lock().await;
        let uuid = Uuid::new_v4();
        let digest = Digest::sha256(bytes);
        let record = AnnotationRecord {
            uuid,
            version: 0,
            schema,
            object_identifiers,
            size: bytes.len() as u64,
            digest: digest.clone(),
        };
        let id = VersionedId::new(uuid, 0);
        let event = Self::author_event(author, EventBody::AnnotationCreate { annotation: record });

        // Validate (including schema-ref resolution, spec I6) before
        // touching the depot: a bogus `schema` must surface as
        // `ValidationError(SchemaRefUnresolved)`, not a depot `NotFound`.
        self.state.validate(&event).await?;
        let schema_bytes = self.depot.read(schema).await?;
        validate_instance(&schema_bytes, bytes)
            .map_err(|e| ValidationError::new(ValidationReason::AnnotationSchemaInvalid, e.to_string()))?;

        self.submit_with_bytes_prevalidated(event, id, bytes, &digest).await?;
        Ok(id)
    }

    /// Create the next annotation version; the schema reference may
    /// change (spec §4.1: "the schema reference may change").
    pub async fn update_annotation(
        &self,
        author: impl Into<String>,
        uuid: Uuid,
        schema: VersionedId,
        object_identifiers: Vec<VersionedId>,
        bytes: &[u8],
    ) -> Result<VersionedId, StrataError> {
        let _guard = self.write_lock.lock().await;
        let current = self.state.current_version(EntityKind::Annotation, uuid).await?;
        let version = current.map(|v| v + 1).ok_or_else(|| Self::not_found(EntityKind::Annotation, uuid))?;
        let digest = Digest::sha256(bytes);
        let record = AnnotationRecord {
            uuid,
            version,
            schema,
            object_identifiers,
            size: bytes.len() as u64,
            digest: digest.clone(),
        };
        let id = VersionedId::new(uuid, version);
        let event = Self::author_event(author, EventBody::AnnotationUpdate { annotation: record });

        // Validate (including schema-ref resolution, spec I6) before
        // touching the depot: a bogus `schema` must surface as
        // `ValidationError(SchemaRefUnresolved)`, not a depot `NotFound`.
        self.state.validate(&event).await?;
        let schema_bytes = self.depot.read(schema).await?;
        validate_instance(&schema_bytes, bytes)
            .map_err(|e| ValidationError::new(ValidationReason::AnnotationSchemaInvalid, e.to_string()))?;

        self.submit_with_bytes_prevalidated(event, id, bytes, &digest).await?;
        Ok(id)
    }

    /// Propose deletion of an annotation version, pending review.
    pub async fn delete_annotation(&self, author: impl Into<String>, id: VersionedId) -> Result<Uuid, StrataError> {
        let _guard = self.write_lock.lock().await;
        let event = Self::author_event(author, EventBody::AnnotationDelete { annotation_identifier: id });
        let event = self.submit(event).await?;
        Ok(event.uuid)
    }

    /// Fetch the annotation JSON bytes of an annotation version.
    pub async fn read_annotation_bytes(&self, id: VersionedId) -> Result<Vec<u8>, StrataError> {
        self.depot.read(id).await
    }

    // -- review ------------------------------------------------------------

    /// Accept a pending-review event.
    pub async fn review_accept(&self, author: impl Into<String>, event_uuid: Uuid) -> Result<(), StrataError> {
        let _guard = self.write_lock.lock().await;
        let event = Self::author_event(author, EventBody::ReviewAccept { event_uuid });
        self.submit(event).await?;
        Ok(())
    }

    /// Reject a pending-review event.
    pub async fn review_reject(&self, author: impl Into<String>, event_uuid: Uuid) -> Result<(), StrataError> {
        let _guard = self.write_lock.lock().await;
        let event = Self::author_event(author, EventBody::ReviewReject { event_uuid });
        self.submit(event).await?;
        Ok(())
    }

    // -- reads ---------------------------------------------------------------

    /// Current projected status of one versioned entity.
    pub async fn status(&self, kind: EntityKind, id: VersionedId) -> Result<Status, StrataError> {
        self.state.status(kind, id).await
    }

    /// Page through versioned identifiers of `kind`, optionally filtered
    /// by `status`.
    pub async fn list(
        &self,
        kind: EntityKind,
        status: Option<Status>,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<ListPage, StrataError> {
        self.state.list(kind, status, after, limit).await
    }

    /// Recompute every logged event's integrity token and compare
    /// against what is stored (spec §4.6, §6.2).
    pub async fn verify_integrity(&self) -> Result<VerifyOutcome, StrataError> {
        self.record_keeper.verify(&self.integrity).await
    }

    /// Shared handle to the underlying record keeper, for callers that
    /// need raw log access (e.g. `strata-core::repair`'s blob sweep).
    pub(crate) fn record_keeper(&self) -> &SharedRecordKeeper {
        &self.record_keeper
    }

    /// Shared handle to the underlying depot, for the same reason.
    pub(crate) fn depot(&self) -> &SharedDepot {
        &self.depot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_depot_fs::FsDepot;
    use strata_record_keeper_sled::SledRecordKeeper;
    use strata_state::MemoryState;

    async fn fresh_dataset(dir: &tempfile::TempDir) -> Dataset {
        let record_keeper = SledRecordKeeper::open(dir.path().join("log"), Integrity::HashChain).unwrap();
        let depot = FsDepot::open(dir.path().join("blobs")).await.unwrap();
        let state = MemoryState::new();
        let dataset = Dataset::new("ds", Arc::new(record_keeper), Arc::new(depot), Arc::new(state), Integrity::HashChain);
        dataset.add_owner("alice", "alice").await.unwrap();
        dataset
    }

    #[tokio::test]
    async fn create_object_then_accept_makes_bytes_readable() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = fresh_dataset(&dir).await;

        let id = dataset.create_object("alice", "report.txt", "text/plain", b"hello").await.unwrap();
        assert_eq!(dataset.status(EntityKind::Object, id).await.unwrap(), Status::Pending);

        let events = dataset.record_keeper.next(None, 10).await.unwrap();
        let create_event = events.iter().find(|e| matches!(e.event.body, EventBody::ObjectCreate { .. })).unwrap();
        dataset.review_accept("alice", create_event.event.uuid).await.unwrap();
        assert_eq!(dataset.status(EntityKind::Object, id).await.unwrap(), Status::Accepted);

        let bytes = dataset.read_object_bytes(id).await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn update_object_assigns_dense_next_version() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = fresh_dataset(&dir).await;

        let first = dataset.create_object("alice", "a.txt", "text/plain", b"v0").await.unwrap();
        let second = dataset.update_object("alice", first.uuid, "a.txt", "text/plain", b"v1").await.unwrap();
        assert_eq!(second.version, 1);
    }

    #[tokio::test]
    async fn schema_and_annotation_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = fresh_dataset(&dir).await;

        let schema_bytes = br#"{"type":"object","properties":{"label":{"type":"string"}},"required":["label"]}"#;
        let schema_id = dataset.create_schema("alice", "schema-label", schema_bytes).await.unwrap();

        let object_id = dataset.create_object("alice", "pic.png", "image/png", b"\x89PNG").await.unwrap();

        let annotation_bytes = br#"{"label":"bird"}"#;
        let annotation_id = dataset
            .create_annotation("alice", schema_id, vec![object_id], annotation_bytes)
            .await
            .unwrap();
        assert_eq!(annotation_id.version, 0);
    }

    #[tokio::test]
    async fn annotation_rejects_instance_failing_schema() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = fresh_dataset(&dir).await;

        let schema_bytes = br#"{"type":"object","properties":{"label":{"type":"string"}},"required":["label"]}"#;
        let schema_id = dataset.create_schema("alice", "schema-label", schema_bytes).await.unwrap();
        let object_id = dataset.create_object("alice", "pic.png", "image/png", b"\x89PNG").await.unwrap();

        let bad_instance = br#"{"label": 42}"#;
        let err = dataset.create_annotation("alice", schema_id, vec![object_id], bad_instance).await;
        assert!(matches!(err, Err(StrataError::Validation(_))));
    }

    #[tokio::test]
    async fn remove_last_owner_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = fresh_dataset(&dir).await;
        let err = dataset.remove_owner("alice", "alice").await;
        assert!(matches!(err, Err(StrataError::Validation(_))));
    }

    #[tokio::test]
    async fn verify_integrity_reports_ok_on_untampered_log() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = fresh_dataset(&dir).await;
        dataset.create_object("alice", "a.txt", "text/plain", b"v0").await.unwrap();
        assert_eq!(dataset.verify_integrity().await.unwrap(), VerifyOutcome::Ok);
    }
}
