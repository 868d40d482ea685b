use std::collections::{HashMap, HashSet};

use strata_types::entity::{AnnotationRecord, ObjectRecord, SchemaRecord};
use strata_types::event::{Event, EventBody};
use strata_types::ids::VersionedId;
use strata_types::status::{EntityKind, Status};
use uuid::Uuid;

use crate::entity_table::EntityTable;

/// What a non-review event did, recorded so a later `ReviewAccept`/
/// `ReviewReject` can locate and mutate the right entity version without
/// re-reading the original event from the record keeper (spec §4.4).
#[derive(Debug, Clone, Copy)]
pub enum EventTarget {
    /// Owner mutations: no reviewable target, took effect on append.
    None,
    /// A create/update event. Accept -> `Accepted`; reject -> `Rejected`.
    Created { kind: EntityKind, id: VersionedId },
    /// A delete/deprecate event. Accept -> the kind's terminal status;
    /// reject -> no change (spec §4.4).
    Terminal { kind: EntityKind, id: VersionedId },
}

/// Review outcome of an event, tracked so `ReviewAccept`/`ReviewReject`
/// can enforce "at most once" (I8, P7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewState {
    /// Owner-mutation events are never reviewed.
    NotReviewable,
    /// Awaiting `ReviewAccept`/`ReviewReject`.
    Pending,
    /// Terminal: accepted.
    Accepted,
    /// Terminal: rejected.
    Rejected,
}

/// Everything the projection remembers about one appended event, keyed
/// by the event's own UUID.
#[derive(Debug, Clone)]
pub struct EventMeta {
    /// What this event would transition on review (or `None`).
    pub target: EventTarget,
    /// Whether this event is itself a review (`ReviewAccept`/`Reject`).
    pub is_review: bool,
    /// Current review state.
    pub review: ReviewState,
}

/// The full derived projection for one dataset: owner set, entity
/// tables, schema-name index, and per-event review bookkeeping. Pure
/// data — no I/O, no locking; [`crate::memory::MemoryState`] wraps this
/// behind a `tokio::sync::RwLock`.
#[derive(Debug, Clone, Default)]
pub struct Projection {
    /// Current owner set.
    pub owners: HashSet<String>,
    /// Object version history, by UUID.
    pub objects: EntityTable<ObjectRecord>,
    /// Schema version history, by UUID.
    pub schemas: EntityTable<SchemaRecord>,
    /// Annotation version history, by UUID.
    pub annotations: EntityTable<AnnotationRecord>,
    /// Schema name -> owning UUID, for the currently-active name holder.
    pub schema_names: HashMap<String, Uuid>,
    /// Per-event review bookkeeping, by event UUID.
    pub events: HashMap<Uuid, EventMeta>,
}

impl Projection {
    /// Whether `name` is available for a new `SchemaCreate` (spec I5,
    /// P5): either never used, or used by a schema UUID whose every
    /// version is now deprecated.
    pub fn schema_name_available(&self, name: &str) -> bool {
        match self.schema_names.get(name) {
            None => true,
            Some(uuid) => match self.schemas.get(*uuid) {
                Some(history) => history.versions.iter().all(|v| v.status == Status::Deprecated),
                None => true,
            },
        }
    }

    /// Projected status of one versioned entity.
    pub fn status_of(&self, kind: EntityKind, id: VersionedId) -> Option<Status> {
        let history = match kind {
            EntityKind::Object => self.objects.get(id.uuid),
            EntityKind::Schema => self.schemas.get(id.uuid),
            EntityKind::Annotation => self.annotations.get(id.uuid),
        }?;
        history.versions.get(id.version as usize).map(|v| v.status)
    }

    /// Resolve a schema by name to its current owning UUID, then to
    /// either an explicit `version` or the latest version on record.
    pub fn resolve_schema(&self, name: &str, version: Option<u32>) -> Option<VersionedId> {
        let uuid = *self.schema_names.get(name)?;
        let history = self.schemas.get(uuid)?;
        let resolved_version = version.unwrap_or_else(|| history.max_version());
        history.versions.get(resolved_version as usize)?;
        Some(VersionedId::new(uuid, resolved_version))
    }

    /// Apply an already-validated event to the projection (spec §6.2:
    /// "must only be called with a validated event"). Infallible by
    /// contract — `validate` is the gate.
    pub fn apply(&mut self, event: &Event) {
        match &event.body {
            EventBody::OwnerAdd { owner } => {
                self.owners.insert(owner.clone());
                self.events.insert(
                    event.uuid,
                    EventMeta { target: EventTarget::None, is_review: false, review: ReviewState::NotReviewable },
                );
            }
            EventBody::OwnerRemove { owner } => {
                self.owners.remove(owner);
                self.events.insert(
                    event.uuid,
                    EventMeta { target: EventTarget::None, is_review: false, review: ReviewState::NotReviewable },
                );
            }
            EventBody::ObjectCreate { object } | EventBody::ObjectUpdate { object } => {
                let id = VersionedId::new(object.uuid, object.version);
                self.objects.insert_version(object.uuid, object.clone());
                self.record_created(event.uuid, EntityKind::Object, id);
            }
            EventBody::ObjectDelete { object_identifier } => {
                self.record_terminal(event.uuid, EntityKind::Object, *object_identifier);
            }
            EventBody::SchemaCreate { schema } | EventBody::SchemaUpdate { schema } => {
                let id = VersionedId::new(schema.uuid, schema.version);
                self.schema_names.insert(schema.name.clone(), schema.uuid);
                self.schemas.insert_version(schema.uuid, schema.clone());
                self.record_created(event.uuid, EntityKind::Schema, id);
            }
            EventBody::SchemaDeprecate { schema_identifier } => {
                self.record_terminal(event.uuid, EntityKind::Schema, *schema_identifier);
            }
            EventBody::AnnotationCreate { annotation } | EventBody::AnnotationUpdate { annotation } => {
                let id = VersionedId::new(annotation.uuid, annotation.version);
                self.annotations.insert_version(annotation.uuid, annotation.clone());
                self.record_created(event.uuid, EntityKind::Annotation, id);
            }
            EventBody::AnnotationDelete { annotation_identifier } => {
                self.record_terminal(event.uuid, EntityKind::Annotation, *annotation_identifier);
            }
            EventBody::ReviewAccept { event_uuid } => self.apply_review(*event_uuid, true),
            EventBody::ReviewReject { event_uuid } => self.apply_review(*event_uuid, false),
        }
    }

    fn record_created(&mut self, event_uuid: Uuid, kind: EntityKind, id: VersionedId) {
        self.events.insert(
            event_uuid,
            EventMeta {
                target: EventTarget::Created { kind, id },
                is_review: false,
                review: ReviewState::Pending,
            },
        );
    }

    fn record_terminal(&mut self, event_uuid: Uuid, kind: EntityKind, id: VersionedId) {
        self.events.insert(
            event_uuid,
            EventMeta {
                target: EventTarget::Terminal { kind, id },
                is_review: false,
                review: ReviewState::Pending,
            },
        );
    }

    fn apply_review(&mut self, target_uuid: Uuid, accept: bool) {
        let Some(meta) = self.events.get_mut(&target_uuid) else { return };
        meta.review = if accept { ReviewState::Accepted } else { ReviewState::Rejected };
        let target = meta.target;
        match target {
            EventTarget::None => {}
            EventTarget::Created { kind, id } => {
                let status = if accept { Status::Accepted } else { Status::Rejected };
                self.set_status(kind, id, status);
            }
            EventTarget::Terminal { kind, id } => {
                if accept {
                    self.set_status(kind, id, kind.terminal_status());
                }
                // Reject leaves the entity in its prior status (spec §4.4).
            }
        }
    }

    fn set_status(&mut self, kind: EntityKind, id: VersionedId, status: Status) {
        match kind {
            EntityKind::Object => self.objects.set_status(id.uuid, id.version, status),
            EntityKind::Schema => self.schemas.set_status(id.uuid, id.version, status),
            EntityKind::Annotation => self.annotations.set_status(id.uuid, id.version, status),
        }
    }
}
