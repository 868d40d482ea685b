use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{AnnotationRecord, ObjectRecord, SchemaRecord};
use crate::ids::{IntegrityToken, Timestamp, VersionedId};

/// The closed taxonomy of mutating facts the core understands (spec
/// §4.1). Re-architected from the source's runtime type identity into a
/// single tagged sum type, matched exhaustively by every validator and
/// projection (spec §9, Design Note "Dynamic event dispatch"). The
/// `type` tag on the wire is the variant name in `snake_case`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventBody {
    /// Add `owner` to the dataset's owner set. Takes effect on append;
    /// not itself reviewed (spec §4.1).
    OwnerAdd {
        /// Opaque owner identifier.
        owner: String,
    },
    /// Remove `owner` from the dataset's owner set.
    OwnerRemove {
        /// Opaque owner identifier.
        owner: String,
    },
    /// Create object version 0.
    ObjectCreate {
        /// The new object version (`version` must be 0).
        object: ObjectRecord,
    },
    /// Create object version `max_version + 1`.
    ObjectUpdate {
        /// The new object version.
        object: ObjectRecord,
    },
    /// Propose deletion of an object version.
    ObjectDelete {
        /// The targeted object version.
        object_identifier: VersionedId,
    },
    /// Create schema version 0.
    SchemaCreate {
        /// The new schema version (`version` must be 0).
        schema: SchemaRecord,
    },
    /// Create schema version `max_version + 1`. Name may not change.
    SchemaUpdate {
        /// The new schema version.
        schema: SchemaRecord,
    },
    /// Propose deprecation of a schema version.
    SchemaDeprecate {
        /// The targeted schema version.
        schema_identifier: VersionedId,
    },
    /// Create annotation version 0.
    AnnotationCreate {
        /// The new annotation version (`version` must be 0).
        annotation: AnnotationRecord,
    },
    /// Create annotation version `max_version + 1`. The schema reference
    /// may change.
    AnnotationUpdate {
        /// The new annotation version.
        annotation: AnnotationRecord,
    },
    /// Propose deletion of an annotation version.
    AnnotationDelete {
        /// The targeted annotation version.
        annotation_identifier: VersionedId,
    },
    /// Accept a pending-review event.
    ReviewAccept {
        /// UUID of the event under review.
        event_uuid: Uuid,
    },
    /// Reject a pending-review event.
    ReviewReject {
        /// UUID of the event under review.
        event_uuid: Uuid,
    },
}

impl EventBody {
    /// `true` for the two events that mutate the owner set directly,
    /// without going through review (spec §4.1).
    pub fn is_owner_mutation(&self) -> bool {
        matches!(self, EventBody::OwnerAdd { .. } | EventBody::OwnerRemove { .. })
    }

    /// `true` for `ReviewAccept`/`ReviewReject`.
    pub fn is_review(&self) -> bool {
        matches!(self, EventBody::ReviewAccept { .. } | EventBody::ReviewReject { .. })
    }

    /// The wire `type` tag for this variant, e.g. `"object_create"`.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            EventBody::OwnerAdd { .. } => "owner_add",
            EventBody::OwnerRemove { .. } => "owner_remove",
            EventBody::ObjectCreate { .. } => "object_create",
            EventBody::ObjectUpdate { .. } => "object_update",
            EventBody::ObjectDelete { .. } => "object_delete",
            EventBody::SchemaCreate { .. } => "schema_create",
            EventBody::SchemaUpdate { .. } => "schema_update",
            EventBody::SchemaDeprecate { .. } => "schema_deprecate",
            EventBody::AnnotationCreate { .. } => "annotation_create",
            EventBody::AnnotationUpdate { .. } => "annotation_update",
            EventBody::AnnotationDelete { .. } => "annotation_delete",
            EventBody::ReviewAccept { .. } => "review_accept",
            EventBody::ReviewReject { .. } => "review_reject",
        }
    }
}

/// A fully-formed event: envelope metadata plus its typed body. This is
/// what `RecordKeeper::append` persists and what `State::validate`/
/// `State::apply` consume (spec §4.1, §4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier, freshly allocated at construction time.
    pub uuid: Uuid,
    /// Authenticated caller, supplied by the (out-of-scope) HTTP layer.
    pub author: String,
    /// Wall-clock commit time; advisory only, never used for ordering
    /// (spec §5).
    pub timestamp: Timestamp,
    /// The type-tagged payload.
    pub body: EventBody,
    /// Integrity token computed once the event is otherwise complete;
    /// excluded from the canonical serialization used to compute itself
    /// (spec §4.5).
    pub integrity: IntegrityToken,
}

impl Event {
    /// Construct an event with an empty integrity token, to be filled in
    /// by `strata-record-keeper-core::integrity` once canonicalized.
    pub fn new(uuid: Uuid, author: String, timestamp: Timestamp, body: EventBody) -> Self {
        Self { uuid, author, timestamp, body, integrity: IntegrityToken::empty() }
    }
}
