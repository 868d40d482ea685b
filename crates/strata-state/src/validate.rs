//! Validation rules gating `State::validate` (spec §4.2). One function
//! per event kind, each a pure read against the current [`Projection`].
//! Bytes-dependent checks (digest-honesty, JSON-Schema parsing, instance
//! validation) happen one layer up in `strata-core`, which has the raw
//! bytes; these functions only see the already-decoded record metadata.

use strata_types::error::{ValidationError, ValidationReason};
use strata_types::event::EventBody;
use strata_types::ids::VersionedId;
use strata_types::status::{EntityKind, Status};

use crate::projection::{EventTarget, Projection, ReviewState};

type ValidationResult = Result<(), ValidationError>;

fn fail(reason: ValidationReason, detail: impl Into<String>) -> ValidationResult {
    Err(ValidationError::new(reason, detail))
}

/// Validate `body` against `projection`, per the table in spec.md §4.2.
pub fn validate_body(projection: &Projection, body: &EventBody) -> ValidationResult {
    match body {
        EventBody::OwnerAdd { owner } => owner_add(projection, owner),
        EventBody::OwnerRemove { owner } => owner_remove(projection, owner),
        EventBody::ObjectCreate { object } => {
            create(projection, EntityKind::Object, object.uuid, object.version)
        }
        EventBody::ObjectUpdate { object } => {
            update(projection, EntityKind::Object, object.uuid, object.version)
        }
        EventBody::ObjectDelete { object_identifier } => {
            delete_or_deprecate(projection, EntityKind::Object, *object_identifier)
        }
        EventBody::SchemaCreate { schema } => {
            schema_create(projection, &schema.name, schema.uuid, schema.version)
        }
        EventBody::SchemaUpdate { schema } => {
            schema_update(projection, &schema.name, schema.uuid, schema.version)
        }
        EventBody::SchemaDeprecate { schema_identifier } => {
            delete_or_deprecate(projection, EntityKind::Schema, *schema_identifier)
        }
        EventBody::AnnotationCreate { annotation } => annotation_create_or_update(
            projection,
            annotation.uuid,
            annotation.version,
            annotation.schema,
            &annotation.object_identifiers,
            false,
        ),
        EventBody::AnnotationUpdate { annotation } => annotation_create_or_update(
            projection,
            annotation.uuid,
            annotation.version,
            annotation.schema,
            &annotation.object_identifiers,
            true,
        ),
        EventBody::AnnotationDelete { annotation_identifier } => {
            delete_or_deprecate(projection, EntityKind::Annotation, *annotation_identifier)
        }
        EventBody::ReviewAccept { event_uuid } => review(projection, *event_uuid, true),
        EventBody::ReviewReject { event_uuid } => review(projection, *event_uuid, false),
    }
}

fn owner_add(projection: &Projection, owner: &str) -> ValidationResult {
    if projection.owners.contains(owner) {
        return fail(ValidationReason::OwnerAlreadyExists, format!("{owner} is already an owner"));
    }
    Ok(())
}

fn owner_remove(projection: &Projection, owner: &str) -> ValidationResult {
    if !projection.owners.contains(owner) {
        return fail(ValidationReason::OwnerNotFound, format!("{owner} is not an owner"));
    }
    if projection.owners.len() <= 1 {
        return fail(ValidationReason::LastOwner, "cannot remove the last owner of a dataset");
    }
    Ok(())
}

fn create(projection: &Projection, kind: EntityKind, uuid: uuid::Uuid, version: u32) -> ValidationResult {
    let exists = match kind {
        EntityKind::Object => projection.objects.contains(uuid),
        EntityKind::Schema => projection.schemas.contains(uuid),
        EntityKind::Annotation => projection.annotations.contains(uuid),
    };
    if exists {
        return fail(ValidationReason::UuidInUse, format!("{uuid} is already in use"));
    }
    if version != 0 {
        return fail(ValidationReason::VersionMismatch, "create must assign version 0");
    }
    Ok(())
}

fn update(projection: &Projection, kind: EntityKind, uuid: uuid::Uuid, version: u32) -> ValidationResult {
    let history = match kind {
        EntityKind::Object => projection.objects.get(uuid),
        EntityKind::Schema => projection.schemas.get(uuid),
        EntityKind::Annotation => projection.annotations.get(uuid),
    }
    .ok_or_else(|| ValidationError::new(ValidationReason::VersionMismatch, format!("{uuid} does not exist")))?;

    let max = history.max_version();
    if version != max + 1 {
        return fail(ValidationReason::VersionMismatch, format!("expected version {}, got {version}", max + 1));
    }
    let current_status = history.versions[max as usize].status;
    if current_status.is_terminal() {
        return fail(ValidationReason::TerminalState, format!("{uuid}@{max} is already terminal"));
    }
    Ok(())
}

fn delete_or_deprecate(projection: &Projection, kind: EntityKind, id: VersionedId) -> ValidationResult {
    let status = projection
        .status_of(kind, id)
        .ok_or_else(|| ValidationError::new(ValidationReason::VersionMismatch, format!("{id} does not exist")))?;
    match kind {
        EntityKind::Schema => {
            if status == Status::Deprecated {
                return fail(ValidationReason::AlreadyDeprecated, format!("{id} is already deprecated"));
            }
        }
        EntityKind::Object | EntityKind::Annotation => {
            if !matches!(status, Status::Pending | Status::Accepted) {
                return fail(ValidationReason::TerminalState, format!("{id} is not pending or accepted"));
            }
        }
    }
    Ok(())
}

fn schema_create(projection: &Projection, name: &str, uuid: uuid::Uuid, version: u32) -> ValidationResult {
    if !name.starts_with(strata_types::entity::SCHEMA_NAME_PREFIX) {
        return fail(ValidationReason::SchemaNamePrefix, format!("{name} must start with 'schema-'"));
    }
    if !projection.schema_name_available(name) {
        return fail(ValidationReason::SchemaNameTaken, format!("{name} is already in use"));
    }
    create(projection, EntityKind::Schema, uuid, version)
}

fn schema_update(projection: &Projection, name: &str, uuid: uuid::Uuid, version: u32) -> ValidationResult {
    let history = projection
        .schemas
        .get(uuid)
        .ok_or_else(|| ValidationError::new(ValidationReason::VersionMismatch, format!("{uuid} does not exist")))?;
    if history.versions[0].record.name != name {
        return fail(ValidationReason::SchemaNamePrefix, "schema name may not change on update");
    }
    update(projection, EntityKind::Schema, uuid, version)
}

fn annotation_create_or_update(
    projection: &Projection,
    uuid: uuid::Uuid,
    version: u32,
    schema_ref: VersionedId,
    object_refs: &[VersionedId],
    is_update: bool,
) -> ValidationResult {
    let schema_status = projection.status_of(EntityKind::Schema, schema_ref).ok_or_else(|| {
        ValidationError::new(ValidationReason::SchemaRefUnresolved, format!("schema {schema_ref} does not exist"))
    })?;
    if schema_status == Status::Rejected || schema_status == Status::Deprecated {
        return fail(
            ValidationReason::SchemaRefUnresolved,
            format!("schema {schema_ref} is {schema_status:?}, not usable"),
        );
    }

    for object_ref in object_refs {
        let object_status = projection.status_of(EntityKind::Object, *object_ref).ok_or_else(|| {
            ValidationError::new(ValidationReason::ObjectRefUnresolved, format!("object {object_ref} does not exist"))
        })?;
        if object_status == Status::Rejected || object_status == Status::Deleted {
            return fail(
                ValidationReason::ObjectRefUnresolved,
                format!("object {object_ref} is {object_status:?}, not usable"),
            );
        }
    }

    if is_update {
        update(projection, EntityKind::Annotation, uuid, version)
    } else {
        create(projection, EntityKind::Annotation, uuid, version)
    }
}

fn review(projection: &Projection, target_uuid: uuid::Uuid, accept: bool) -> ValidationResult {
    let meta = projection.events.get(&target_uuid).ok_or_else(|| {
        ValidationError::new(ValidationReason::ReviewTargetNotFound, format!("no event {target_uuid}"))
    })?;
    if meta.is_review {
        return fail(ValidationReason::ReviewTargetIsReview, format!("{target_uuid} is itself a review event"));
    }
    if meta.review != ReviewState::Pending {
        return fail(
            ValidationReason::ReviewTargetNotPending,
            format!("{target_uuid} is not pending review"),
        );
    }
    // P7/I8 plus the §4.4 note: a delete/deprecate target that has
    // already gone terminal (via a concurrently-accepted sibling delete)
    // can no longer be *accepted*, even though its own review is still
    // nominally "pending" in isolation. Rejecting it is still harmless.
    if accept {
        if let EventTarget::Terminal { kind, id } = meta.target {
            if let Some(status) = projection.status_of(kind, id) {
                if status.is_terminal() {
                    return fail(ValidationReason::TerminalState, format!("{id} is already in a terminal state"));
                }
            }
        }
    }
    Ok(())
}
