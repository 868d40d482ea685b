use std::collections::HashSet;

use async_trait::async_trait;
use strata_types::error::{NotFoundError, StrataError, ValidationError, ValidationReason};
use strata_types::event::Event;
use strata_types::ids::VersionedId;
use strata_types::status::{EntityKind, Status};
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::projection::Projection;
use crate::validate::validate_body;
use crate::{ListPage, State};

/// In-memory `State`: the whole projection lives behind one
/// `tokio::sync::RwLock`, matching the teacher's `WorldState` shape
/// (`toka-kernel::Kernel` holds `Arc<RwLock<WorldState>>`). Durable
/// persistence is RecordKeeper's job — this projection is rebuilt from
/// the log on process start via [`crate::rebuild`] (spec §4.6).
#[derive(Default)]
pub struct MemoryState {
    projection: RwLock<Projection>,
}

impl MemoryState {
    /// An empty projection, ready to have events replayed into it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the projection for tests and rebuild comparisons (P4).
    pub async fn snapshot(&self) -> Projection {
        self.projection.read().await.clone()
    }
}

#[async_trait]
impl State for MemoryState {
    #[instrument(skip(self, event), fields(kind = event.body.kind_tag()))]
    async fn validate(&self, event: &Event) -> Result<(), StrataError> {
        let projection = self.projection.read().await;
        validate_body(&projection, &event.body)?;
        Ok(())
    }

    #[instrument(skip(self, event), fields(kind = event.body.kind_tag()))]
    async fn apply(&self, event: &Event) -> Result<(), StrataError> {
        let mut projection = self.projection.write().await;
        projection.apply(event);
        debug!("applied event to projection");
        Ok(())
    }

    async fn status(&self, kind: EntityKind, id: VersionedId) -> Result<Status, StrataError> {
        let projection = self.projection.read().await;
        projection
            .status_of(kind, id)
            .ok_or_else(|| NotFoundError::entity(kind, id.uuid, id.version).into())
    }

    async fn list(
        &self,
        kind: EntityKind,
        status: Option<Status>,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<ListPage, StrataError> {
        let projection = self.projection.read().await;

        macro_rules! page_from {
            ($table:expr) => {{
                let page = $table.page_after(after, limit).ok_or_else(|| {
                    StrataError::Validation(ValidationError::new(
                        ValidationReason::UnknownCursor,
                        format!("no {kind:?} with uuid {after:?}", after = after.unwrap()),
                    ))
                })?;
                let next_after = page.last().map(|(uuid, _)| *uuid);
                let mut items = Vec::new();
                for (uuid, history) in page {
                    for (version, slot) in history.versions.iter().enumerate() {
                        if status.map_or(true, |s| s == slot.status) {
                            items.push(VersionedId::new(uuid, version as u32));
                        }
                    }
                }
                ListPage { items, next_after }
            }};
        }

        let result = match kind {
            EntityKind::Object => page_from!(projection.objects),
            EntityKind::Schema => page_from!(projection.schemas),
            EntityKind::Annotation => page_from!(projection.annotations),
        };
        Ok(result)
    }

    async fn resolve_schema(&self, name: &str, version: Option<u32>) -> Result<VersionedId, StrataError> {
        let projection = self.projection.read().await;
        projection
            .resolve_schema(name, version)
            .ok_or_else(|| NotFoundError { kind: "schema".to_string(), id: name.to_string() }.into())
    }

    async fn owners(&self) -> Result<HashSet<String>, StrataError> {
        Ok(self.projection.read().await.owners.clone())
    }

    async fn current_version(&self, kind: EntityKind, uuid: Uuid) -> Result<Option<u32>, StrataError> {
        let projection = self.projection.read().await;
        let history = match kind {
            EntityKind::Object => projection.objects.get(uuid),
            EntityKind::Schema => projection.schemas.get(uuid),
            EntityKind::Annotation => projection.annotations.get(uuid),
        };
        Ok(history.map(|h| h.max_version()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use strata_types::entity::{ObjectRecord, SchemaRecord};
    use strata_types::event::EventBody;
    use strata_types::ids::Digest;

    fn object_create(uuid: Uuid) -> Event {
        Event::new(
            Uuid::new_v4(),
            "alice".into(),
            Utc::now(),
            EventBody::ObjectCreate {
                object: ObjectRecord {
                    uuid,
                    version: 0,
                    name: "obj.txt".into(),
                    format: "text/plain".into(),
                    size: 5,
                    digest: Digest::sha256(b"hello"),
                },
            },
        )
    }

    #[tokio::test]
    async fn owner_add_then_remove_enforces_floor() {
        let state = MemoryState::new();
        let add = Event::new(Uuid::new_v4(), "alice".into(), Utc::now(), EventBody::OwnerAdd { owner: "alice".into() });
        state.validate(&add).await.unwrap();
        state.apply(&add).await.unwrap();

        let remove = Event::new(
            Uuid::new_v4(),
            "alice".into(),
            Utc::now(),
            EventBody::OwnerRemove { owner: "alice".into() },
        );
        let err = state.validate(&remove).await;
        assert!(matches!(err, Err(StrataError::Validation(_))));
    }

    #[tokio::test]
    async fn object_create_then_review_accept_transitions_to_accepted() {
        let state = MemoryState::new();
        let uuid = Uuid::new_v4();
        let create = object_create(uuid);
        let create_uuid = create.uuid;
        state.validate(&create).await.unwrap();
        state.apply(&create).await.unwrap();

        let id = VersionedId::new(uuid, 0);
        assert_eq!(state.status(EntityKind::Object, id).await.unwrap(), Status::Pending);

        let accept = Event::new(Uuid::new_v4(), "bob".into(), Utc::now(), EventBody::ReviewAccept { event_uuid: create_uuid });
        state.validate(&accept).await.unwrap();
        state.apply(&accept).await.unwrap();
        assert_eq!(state.status(EntityKind::Object, id).await.unwrap(), Status::Accepted);
    }

    #[tokio::test]
    async fn duplicate_review_of_same_event_fails() {
        let state = MemoryState::new();
        let uuid = Uuid::new_v4();
        let create = object_create(uuid);
        let create_uuid = create.uuid;
        state.validate(&create).await.unwrap();
        state.apply(&create).await.unwrap();

        let accept = Event::new(Uuid::new_v4(), "bob".into(), Utc::now(), EventBody::ReviewAccept { event_uuid: create_uuid });
        state.validate(&accept).await.unwrap();
        state.apply(&accept).await.unwrap();

        let second = Event::new(Uuid::new_v4(), "bob".into(), Utc::now(), EventBody::ReviewReject { event_uuid: create_uuid });
        assert!(state.validate(&second).await.is_err());
    }

    #[tokio::test]
    async fn schema_name_prefix_is_enforced() {
        let state = MemoryState::new();
        let event = Event::new(
            Uuid::new_v4(),
            "alice".into(),
            Utc::now(),
            EventBody::SchemaCreate {
                schema: SchemaRecord::new(Uuid::new_v4(), 0, "label".into(), 2, Digest::sha256(b"{}")),
            },
        );
        assert!(state.validate(&event).await.is_err());
    }

    #[tokio::test]
    async fn list_pages_after_cursor() {
        let state = MemoryState::new();
        let mut uuids = Vec::new();
        for _ in 0..3 {
            let uuid = Uuid::new_v4();
            let create = object_create(uuid);
            state.validate(&create).await.unwrap();
            state.apply(&create).await.unwrap();
            uuids.push(uuid);
        }

        let first_page = state.list(EntityKind::Object, None, None, 2).await.unwrap();
        assert_eq!(first_page.items.len(), 2);
        let second_page = state
            .list(EntityKind::Object, None, first_page.next_after, 2)
            .await
            .unwrap();
        assert_eq!(second_page.items.len(), 1);
    }

    #[tokio::test]
    async fn list_with_unknown_cursor_is_validation_error() {
        let state = MemoryState::new();
        let err = state.list(EntityKind::Object, None, Some(Uuid::new_v4()), 10).await;
        assert!(matches!(err, Err(StrataError::Validation(_))));
    }
}
