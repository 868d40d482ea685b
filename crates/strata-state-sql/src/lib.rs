#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **strata-state-sql** – Relational `State` backend.
//!
//! Implements spec.md §6.3's "Relational state" contract: tables for
//! entities, versions, statuses, the schema-name index, owners,
//! annotation-object links, and per-event review status, with every
//! mutation's SQL writes occurring in a single transaction. Reads
//! (`validate`, `status`, `list`, `resolve_schema`, `owners`) are served
//! from an in-memory [`strata_state::projection::Projection`] kept in
//! lock-step with the tables, so `strata-state`'s validation rules are
//! reused rather than re-derived in SQL — mirroring the teacher's
//! `toka-store-sqlite`, which durably persists a projection that is also
//! queried directly by SQL for its own counters.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use strata_state::entity_table::EntityTable;
use strata_state::projection::{EventMeta, EventTarget, Projection, ReviewState};
use strata_state::validate::validate_body;
use strata_state::{ListPage, State};
use strata_types::entity::{AnnotationRecord, ObjectRecord, SchemaRecord};
use strata_types::error::{retry_io, NotFoundError, StrataError, ValidationError, ValidationReason};
use strata_types::event::{Event, EventBody};
use strata_types::ids::VersionedId;
use strata_types::status::{EntityKind, Status};
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

fn kind_str(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Object => "object",
        EntityKind::Schema => "schema",
        EntityKind::Annotation => "annotation",
    }
}

fn kind_from_str(s: &str) -> Result<EntityKind, StrataError> {
    match s {
        "object" => Ok(EntityKind::Object),
        "schema" => Ok(EntityKind::Schema),
        "annotation" => Ok(EntityKind::Annotation),
        other => Err(StrataError::Io(format!("unknown entity kind {other}"))),
    }
}

fn status_str(status: Status) -> &'static str {
    match status {
        Status::Pending => "pending",
        Status::Accepted => "accepted",
        Status::Rejected => "rejected",
        Status::Deprecated => "deprecated",
        Status::Deleted => "deleted",
    }
}

fn status_from_str(s: &str) -> Result<Status, StrataError> {
    match s {
        "pending" => Ok(Status::Pending),
        "accepted" => Ok(Status::Accepted),
        "rejected" => Ok(Status::Rejected),
        "deprecated" => Ok(Status::Deprecated),
        "deleted" => Ok(Status::Deleted),
        other => Err(StrataError::Io(format!("unknown status {other}"))),
    }
}

fn review_state_str(state: ReviewState) -> &'static str {
    match state {
        ReviewState::NotReviewable => "not_reviewable",
        ReviewState::Pending => "pending",
        ReviewState::Accepted => "accepted",
        ReviewState::Rejected => "rejected",
    }
}

fn review_state_from_str(s: &str) -> Result<ReviewState, StrataError> {
    match s {
        "not_reviewable" => Ok(ReviewState::NotReviewable),
        "pending" => Ok(ReviewState::Pending),
        "accepted" => Ok(ReviewState::Accepted),
        "rejected" => Ok(ReviewState::Rejected),
        other => Err(StrataError::Io(format!("unknown review state {other}"))),
    }
}

/// SQLite-backed, durable and queryable `State`.
pub struct SqlState {
    pool: SqlitePool,
    projection: RwLock<Projection>,
}

impl SqlState {
    /// Open or create a SQLite-backed state store at `path`, running
    /// migrations and reconstructing the in-memory projection from
    /// whatever is already on disk.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StrataError> {
        let url = format!("sqlite://{}?mode=rwc", path.as_ref().display());
        let pool = retry_io(|| SqlitePool::connect(&url)).await.map_err(|e| StrataError::Io(e.to_string()))?;
        Self::from_pool(pool).await
    }

    /// Open an in-memory instance (tests).
    pub async fn in_memory() -> Result<Self, StrataError> {
        let pool =
            retry_io(|| SqlitePool::connect("sqlite::memory:")).await.map_err(|e| StrataError::Io(e.to_string()))?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self, StrataError> {
        retry_io(|| Self::migrate(&pool)).await?;
        let projection = retry_io(|| Self::reconstruct(&pool)).await?;
        Ok(Self { pool, projection: RwLock::new(projection) })
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), StrataError> {
        sqlx::query("CREATE TABLE IF NOT EXISTS owners (owner TEXT PRIMARY KEY) STRICT")
            .execute(pool)
            .await
            .map_err(|e| StrataError::Io(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entity_order (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                uuid BLOB NOT NULL,
                UNIQUE (kind, uuid)
            ) STRICT
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| StrataError::Io(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS versions (
                kind TEXT NOT NULL,
                uuid BLOB NOT NULL,
                version INTEGER NOT NULL,
                status TEXT NOT NULL,
                payload BLOB NOT NULL,
                PRIMARY KEY (kind, uuid, version)
            ) STRICT
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| StrataError::Io(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_names (name TEXT PRIMARY KEY, uuid BLOB NOT NULL) STRICT",
        )
        .execute(pool)
        .await
        .map_err(|e| StrataError::Io(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS annotation_object_links (
                annotation_uuid BLOB NOT NULL,
                annotation_version INTEGER NOT NULL,
                object_uuid BLOB NOT NULL,
                object_version INTEGER NOT NULL,
                PRIMARY KEY (annotation_uuid, annotation_version, object_uuid, object_version)
            ) STRICT
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| StrataError::Io(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS event_review (
                event_uuid BLOB PRIMARY KEY,
                is_review INTEGER NOT NULL,
                target_mode TEXT NOT NULL,
                target_kind TEXT,
                target_uuid BLOB,
                target_version INTEGER,
                review_state TEXT NOT NULL
            ) STRICT
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| StrataError::Io(e.to_string()))?;

        Ok(())
    }

    async fn reconstruct(pool: &SqlitePool) -> Result<Projection, StrataError> {
        let mut projection = Projection::default();

        let owner_rows = sqlx::query("SELECT owner FROM owners")
            .fetch_all(pool)
            .await
            .map_err(|e| StrataError::Io(e.to_string()))?;
        projection.owners = owner_rows.iter().map(|r| r.get::<String, _>("owner")).collect();

        for kind in [EntityKind::Object, EntityKind::Schema, EntityKind::Annotation] {
            let order_rows = sqlx::query("SELECT uuid FROM entity_order WHERE kind = ? ORDER BY id ASC")
                .bind(kind_str(kind))
                .fetch_all(pool)
                .await
                .map_err(|e| StrataError::Io(e.to_string()))?;

            for row in order_rows {
                let uuid_bytes: Vec<u8> = row.get("uuid");
                let uuid = Uuid::from_slice(&uuid_bytes).map_err(|e| StrataError::Io(e.to_string()))?;

                let version_rows = sqlx::query(
                    "SELECT version, status, payload FROM versions WHERE kind = ? AND uuid = ? ORDER BY version ASC",
                )
                .bind(kind_str(kind))
                .bind(uuid_bytes.clone())
                .fetch_all(pool)
                .await
                .map_err(|e| StrataError::Io(e.to_string()))?;

                for vrow in version_rows {
                    let version: i64 = vrow.get("version");
                    let status = status_from_str(&vrow.get::<String, _>("status"))?;
                    let payload: Vec<u8> = vrow.get("payload");
                    insert_and_set_status(&mut projection, kind, uuid, version as u32, status, &payload)?;
                }
            }
        }

        let name_rows = sqlx::query("SELECT name, uuid FROM schema_names")
            .fetch_all(pool)
            .await
            .map_err(|e| StrataError::Io(e.to_string()))?;
        for row in name_rows {
            let name: String = row.get("name");
            let uuid_bytes: Vec<u8> = row.get("uuid");
            let uuid = Uuid::from_slice(&uuid_bytes).map_err(|e| StrataError::Io(e.to_string()))?;
            projection.schema_names.insert(name, uuid);
        }

        let event_rows = sqlx::query(
            "SELECT event_uuid, is_review, target_mode, target_kind, target_uuid, target_version, review_state FROM event_review",
        )
        .fetch_all(pool)
        .await
        .map_err(|e| StrataError::Io(e.to_string()))?;
        for row in event_rows {
            let event_uuid_bytes: Vec<u8> = row.get("event_uuid");
            let event_uuid = Uuid::from_slice(&event_uuid_bytes).map_err(|e| StrataError::Io(e.to_string()))?;
            let is_review: i64 = row.get("is_review");
            let review = review_state_from_str(&row.get::<String, _>("review_state"))?;
            let target_mode: String = row.get("target_mode");
            let target = match target_mode.as_str() {
                "none" => EventTarget::None,
                "created" | "terminal" => {
                    let target_kind = kind_from_str(&row.get::<String, _>("target_kind"))?;
                    let target_uuid_bytes: Vec<u8> = row.get("target_uuid");
                    let target_uuid =
                        Uuid::from_slice(&target_uuid_bytes).map_err(|e| StrataError::Io(e.to_string()))?;
                    let target_version: i64 = row.get("target_version");
                    let id = VersionedId::new(target_uuid, target_version as u32);
                    if target_mode == "created" {
                        EventTarget::Created { kind: target_kind, id }
                    } else {
                        EventTarget::Terminal { kind: target_kind, id }
                    }
                }
                other => return Err(StrataError::Io(format!("unknown target mode {other}"))),
            };
            projection.events.insert(event_uuid, EventMeta { target, is_review: is_review != 0, review });
        }

        Ok(projection)
    }

    async fn persist_event(&self, tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, event: &Event) -> Result<(), StrataError> {
        match &event.body {
            EventBody::OwnerAdd { owner } => {
                sqlx::query("INSERT OR IGNORE INTO owners (owner) VALUES (?)")
                    .bind(owner)
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| StrataError::Io(e.to_string()))?;
                self.persist_event_review(tx, event.uuid, EventTarget::None, false, ReviewState::NotReviewable).await?;
            }
            EventBody::OwnerRemove { owner } => {
                sqlx::query("DELETE FROM owners WHERE owner = ?")
                    .bind(owner)
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| StrataError::Io(e.to_string()))?;
                self.persist_event_review(tx, event.uuid, EventTarget::None, false, ReviewState::NotReviewable).await?;
            }
            EventBody::ObjectCreate { object } | EventBody::ObjectUpdate { object } => {
                let id = VersionedId::new(object.uuid, object.version);
                self.persist_version(tx, EntityKind::Object, id, Status::Pending, object).await?;
                self.persist_event_review(
                    tx,
                    event.uuid,
                    EventTarget::Created { kind: EntityKind::Object, id },
                    false,
                    ReviewState::Pending,
                )
                .await?;
            }
            EventBody::ObjectDelete { object_identifier } => {
                self.persist_event_review(
                    tx,
                    event.uuid,
                    EventTarget::Terminal { kind: EntityKind::Object, id: *object_identifier },
                    false,
                    ReviewState::Pending,
                )
                .await?;
            }
            EventBody::SchemaCreate { schema } | EventBody::SchemaUpdate { schema } => {
                let id = VersionedId::new(schema.uuid, schema.version);
                self.persist_version(tx, EntityKind::Schema, id, Status::Pending, schema).await?;
                sqlx::query("INSERT OR REPLACE INTO schema_names (name, uuid) VALUES (?, ?)")
                    .bind(&schema.name)
                    .bind(schema.uuid.as_bytes().to_vec())
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| StrataError::Io(e.to_string()))?;
                self.persist_event_review(
                    tx,
                    event.uuid,
                    EventTarget::Created { kind: EntityKind::Schema, id },
                    false,
                    ReviewState::Pending,
                )
                .await?;
            }
            EventBody::SchemaDeprecate { schema_identifier } => {
                self.persist_event_review(
                    tx,
                    event.uuid,
                    EventTarget::Terminal { kind: EntityKind::Schema, id: *schema_identifier },
                    false,
                    ReviewState::Pending,
                )
                .await?;
            }
            EventBody::AnnotationCreate { annotation } | EventBody::AnnotationUpdate { annotation } => {
                let id = VersionedId::new(annotation.uuid, annotation.version);
                self.persist_version(tx, EntityKind::Annotation, id, Status::Pending, annotation).await?;
                for object_ref in &annotation.object_identifiers {
                    sqlx::query(
                        r#"
                        INSERT OR IGNORE INTO annotation_object_links
                            (annotation_uuid, annotation_version, object_uuid, object_version)
                        VALUES (?, ?, ?, ?)
                        "#,
                    )
                    .bind(annotation.uuid.as_bytes().to_vec())
                    .bind(annotation.version as i64)
                    .bind(object_ref.uuid.as_bytes().to_vec())
                    .bind(object_ref.version as i64)
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| StrataError::Io(e.to_string()))?;
                }
                self.persist_event_review(
                    tx,
                    event.uuid,
                    EventTarget::Created { kind: EntityKind::Annotation, id },
                    false,
                    ReviewState::Pending,
                )
                .await?;
            }
            EventBody::AnnotationDelete { annotation_identifier } => {
                self.persist_event_review(
                    tx,
                    event.uuid,
                    EventTarget::Terminal { kind: EntityKind::Annotation, id: *annotation_identifier },
                    false,
                    ReviewState::Pending,
                )
                .await?;
            }
            EventBody::ReviewAccept { event_uuid } => self.persist_review_outcome(tx, *event_uuid, true).await?,
            EventBody::ReviewReject { event_uuid } => self.persist_review_outcome(tx, *event_uuid, false).await?,
        }
        Ok(())
    }

    async fn persist_version<R: serde::Serialize>(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        kind: EntityKind,
        id: VersionedId,
        status: Status,
        record: &R,
    ) -> Result<(), StrataError> {
        sqlx::query("INSERT OR IGNORE INTO entity_order (kind, uuid) VALUES (?, ?)")
            .bind(kind_str(kind))
            .bind(id.uuid.as_bytes().to_vec())
            .execute(&mut **tx)
            .await
            .map_err(|e| StrataError::Io(e.to_string()))?;

        let payload = serde_json::to_vec(record).map_err(|e| StrataError::Io(e.to_string()))?;
        sqlx::query(
            "INSERT INTO versions (kind, uuid, version, status, payload) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(kind_str(kind))
        .bind(id.uuid.as_bytes().to_vec())
        .bind(id.version as i64)
        .bind(status_str(status))
        .bind(payload)
        .execute(&mut **tx)
        .await
        .map_err(|e| StrataError::Io(e.to_string()))?;
        Ok(())
    }

    async fn persist_event_review(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        event_uuid: Uuid,
        target: EventTarget,
        is_review: bool,
        review: ReviewState,
    ) -> Result<(), StrataError> {
        let (target_mode, target_kind, target_uuid, target_version): (&str, Option<&str>, Option<Vec<u8>>, Option<i64>) =
            match target {
                EventTarget::None => ("none", None, None, None),
                EventTarget::Created { kind, id } => {
                    ("created", Some(kind_str(kind)), Some(id.uuid.as_bytes().to_vec()), Some(id.version as i64))
                }
                EventTarget::Terminal { kind, id } => {
                    ("terminal", Some(kind_str(kind)), Some(id.uuid.as_bytes().to_vec()), Some(id.version as i64))
                }
            };

        sqlx::query(
            r#"
            INSERT INTO event_review
                (event_uuid, is_review, target_mode, target_kind, target_uuid, target_version, review_state)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event_uuid.as_bytes().to_vec())
        .bind(is_review as i64)
        .bind(target_mode)
        .bind(target_kind)
        .bind(target_uuid)
        .bind(target_version)
        .bind(review_state_str(review))
        .execute(&mut **tx)
        .await
        .map_err(|e| StrataError::Io(e.to_string()))?;
        Ok(())
    }

    async fn persist_review_outcome(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        target_uuid: Uuid,
        accept: bool,
    ) -> Result<(), StrataError> {
        let row = sqlx::query(
            "SELECT target_mode, target_kind, target_uuid, target_version FROM event_review WHERE event_uuid = ?",
        )
        .bind(target_uuid.as_bytes().to_vec())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| StrataError::Io(e.to_string()))?;

        let review_state = if accept { ReviewState::Accepted } else { ReviewState::Rejected };
        sqlx::query("UPDATE event_review SET review_state = ? WHERE event_uuid = ?")
            .bind(review_state_str(review_state))
            .bind(target_uuid.as_bytes().to_vec())
            .execute(&mut **tx)
            .await
            .map_err(|e| StrataError::Io(e.to_string()))?;

        let Some(row) = row else { return Ok(()) };
        let target_mode: String = row.get("target_mode");
        if target_mode == "none" {
            return Ok(());
        }
        let target_kind = kind_from_str(&row.get::<String, _>("target_kind"))?;
        let target_uuid_bytes: Vec<u8> = row.get("target_uuid");
        let uuid = Uuid::from_slice(&target_uuid_bytes).map_err(|e| StrataError::Io(e.to_string()))?;
        let version: i64 = row.get("target_version");

        let new_status = match (target_mode.as_str(), accept) {
            ("created", true) => Some(Status::Accepted),
            ("created", false) => Some(Status::Rejected),
            ("terminal", true) => Some(target_kind.terminal_status()),
            ("terminal", false) => None,
            _ => None,
        };
        if let Some(status) = new_status {
            sqlx::query("UPDATE versions SET status = ? WHERE kind = ? AND uuid = ? AND version = ?")
                .bind(status_str(status))
                .bind(kind_str(target_kind))
                .bind(uuid.as_bytes().to_vec())
                .bind(version)
                .execute(&mut **tx)
                .await
                .map_err(|e| StrataError::Io(e.to_string()))?;
        }
        Ok(())
    }

    /// One attempt at persisting `event`'s tables and committing. Failing
    /// midway leaves nothing committed, so retrying from scratch is safe.
    async fn apply_once(&self, event: &Event) -> Result<(), StrataError> {
        let mut tx = self.pool.begin().await.map_err(|e| StrataError::Io(e.to_string()))?;
        self.persist_event(&mut tx, event).await?;
        tx.commit().await.map_err(|e| StrataError::Io(e.to_string()))?;
        Ok(())
    }
}

fn insert_and_set_status(
    projection: &mut Projection,
    kind: EntityKind,
    uuid: Uuid,
    version: u32,
    status: Status,
    payload: &[u8],
) -> Result<(), StrataError> {
    match kind {
        EntityKind::Object => {
            let record: ObjectRecord = serde_json::from_slice(payload).map_err(|e| StrataError::Io(e.to_string()))?;
            insert_version_table(&mut projection.objects, uuid, version, status, record);
        }
        EntityKind::Schema => {
            let record: SchemaRecord = serde_json::from_slice(payload).map_err(|e| StrataError::Io(e.to_string()))?;
            insert_version_table(&mut projection.schemas, uuid, version, status, record);
        }
        EntityKind::Annotation => {
            let record: AnnotationRecord =
                serde_json::from_slice(payload).map_err(|e| StrataError::Io(e.to_string()))?;
            insert_version_table(&mut projection.annotations, uuid, version, status, record);
        }
    }
    Ok(())
}

fn insert_version_table<R>(table: &mut EntityTable<R>, uuid: Uuid, version: u32, status: Status, record: R) {
    table.insert_version(uuid, record);
    table.set_status(uuid, version, status);
}

#[async_trait]
impl State for SqlState {
    #[instrument(skip(self, event), fields(kind = event.body.kind_tag()))]
    async fn validate(&self, event: &Event) -> Result<(), StrataError> {
        let projection = self.projection.read().await;
        validate_body(&projection, &event.body)?;
        Ok(())
    }

    #[instrument(skip(self, event), fields(kind = event.body.kind_tag()))]
    async fn apply(&self, event: &Event) -> Result<(), StrataError> {
        retry_io(|| self.apply_once(event)).await?;

        let mut projection = self.projection.write().await;
        projection.apply(event);
        debug!("applied event to sql-backed projection");
        Ok(())
    }

    async fn status(&self, kind: EntityKind, id: VersionedId) -> Result<Status, StrataError> {
        let projection = self.projection.read().await;
        projection.status_of(kind, id).ok_or_else(|| NotFoundError::entity(kind, id.uuid, id.version).into())
    }

    async fn list(
        &self,
        kind: EntityKind,
        status: Option<Status>,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<ListPage, StrataError> {
        let projection = self.projection.read().await;
        let table_page = match kind {
            EntityKind::Object => projection.objects.page_after(after, limit),
            EntityKind::Schema => projection.schemas.page_after(after, limit),
            EntityKind::Annotation => projection.annotations.page_after(after, limit),
        };
        let page = table_page.ok_or_else(|| {
            StrataError::Validation(ValidationError::new(
                ValidationReason::UnknownCursor,
                format!("no {kind:?} with uuid {after:?}"),
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
        Ok(ListPage { items, next_after })
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
