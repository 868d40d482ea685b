//! Offline integrity repair for the "log-present, bytes-missing"
//! condition (spec §4.6): an event was durably appended and applied to
//! the projection, but its associated blob write never completed (crash,
//! disk full, depot outage).
//!
//! Deliberately stateless: rather than track in-flight writes in memory
//! (which would not survive a process restart and would violate the "no
//! process-wide singletons" design note, spec §9), a missing blob is
//! discovered by re-scanning the log and checking the depot for each
//! create/update event's blob. This is safe to run at any time, including
//! concurrently with normal traffic, since it only reads.

use strata_depot_core::Depot;
use strata_record_keeper_core::RecordKeeper;
use strata_types::error::{NotFoundError, StrataError};
use strata_types::event::EventBody;
use strata_types::ids::{Digest, VersionedId};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::dataset::Dataset;

/// A create/update event whose recorded blob is missing from the depot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingBlob {
    /// The event that introduced this version.
    pub event_uuid: Uuid,
    /// The versioned identifier whose bytes are missing.
    pub id: VersionedId,
    /// The digest the missing bytes must hash to.
    pub digest: Digest,
}

fn blob_identifier(body: &EventBody) -> Option<(VersionedId, Digest)> {
    match body {
        EventBody::ObjectCreate { object } | EventBody::ObjectUpdate { object } => {
            Some((VersionedId::new(object.uuid, object.version), object.digest.clone()))
        }
        EventBody::SchemaCreate { schema } | EventBody::SchemaUpdate { schema } => {
            Some((VersionedId::new(schema.uuid, schema.version), schema.digest.clone()))
        }
        EventBody::AnnotationCreate { annotation } | EventBody::AnnotationUpdate { annotation } => {
            Some((VersionedId::new(annotation.uuid, annotation.version), annotation.digest.clone()))
        }
        _ => None,
    }
}

/// Scan the full log for create/update events whose blob is absent from
/// the depot. `page_size` bounds how many events are held in memory at
/// once while paging through the log.
#[instrument(skip(dataset), fields(dataset = %dataset.name()))]
pub async fn find_missing_blobs(dataset: &Dataset, page_size: usize) -> Result<Vec<MissingBlob>, StrataError> {
    let mut missing = Vec::new();
    let mut after = None;
    loop {
        let page = dataset.record_keeper().next(after, page_size).await?;
        if page.is_empty() {
            break;
        }
        after = page.last().map(|stored| stored.event.uuid);

        for stored in &page {
            let Some((id, digest)) = blob_identifier(&stored.event.body) else {
                continue;
            };
            if !dataset.depot().exists(id).await? {
                warn!(event = %stored.event.uuid, %id, "blob missing for logged event");
                missing.push(MissingBlob { event_uuid: stored.event.uuid, id, digest });
            }
        }

        if page.len() < page_size {
            break;
        }
    }
    Ok(missing)
}

/// Supply the missing bytes for a previously-logged create/update event,
/// writing them to the depot under the event's recorded identifier and
/// digest. Does not touch the log or the projection — both already
/// reflect the event; this only fills in the one thing that did not
/// survive.
#[instrument(skip(dataset, bytes), fields(dataset = %dataset.name(), %event_uuid))]
pub async fn repair_missing_blob(dataset: &Dataset, event_uuid: Uuid, bytes: &[u8]) -> Result<(), StrataError> {
    let stored = dataset
        .record_keeper()
        .by_uuid(event_uuid)
        .await?
        .ok_or_else(|| NotFoundError::event(event_uuid))?;
    let (id, digest) = blob_identifier(&stored.event.body)
        .ok_or_else(|| NotFoundError::event(event_uuid))?;
    dataset.depot().write(id, bytes, &digest).await?;
    info!(%id, "repaired missing blob");
    Ok(())
}
