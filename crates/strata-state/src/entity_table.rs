use std::collections::{BTreeMap, HashMap};

use strata_types::status::Status;
use uuid::Uuid;

/// One version slot within an [`EntityTable`].
#[derive(Debug, Clone)]
pub struct VersionSlot<R> {
    /// The versioned record itself.
    pub record: R,
    /// Projected status (spec §3.4).
    pub status: Status,
}

/// One entity's dense, 0-indexed version history (I4).
#[derive(Debug, Clone, Default)]
pub struct EntityHistory<R> {
    /// `versions[v]` is version `v`; always contiguous from 0.
    pub versions: Vec<VersionSlot<R>>,
}

impl<R> EntityHistory<R> {
    /// Highest version present.
    pub fn max_version(&self) -> u32 {
        self.versions.len() as u32 - 1
    }
}

/// A table of versioned entities of one kind (objects, schemas, or
/// annotations), keyed by UUID, with insertion-order bookkeeping so
/// `State::list` can page by an opaque UUID cursor.
#[derive(Debug, Clone, Default)]
pub struct EntityTable<R> {
    by_uuid: HashMap<Uuid, EntityHistory<R>>,
    order: BTreeMap<u64, Uuid>,
    seq_of: HashMap<Uuid, u64>,
    next_seq: u64,
}

impl<R> EntityTable<R> {
    /// Look up an entity's full version history.
    pub fn get(&self, uuid: Uuid) -> Option<&EntityHistory<R>> {
        self.by_uuid.get(&uuid)
    }

    /// Whether any version of `uuid` has ever been created.
    pub fn contains(&self, uuid: Uuid) -> bool {
        self.by_uuid.contains_key(&uuid)
    }

    /// Insert a newly created version `record` for `uuid`, assigning it
    /// `Status::Pending`. Caller must have already validated that `uuid`
    /// is either unused (for version 0) or that this is exactly
    /// `max_version + 1`.
    pub fn insert_version(&mut self, uuid: Uuid, record: R) {
        let history = self.by_uuid.entry(uuid).or_insert_with(|| {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.order.insert(seq, uuid);
            self.seq_of.insert(uuid, seq);
            EntityHistory::default()
        });
        history.versions.push(VersionSlot { record, status: Status::Pending });
    }

    /// Mutate the status of one existing version.
    pub fn set_status(&mut self, uuid: Uuid, version: u32, status: Status) {
        if let Some(history) = self.by_uuid.get_mut(&uuid) {
            if let Some(slot) = history.versions.get_mut(version as usize) {
                slot.status = status;
            }
        }
    }

    /// Page through entities in insertion order, strictly after the
    /// sequence position of `after` if given. Yields `(uuid, history)`
    /// pairs.
    pub fn page_after(&self, after: Option<Uuid>, limit: usize) -> Option<Vec<(Uuid, &EntityHistory<R>)>> {
        let start_seq = match after {
            None => 0,
            Some(uuid) => match self.seq_of.get(&uuid) {
                Some(seq) => seq + 1,
                None => return None,
            },
        };
        Some(
            self.order
                .range(start_seq..)
                .take(limit)
                .map(|(_, uuid)| (*uuid, self.by_uuid.get(uuid).expect("order/by_uuid desync")))
                .collect(),
        )
    }

    /// Total number of distinct entity UUIDs (not versions).
    pub fn entity_count(&self) -> usize {
        self.by_uuid.len()
    }
}
