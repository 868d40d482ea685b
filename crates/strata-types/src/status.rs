use serde::{Deserialize, Serialize};

/// Which family of versioned entity a status or identifier belongs to.
/// Determines which terminal status (`Deprecated` vs `Deleted`) applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// An object version.
    Object,
    /// A schema version.
    Schema,
    /// An annotation version.
    Annotation,
}

impl EntityKind {
    /// The terminal status this entity kind transitions to on an
    /// accepted delete/deprecate event (spec §3.4, §4.4).
    pub fn terminal_status(self) -> Status {
        match self {
            EntityKind::Schema => Status::Deprecated,
            EntityKind::Object | EntityKind::Annotation => Status::Deleted,
        }
    }
}

/// The projected status of a versioned entity. Never stored on the
/// entity itself — always derived from the event log (spec §3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Created but not yet reviewed.
    Pending,
    /// The creating/updating event was accepted.
    Accepted,
    /// The creating/updating event was rejected.
    Rejected,
    /// Terminal: an accepted deprecate event targeted this schema version.
    Deprecated,
    /// Terminal: an accepted delete event targeted this object/annotation
    /// version.
    Deleted,
}

impl Status {
    /// Terminal statuses never transition again (spec §3.6).
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Deprecated | Status::Deleted)
    }

    /// Whether a reader should treat this version as resolvable for
    /// referential-integrity purposes (spec §4.2: "non-rejected").
    pub fn is_non_rejected(self) -> bool {
        !matches!(self, Status::Rejected)
    }

    /// Parse the four lowercase path-segment names used by the listing
    /// routes (`accepted`, `pending`, `deprecated`/`deleted`, `rejected`).
    pub fn from_path_segment(segment: &str) -> Option<Self> {
        match segment {
            "pending" => Some(Status::Pending),
            "accepted" => Some(Status::Accepted),
            "rejected" => Some(Status::Rejected),
            "deprecated" => Some(Status::Deprecated),
            "deleted" => Some(Status::Deleted),
            _ => None,
        }
    }
}
