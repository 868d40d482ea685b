use crate::status::EntityKind;
use uuid::Uuid;

/// Machine-readable reason codes for [`ValidationError`] (spec §4.2, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationReason {
    /// `OwnerAdd` on a user already in the owner set.
    #[error("owner already present")]
    OwnerAlreadyExists,
    /// `OwnerRemove` on a user not in the owner set.
    #[error("owner not found")]
    OwnerNotFound,
    /// `OwnerRemove` would empty the owner set (I7/P8).
    #[error("last-owner")]
    LastOwner,
    /// A create event reused a UUID already in use.
    #[error("uuid already in use")]
    UuidInUse,
    /// An update/delete event's version did not match `max_version`/exists.
    #[error("version mismatch")]
    VersionMismatch,
    /// Target entity is already in a terminal status.
    #[error("entity already in a terminal state")]
    TerminalState,
    /// Declared digest did not match the decoded bytes (P1).
    #[error("digest")]
    DigestMismatch,
    /// Schema name missing the required `schema-` prefix.
    #[error("schema name must start with 'schema-'")]
    SchemaNamePrefix,
    /// Schema name already used by a non-deprecated schema (I5/P5).
    #[error("schema name already taken")]
    SchemaNameTaken,
    /// Schema bytes did not parse as a JSON Schema document.
    #[error("schema")]
    SchemaInvalid,
    /// Annotation's schema reference did not resolve.
    #[error("schema reference did not resolve")]
    SchemaRefUnresolved,
    /// Annotation's object reference did not resolve.
    #[error("object reference did not resolve")]
    ObjectRefUnresolved,
    /// Annotation bytes failed validation against the referenced schema.
    #[error("schema")]
    AnnotationSchemaInvalid,
    /// `SchemaDeprecate` targeting an already-deprecated version.
    #[error("already deprecated")]
    AlreadyDeprecated,
    /// `ReviewAccept`/`ReviewReject` target event does not exist.
    #[error("review target not found")]
    ReviewTargetNotFound,
    /// `ReviewAccept`/`ReviewReject` target is itself a review event.
    #[error("review target is a review event")]
    ReviewTargetIsReview,
    /// `ReviewAccept`/`ReviewReject` target is no longer pending review (I8/P7).
    #[error("review target is not pending review")]
    ReviewTargetNotPending,
    /// `after` pagination cursor referenced an unknown event UUID.
    #[error("unknown pagination cursor")]
    UnknownCursor,
}

/// An invariant or precondition violation raised by `State::validate`
/// (spec §4.2). Carries a machine-readable `reason` and a human-readable
/// `detail` for logs/responses.
#[derive(Debug, Clone, thiserror::Error)]
#[error("validation failed: {reason} ({detail})")]
pub struct ValidationError {
    /// Machine-readable reason code.
    pub reason: ValidationReason,
    /// Human-readable detail, safe to surface to callers verbatim.
    pub detail: String,
}

impl ValidationError {
    /// Construct a validation error with an explicit detail message.
    pub fn new(reason: ValidationReason, detail: impl Into<String>) -> Self {
        Self { reason, detail: detail.into() }
    }

    /// Construct a validation error using the reason's default message.
    pub fn simple(reason: ValidationReason) -> Self {
        let detail = reason.to_string();
        Self { reason, detail }
    }
}

/// A lookup miss against an entity/event/dataset identifier.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} not found: {id}")]
pub struct NotFoundError {
    /// What kind of thing was looked up (`"event"`, `"dataset"`, or an
    /// [`EntityKind`]'s lowercase name).
    pub kind: String,
    /// The identifier that did not resolve.
    pub id: String,
}

impl NotFoundError {
    /// A versioned-entity lookup miss.
    pub fn entity(kind: EntityKind, uuid: Uuid, version: u32) -> Self {
        Self { kind: format!("{:?}", kind).to_lowercase(), id: format!("{uuid}@{version}") }
    }

    /// An event lookup miss.
    pub fn event(uuid: Uuid) -> Self {
        Self { kind: "event".to_string(), id: uuid.to_string() }
    }

    /// A dataset lookup miss.
    pub fn dataset(name: impl Into<String>) -> Self {
        Self { kind: "dataset".to_string(), id: name.into() }
    }
}

/// Fatal at-rest integrity failure: a hash/digest/chain mismatch or a
/// signature failure (spec §7). Never causes process exit; logged with
/// full context and counted by the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IntegrityError {
    /// Stored bytes did not hash to the digest recorded on the entity.
    #[error("digest mismatch for {0}: expected {expected}, got {actual}", expected = .1, actual = .2)]
    DigestMismatch(String, String, String),
    /// The hash chain diverged starting at the given sequence number.
    #[error("hash chain diverged at sequence {0}")]
    ChainBroken(u64),
    /// An Ed25519 signature failed to verify.
    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),
    /// Bytes required to satisfy a read were missing from the depot
    /// ("log-present, bytes-missing", spec §4.6).
    #[error("bytes missing for {0}")]
    BytesMissing(String),
}

/// The single error sum type surfaced by every core component (spec §7).
/// `Unauthorized`/`Forbidden` are deliberately absent: they are supplied
/// by the HTTP layer, never raised inside the core.
#[derive(Debug, thiserror::Error)]
pub enum StrataError {
    /// See [`ValidationError`].
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// See [`IntegrityError`].
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    /// See [`NotFoundError`].
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    /// A concurrent write lost the race; the caller may retry.
    #[error("conflict: {0}")]
    Conflict(String),
    /// A storage backend I/O failure, after any idempotent retry.
    #[error("storage I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StrataError {
    fn from(err: std::io::Error) -> Self {
        StrataError::Io(err.to_string())
    }
}

/// Retry a fallible, idempotent synchronous I/O operation once before
/// giving up (spec §7: "a single retry for idempotent `IoError`s at the
/// backend boundary"). `op` runs again only if the first attempt fails.
pub fn retry_sync<T, E>(mut op: impl FnMut() -> Result<T, E>) -> Result<T, E> {
    match op() {
        Ok(value) => Ok(value),
        Err(_) => op(),
    }
}

/// Async counterpart of [`retry_sync`] for backend calls that return a
/// future (filesystem, relational store).
pub async fn retry_io<T, E, F, Fut>(mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(_) => op().await,
    }
}
