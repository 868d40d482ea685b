#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **strata-types** – Shared primitive data structures for the Strata
//! dataset-versioning core.
//!
//! The crate is dependency-light and sits at the bottom of the crate graph
//! so every other Strata crate can depend on it without causing cycles. It
//! makes no assumptions about I/O, cryptography, or storage backends.

/// Identifiers and versioned references (UUID, digests, timestamps).
pub mod ids;
/// Entity records (objects, schemas, annotations, owners).
pub mod entity;
/// The closed event taxonomy and its envelope.
pub mod event;
/// Projected status of a versioned entity.
pub mod status;
/// Shared error sum type surfaced by every core component.
pub mod error;

pub use entity::{AnnotationRecord, ObjectRecord, SchemaRecord};
pub use error::{NotFoundError, StrataError, ValidationError, ValidationReason};
pub use event::{Event, EventBody};
pub use ids::{Digest, DigestAlgorithm, IntegrityToken, Timestamp, VersionedId};
pub use status::{EntityKind, Status};
