#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **strata-core** – Top-level orchestration for Strata.
//!
//! Ties the three capability abstractions (`RecordKeeper`, `Depot`,
//! `State`, each defined in their own `strata-*-core` crate) together
//! behind [`Dataset`], the per-dataset write-serialized mutation pipeline
//! (spec §4.3, §5). Also home to [`config::InstallConfig`] (installation
//! setup, no process-wide singleton — spec §9) and [`repair`] (offline
//! recovery from "log-present, bytes-missing", spec §4.6).
//!
//! # Example
//!
//! ```no_run
//! # async fn run() -> Result<(), strata_types::error::StrataError> {
//! use std::sync::Arc;
//! use strata_core::Dataset;
//! use strata_depot_fs::FsDepot;
//! use strata_record_keeper_core::integrity::Integrity;
//! use strata_record_keeper_sled::SledRecordKeeper;
//! use strata_state::MemoryState;
//!
//! let record_keeper = SledRecordKeeper::open("./data/log", Integrity::HashChain)?;
//! let depot = FsDepot::open("./data/blobs").await?;
//! let state = MemoryState::new();
//! let dataset = Dataset::new("photos", Arc::new(record_keeper), Arc::new(depot), Arc::new(state), Integrity::HashChain);
//!
//! dataset.add_owner("alice", "alice").await?;
//! let object_id = dataset.create_object("alice", "cat.png", "image/png", b"...").await?;
//! println!("created {object_id}, pending review");
//! # Ok(())
//! # }
//! ```

/// Per-installation configuration, loaded once and passed explicitly
/// into `Dataset`-constructing code (spec §9, "Global state").
pub mod config;
/// [`Dataset`]: the orchestrator tying `RecordKeeper`/`Depot`/`State`
/// together behind a per-dataset write lock.
pub mod dataset;
/// Offline repair of "log-present, bytes-missing" gaps (spec §4.6).
pub mod repair;

pub use dataset::Dataset;
