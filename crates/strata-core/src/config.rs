//! Per-installation configuration (spec §9, "Global state": a single
//! explicit record passed into the components at startup, never a
//! process-wide singleton).

use std::path::PathBuf;

use serde::Deserialize;

/// Which integrity mode an installation uses for its event log (spec
/// §4.5). Resolving this to a live [`strata_record_keeper_core::integrity::Integrity`]
/// (which needs a keystore for `Signature`) is the caller's job; this enum
/// is just the configuration-file representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityMode {
    /// `token_n = SHA-256(canonical(event_n) || token_{n-1})`.
    HashChain,
    /// Ed25519 signatures, keyed by `signing_key_path`.
    Signature,
}

fn default_integrity_mode() -> IntegrityMode {
    IntegrityMode::HashChain
}

fn default_page_size() -> usize {
    32
}

/// One installation's configuration, loaded once at startup and passed
/// explicitly into every `Dataset::open` call (spec §9).
#[derive(Debug, Clone, Deserialize)]
pub struct InstallConfig {
    /// Root directory for filesystem-backed depot/record-keeper storage.
    pub storage_root: PathBuf,
    /// Integrity mode for newly-appended events.
    #[serde(default = "default_integrity_mode")]
    pub integrity_mode: IntegrityMode,
    /// Path to an Ed25519 signing key file, required when
    /// `integrity_mode` is `signature`.
    pub signing_key_path: Option<PathBuf>,
    /// Default page size for `State::list`/`RecordKeeper::next` when the
    /// caller does not specify one (spec §6.1: "must be >= 32").
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
}

impl InstallConfig {
    /// Load configuration from a TOML file at `path`, layered under
    /// environment variables prefixed `STRATA__` (e.g.
    /// `STRATA__STORAGE_ROOT`), matching the teacher's layered
    /// file-then-environment convention.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(config::Environment::with_prefix("STRATA").separator("__"))
            .build()?;
        settings.try_deserialize()
    }
}
