pub mod json;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::baseline::{GlobalBaseline, MergeLogEntry, TeamOverride};

pub use json::JsonFileStore;
pub use memory::MemoryStore;

/// Newest merge log entries a store keeps; older ones are dropped on append.
pub const DEFAULT_MERGE_LOG_CAPACITY: usize = 500;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{record} not found at {location}")]
    NotFound { record: String, location: String },
    #[error("{record} already exists at {location}")]
    AlreadyExists { record: String, location: String },
    #[error("invalid team id {0:?}")]
    InvalidTeamId(String),
    #[error("failed parsing {location}: {source}")]
    Parse {
        location: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("I/O error on {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },
    #[error("global baseline version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },
    #[error("{location} is leased by another writer")]
    Locked { location: String },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// A lost compare-and-swap or a busy writer lease clears up on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::VersionConflict { .. } | Self::Locked { .. })
    }
}

/// Durable home of the one global baseline and the per-team overrides.
///
/// `save_global` is a whole-record replace guarded by the record's `version`:
/// it fails with [`StoreError::VersionConflict`] when the persisted version no
/// longer matches the one the caller loaded, and returns the record as written
/// (version bumped by one). The check and the write are atomic with respect
/// to every other writer of the same store, in or out of process.
///
/// The merge log is append-only and bounded: stores keep the newest entries
/// and an absent log loads as empty.
#[async_trait]
pub trait BaselineStore: Send + Sync {
    async fn load_global(&self) -> Result<GlobalBaseline, StoreError>;
    async fn load_team(&self, team_id: &str) -> Result<TeamOverride, StoreError>;
    async fn save_global(&self, baseline: &GlobalBaseline) -> Result<GlobalBaseline, StoreError>;
    async fn save_team(&self, team: &TeamOverride) -> Result<(), StoreError>;
    async fn append_merge_log(&self, entry: &MergeLogEntry) -> Result<(), StoreError>;
    async fn load_merge_log(&self) -> Result<Vec<MergeLogEntry>, StoreError>;
}

pub(crate) fn validate_team_id(team_id: &str) -> Result<(), StoreError> {
    let valid = !team_id.is_empty()
        && team_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !team_id.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidTeamId(team_id.to_string()))
    }
}

pub(crate) fn check_version(expected: u64, found: Option<u64>) -> Result<(), StoreError> {
    match found {
        Some(found) if found != expected => Err(StoreError::VersionConflict { expected, found }),
        _ => Ok(()),
    }
}

pub(crate) fn push_bounded(log: &mut Vec<MergeLogEntry>, entry: MergeLogEntry, capacity: usize) {
    log.push(entry);
    let excess = log.len().saturating_sub(capacity.max(1));
    log.drain(..excess);
}
