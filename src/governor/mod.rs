pub mod merge;

use std::time::Duration;

use thiserror::Error;

use crate::store::StoreError;

pub use crate::baseline::MergeLogEntry;
pub use merge::MergeGovernor;

pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("global baseline SHM {shm} is outside (0, 1]; drift cannot be evaluated")]
    DegenerateBaseline { shm: f64 },
    #[error("proposed SHM {shm} is outside [0, 1]")]
    InvalidProposal { shm: f64 },
    #[error("baseline write did not complete within {millis} ms")]
    WriteTimeout { millis: u64 },
    #[error("baseline write lost the version race {attempts} times in a row")]
    Contention { attempts: u32 },
}

impl GovernanceError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::WriteTimeout { .. } | Self::Contention { .. } => true,
            Self::Store(err) => err.is_retryable(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_not_found())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernorSettings {
    pub write_timeout: Duration,
    pub max_conflict_retries: u32,
}

impl Default for GovernorSettings {
    fn default() -> Self {
        Self {
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }
}
