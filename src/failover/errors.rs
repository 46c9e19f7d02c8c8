//! Transition Error Types
//!
//! The orchestrators answer with a single boolean; these errors cover the
//! persisted artifacts and the side channels around them.

use thiserror::Error;

/// Crash-record persistence failure. Logged, never fatal to a transition.
#[derive(Debug, Error)]
pub enum CrashError {
    #[error("could not serialize crash record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("could not write crash record: {0}")]
    Io(#[from] std::io::Error),
}

/// Hook script could not be spawned. A script that runs and exits
/// non-zero is not an error, only a logged outcome.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("could not run hook script: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Ring closure could not locate its endpoints.
#[derive(Debug, Error)]
pub enum RingError {
    #[error("cannot find the ring child of {0}")]
    ChildNotFound(String),

    #[error("cannot find the ring parent of {0}")]
    ParentNotFound(String),
}
