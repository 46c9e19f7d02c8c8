//! Driver Error Types

use thiserror::Error;

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors surfaced by a server connection.
///
/// The orchestrator treats most of these as soft (logged, execution
/// continues); only a handful of phase-1 preconditions abort a transition.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// The server did not answer at all.
    #[error("server unreachable: {0}")]
    Unreachable(String),

    /// A statement failed on the server.
    #[error("query failed: {0}")]
    Query(String),

    /// The server carries no replication status for the named source.
    #[error("no replication status for source '{0}'")]
    NoReplicationStatus(String),

    /// A bounded wait (position wait, global-id wait, flush) expired.
    #[error("operation timed out after {0}s")]
    Timeout(u64),

    /// The server version does not support the requested operation.
    #[error("operation not supported by this server: {0}")]
    Unsupported(String),
}
