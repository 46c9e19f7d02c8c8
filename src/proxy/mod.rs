//! Proxy Notification Seam
//!
//! HAProxy, MaxScale, ProxySQL and service-discovery adapters live outside
//! this crate; the orchestrators only need to tell them that the writable
//! backend moved and, later, that read backends changed. Notification
//! failures never abort a transition.

use thiserror::Error;

/// Error reported by a proxy adapter; logged and ignored by the caller.
#[derive(Debug, Clone, Error)]
#[error("proxy reconfiguration failed: {0}")]
pub struct ProxyError(pub String);

/// Callbacks into one proxy adapter.
pub trait ProxyNotifier: Send + Sync {
    /// The writable primary moved.
    fn on_failover(&self, old_primary_url: &str, new_primary_url: &str) -> Result<(), ProxyError>;

    /// Read-only backends changed (demoted primary entered the replica
    /// pool, replicas were redirected).
    fn on_backend_state_change(&self) -> Result<(), ProxyError>;
}
