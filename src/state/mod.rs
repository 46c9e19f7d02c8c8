//! Shared State Machine
//!
//! Two concerns the whole transition pipeline reports into:
//!
//! - a sink of coded state entries describing why servers were skipped or
//!   checks failed, with codes that stay stable for operators;
//! - the failover-in-progress flag, held through an RAII scope so every
//!   exit path, early returns and panics included, releases it.
//!
//! The flag is a counter underneath: the follow-up switchover that a
//! failover may trigger nests inside the outer scope without clearing the
//! flag early.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Stable operator-facing codes for election and check outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateCode {
    /// ERR00033: no replication status could be fetched.
    NoReplicationStatus,
    /// ERR00034: fails the switchover-only eligibility layer.
    NotElectableForSwitchover,
    /// ERR00035: designated primary in a multi-primary topology.
    MultiPrimaryDesignated,
    /// ERR00036: server is a relay.
    RelayReplica,
    /// ERR00037: server is in the ignore list.
    IgnoredReplica,
    /// ERR00039: fails the general eligibility predicate.
    NotElectable,
    /// ERR00040: driver prerequisites (ping, binary logs) fail.
    PrerequisitesFailed,
    /// ERR00041: replication delay above the configured maximum.
    ReplicationDelayTooHigh,
    /// ERR00042: apply thread stopped.
    ApplyThreadStopped,
    /// ERR00043: semi-sync replica out of sync.
    SemiSyncOutOfSync,
    /// ERR00047: server under maintenance.
    UnderMaintenance,
}

impl StateCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoReplicationStatus => "ERR00033",
            Self::NotElectableForSwitchover => "ERR00034",
            Self::MultiPrimaryDesignated => "ERR00035",
            Self::RelayReplica => "ERR00036",
            Self::IgnoredReplica => "ERR00037",
            Self::NotElectable => "ERR00039",
            Self::PrerequisitesFailed => "ERR00040",
            Self::ReplicationDelayTooHigh => "ERR00041",
            Self::ApplyThreadStopped => "ERR00042",
            Self::SemiSyncOutOfSync => "ERR00043",
            Self::UnderMaintenance => "ERR00047",
        }
    }
}

/// One recorded state, kept until the monitor clears the sink.
#[derive(Debug, Clone)]
pub struct StateEntry {
    pub code: StateCode,
    /// All election states are warnings; the field exists so the control
    /// plane renders them alongside monitor-produced errors.
    pub kind: &'static str,
    pub desc: String,
    pub origin: &'static str,
}

/// Sink for coded states plus the transition-in-progress flag.
#[derive(Debug, Default)]
pub struct StateMachine {
    in_failover: AtomicUsize,
    states: Mutex<Vec<StateEntry>>,
}

impl StateMachine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record a coded warning. No deduplication: the monitor clears the
    /// sink between evaluation rounds.
    pub fn add_state(&self, code: StateCode, desc: impl Into<String>) {
        self.states.lock().push(StateEntry {
            code,
            kind: "WARNING",
            desc: desc.into(),
            origin: "CHECK",
        });
    }

    /// Snapshot of the recorded states.
    pub fn states(&self) -> Vec<StateEntry> {
        self.states.lock().clone()
    }

    pub fn has_state(&self, code: StateCode) -> bool {
        self.states.lock().iter().any(|s| s.code == code)
    }

    pub fn clear_states(&self) {
        self.states.lock().clear();
    }

    /// A transition is running; concurrent callers must no-op.
    pub fn is_in_failover(&self) -> bool {
        self.in_failover.load(Ordering::SeqCst) > 0
    }

    fn enter(&self) {
        self.in_failover.fetch_add(1, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_failover.fetch_sub(1, Ordering::SeqCst);
    }
}

/// RAII scope for the in-progress flag.
///
/// Construction marks the transition started; dropping the scope releases
/// it on every exit path. Nested scopes keep the flag raised until the
/// outermost one is gone.
#[must_use = "the failover flag clears as soon as the scope is dropped"]
pub struct FailoverScope {
    sme: Arc<StateMachine>,
}

impl FailoverScope {
    pub fn enter(sme: &Arc<StateMachine>) -> Self {
        sme.enter();
        Self { sme: sme.clone() }
    }
}

impl Drop for FailoverScope {
    fn drop(&mut self) {
        self.sme.leave();
    }
}
