//! Orchestration Configuration
//!
//! All options recognized by the transition orchestrators, configured
//! externally (file, env, CLI) by the control plane and immutable for the
//! duration of a transition. The loader itself lives outside this crate;
//! here the struct only has to deserialize and carry sane defaults.

use serde::Deserialize;
use std::path::PathBuf;

/// Options consumed by the failover/switchover orchestrators.
///
/// Field defaults favour the safe path: replication checks on, demoted
/// servers read-only, catch-up waits enabled.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Longest tolerated running write (seconds) on the primary before a
    /// switchover is refused.
    pub switch_wait_write: i64,

    /// Deadline (seconds) for the pre-switchover table flush on the
    /// primary. The flush runs on a worker and is raced against this.
    pub switch_wait_trx: i64,

    /// Wait for each replica to catch up with the old primary before
    /// redirecting it.
    pub switch_slave_wait_catch: bool,

    /// Enforce replication sanity checks (lag, apply thread, semi-sync)
    /// during candidate election.
    pub rpl_checks: bool,

    /// Maximum replication delay (seconds) a candidate may carry.
    /// `-1` disables the delay check.
    pub fail_max_delay: i64,

    /// Require semi-sync replicas to be in sync to be electable.
    pub fail_sync: bool,

    /// Allow electing a server that has no replication status at all.
    pub fail_restart_unsafe: bool,

    /// Flip scheduled events between the enabled and slaveside-disabled
    /// states on demotion/promotion.
    pub fail_event_status: bool,

    /// Toggle the event scheduler off on the demoted primary and on for
    /// the promoted one.
    pub fail_event_scheduler: bool,

    /// Force the apply-side global-id state on replicas before redirect.
    pub fail_force_gtid: bool,

    /// Attempt pseudo-identifier positional redirect for legacy replicas
    /// that have neither flavor of global-id replication.
    pub autorejoin_slave_positional_heartbeat: bool,

    /// Binlog relay server (MaxScale style) fronts the replicas.
    pub mxs_binlog_on: bool,

    /// An intermediate relay replica fans out to leaf replicas.
    pub multi_tier_slave: bool,

    /// Multi-primary topology; redirect rules change and the elected
    /// server keeps its place in the replica list.
    pub multi_master: bool,

    /// Demoted primaries and redirected replicas are left read-only.
    pub read_only: bool,

    /// Executable invoked before the transition touches any server.
    pub pre_script: String,

    /// Executable invoked once the new primary is prepared.
    pub post_script: String,

    /// URL (`host:port`) of the preferred primary. Wins switchover
    /// elections outright and triggers a follow-up switchover after a
    /// failover that landed elsewhere.
    pub pref_master: String,

    /// Propagate SSL to every replication redirect.
    pub replication_ssl: bool,

    /// `MASTER_CONNECT_RETRY` value propagated to redirects.
    pub force_slave_heartbeat_retry: i64,

    /// `MASTER_HEARTBEAT_PERIOD` value propagated to redirects.
    pub force_slave_heartbeat_time: i64,

    /// Directory receiving crash records and the cluster snapshot.
    pub working_dir: PathBuf,

    /// Configuration group name, used as the file prefix for persisted
    /// artifacts.
    pub cfg_group: String,

    /// Replication account propagated to every redirect.
    pub rpl_user: String,

    /// Replication password propagated to every redirect.
    pub rpl_pass: String,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            switch_wait_write: 10,
            switch_wait_trx: 10,
            switch_slave_wait_catch: true,
            rpl_checks: true,
            fail_max_delay: 30,
            fail_sync: false,
            fail_restart_unsafe: false,
            fail_event_status: false,
            fail_event_scheduler: false,
            fail_force_gtid: false,
            autorejoin_slave_positional_heartbeat: false,
            mxs_binlog_on: false,
            multi_tier_slave: false,
            multi_master: false,
            read_only: true,
            pre_script: String::new(),
            post_script: String::new(),
            pref_master: String::new(),
            replication_ssl: false,
            force_slave_heartbeat_retry: 10,
            force_slave_heartbeat_time: 3,
            working_dir: PathBuf::from("/var/lib/replicore"),
            cfg_group: "default".to_string(),
            rpl_user: String::new(),
            rpl_pass: String::new(),
        }
    }
}

impl FailoverConfig {
    /// A relay server sits between the primary and the replicas.
    pub fn relay_variant(&self) -> bool {
        self.mxs_binlog_on || self.multi_tier_slave
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_safe() {
        let conf = FailoverConfig::default();
        assert!(conf.rpl_checks);
        assert!(conf.read_only);
        assert!(conf.switch_slave_wait_catch);
        assert!(!conf.fail_restart_unsafe);
        assert_eq!(conf.fail_max_delay, 30);
    }

    #[test]
    fn test_relay_variant_from_either_flag() {
        let mut conf = FailoverConfig::default();
        assert!(!conf.relay_variant());
        conf.mxs_binlog_on = true;
        assert!(conf.relay_variant());
        conf.mxs_binlog_on = false;
        conf.multi_tier_slave = true;
        assert!(conf.relay_variant());
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let conf: FailoverConfig =
            serde_json::from_str(r#"{"switch_wait_trx": 5, "pref_master": "db2:3306"}"#).unwrap();
        assert_eq!(conf.switch_wait_trx, 5);
        assert_eq!(conf.pref_master, "db2:3306");
        assert!(conf.rpl_checks);
        assert_eq!(conf.switch_wait_write, 10);
    }
}
