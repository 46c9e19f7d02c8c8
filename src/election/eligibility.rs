//! Eligibility Predicates
//!
//! Whether one replica may be elected. Every refusal feeds a coded state
//! into the shared sink; with `forcing_log` the refusal is also narrated
//! at warn level (elections force it, background monitoring does not).

use tracing::{debug, warn};

use crate::cluster::Cluster;
use crate::state::StateCode;
use crate::topology::ServerRole;

impl Cluster {
    /// General eligibility: replication status readable, driver
    /// prerequisites met, not in maintenance, and under `rpl_checks` the
    /// lag, apply thread and semi-sync conditions hold.
    pub fn is_slave_electable(&self, idx: usize, forcing_log: bool) -> bool {
        let sl = &self.servers[idx];
        let Some(conn) = sl.conn.clone() else {
            warn!("No connection to {} while testing electability", sl.url);
            return false;
        };
        let ss = match conn.get_slave_status(&sl.replication_source_name) {
            Ok(ss) => ss,
            Err(e) => {
                warn!(
                    "Error getting replication status while testing electability of {}: {}",
                    sl.url, e
                );
                return false;
            }
        };
        if !conn.check_slave_prerequisites() {
            self.sme.add_state(
                StateCode::PrerequisitesFailed,
                format!("Slave {} does not ping or has no binlogs", sl.url),
            );
            if forcing_log {
                warn!("Slave {} does not ping or has no binlogs. Skipping", sl.url);
            }
            return false;
        }
        if sl.is_maintenance {
            self.sme.add_state(
                StateCode::UnderMaintenance,
                format!("Slave {} is in maintenance", sl.url),
            );
            if forcing_log {
                warn!("Slave {} is in maintenance. Skipping", sl.url);
            }
            return false;
        }
        let delay = ss.seconds_behind_master.unwrap_or(0);
        if self.conf.rpl_checks && self.conf.fail_max_delay != -1 && delay > self.conf.fail_max_delay
        {
            self.sme.add_state(
                StateCode::ReplicationDelayTooHigh,
                format!(
                    "Slave {} has more than failover-max-delay {} seconds with replication delay {}",
                    sl.url, self.conf.fail_max_delay, delay
                ),
            );
            if forcing_log {
                warn!(
                    "Unsafe failover condition. Slave {} has more than failover-max-delay {} seconds with replication delay {}. Skipping",
                    sl.url, self.conf.fail_max_delay, delay
                );
            }
            return false;
        }
        if self.conf.rpl_checks && !ss.slave_sql_running {
            self.sme.add_state(
                StateCode::ApplyThreadStopped,
                format!("Slave {} SQL thread is stopped", sl.url),
            );
            if forcing_log {
                warn!(
                    "Unsafe failover condition. Slave {} SQL thread is stopped. Skipping",
                    sl.url
                );
            }
            return false;
        }
        if sl.have_semi_sync
            && !sl.semi_sync_slave_status
            && self.conf.fail_sync
            && self.conf.rpl_checks
        {
            self.sme.add_state(
                StateCode::SemiSyncOutOfSync,
                format!("Semi-sync slave {} is out of sync", sl.url),
            );
            if forcing_log {
                warn!("Semi-sync slave {} is out of sync. Skipping", sl.url);
            }
            return false;
        }
        if sl.is_ignored {
            if forcing_log {
                warn!("Slave {} is in the ignored list", sl.url);
            }
            return false;
        }
        true
    }

    /// Switchover-only layer: the old primary must be reachable with a
    /// readable catch-up target, and when the catch-up wait is configured
    /// the replica must be close enough to reach it.
    pub fn is_slave_electable_for_switchover(&self, idx: usize, forcing_log: bool) -> bool {
        let sl = &self.servers[idx];
        let Some(m_idx) = self.master else {
            return false;
        };
        let master = &self.servers[m_idx];
        if master.role == ServerRole::Failed || master.conn.is_none() {
            if forcing_log {
                warn!(
                    "Cannot check switchover eligibility of {}: master unreachable",
                    sl.url
                );
            }
            return false;
        }
        if master.binary_log_file.is_empty() {
            if forcing_log {
                warn!(
                    "Master {} exposes no binary-log coordinates to catch up to",
                    master.url
                );
            }
            return false;
        }
        if self.conf.switch_slave_wait_catch && self.conf.fail_max_delay != -1 {
            let Some(conn) = sl.conn.clone() else {
                return false;
            };
            if let Ok(ss) = conn.get_slave_status(&sl.replication_source_name) {
                let delay = ss.seconds_behind_master.unwrap_or(0);
                if delay > self.conf.fail_max_delay {
                    debug!(
                        "Slave {} too far behind ({}s) to catch up before switchover",
                        sl.url, delay
                    );
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::state::StateCode;
    use crate::testkit;
    use crate::topology::ServerRole;

    #[test]
    fn test_electable_on_healthy_slave() {
        let (cluster, _conns) = testkit::mariadb_cluster(3);
        let idx = cluster.slave_indices()[0];
        assert!(cluster.is_slave_electable(idx, true));
    }

    #[test]
    fn test_not_electable_without_status() {
        let (cluster, conns) = testkit::mariadb_cluster(2);
        let idx = cluster.slave_indices()[0];
        conns[idx].drop_slave_status();
        assert!(!cluster.is_slave_electable(idx, true));
    }

    #[test]
    fn test_prerequisites_feed_err00040() {
        let (cluster, conns) = testkit::mariadb_cluster(2);
        let idx = cluster.slave_indices()[0];
        conns[idx].fail_prerequisites();
        assert!(!cluster.is_slave_electable(idx, true));
        assert!(cluster.state_machine().has_state(StateCode::PrerequisitesFailed));
    }

    #[test]
    fn test_maintenance_feeds_err00047() {
        let (mut cluster, _conns) = testkit::mariadb_cluster(2);
        let idx = cluster.slave_indices()[0];
        cluster.server_mut(idx).set_maintenance();
        assert!(!cluster.is_slave_electable(idx, true));
        assert!(cluster.state_machine().has_state(StateCode::UnderMaintenance));
    }

    #[test]
    fn test_delay_feeds_err00041_only_under_rpl_checks() {
        let (mut cluster, conns) = testkit::mariadb_cluster(2);
        let idx = cluster.slave_indices()[0];
        conns[idx].set_delay(999);
        assert!(!cluster.is_slave_electable(idx, true));
        assert!(cluster
            .state_machine()
            .has_state(StateCode::ReplicationDelayTooHigh));

        // same lag accepted once checks are off
        cluster.state_machine().clear_states();
        cluster.conf_mut().rpl_checks = false;
        assert!(cluster.is_slave_electable(idx, true));
    }

    #[test]
    fn test_delay_unlimited_when_max_delay_disabled() {
        let (mut cluster, conns) = testkit::mariadb_cluster(2);
        let idx = cluster.slave_indices()[0];
        conns[idx].set_delay(999);
        cluster.conf_mut().fail_max_delay = -1;
        assert!(cluster.is_slave_electable(idx, true));
    }

    #[test]
    fn test_stopped_apply_thread_feeds_err00042() {
        let (cluster, conns) = testkit::mariadb_cluster(2);
        let idx = cluster.slave_indices()[0];
        conns[idx].stop_sql_thread();
        assert!(!cluster.is_slave_electable(idx, true));
        assert!(cluster.state_machine().has_state(StateCode::ApplyThreadStopped));
    }

    #[test]
    fn test_semi_sync_out_of_sync_feeds_err00043() {
        let (mut cluster, _conns) = testkit::mariadb_cluster(2);
        cluster.conf_mut().fail_sync = true;
        let idx = cluster.slave_indices()[0];
        cluster.server_mut(idx).have_semi_sync = true;
        cluster.server_mut(idx).semi_sync_slave_status = false;
        assert!(!cluster.is_slave_electable(idx, true));
        assert!(cluster.state_machine().has_state(StateCode::SemiSyncOutOfSync));
    }

    #[test]
    fn test_ignored_slave_not_electable() {
        let (mut cluster, _conns) = testkit::mariadb_cluster(2);
        let idx = cluster.slave_indices()[0];
        cluster.server_mut(idx).is_ignored = true;
        assert!(!cluster.is_slave_electable(idx, true));
    }

    #[test]
    fn test_switchover_layer_requires_live_master() {
        let (mut cluster, _conns) = testkit::mariadb_cluster(2);
        let idx = cluster.slave_indices()[0];
        assert!(cluster.is_slave_electable_for_switchover(idx, true));
        let m = cluster.master_index().unwrap();
        cluster.server_mut(m).role = ServerRole::Failed;
        assert!(!cluster.is_slave_electable_for_switchover(idx, true));
    }

    #[test]
    fn test_switchover_layer_requires_catchup_target() {
        let (mut cluster, _conns) = testkit::mariadb_cluster(2);
        let idx = cluster.slave_indices()[0];
        let m = cluster.master_index().unwrap();
        cluster.server_mut(m).binary_log_file = String::new();
        assert!(!cluster.is_slave_electable_for_switchover(idx, true));
    }

    #[test]
    fn test_switchover_layer_rejects_lagging_slave_when_waiting() {
        let (cluster, conns) = testkit::mariadb_cluster(2);
        let idx = cluster.slave_indices()[0];
        conns[idx].set_delay(999);
        assert!(!cluster.is_slave_electable_for_switchover(idx, true));
    }
}
