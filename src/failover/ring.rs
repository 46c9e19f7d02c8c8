//! Ring Transition Orchestrator
//!
//! Ring and write-set topologies have no single replication hierarchy to
//! rebuild, so the five-phase protocol collapses: election and hooks are
//! shared with the hierarchical path, relay-log synchronization is
//! skipped, and the final step re-closes the cycle around the departing
//! server by pointing its downstream (the child) at its upstream (the
//! parent). Write-set clusters do not even record a crash snapshot; the
//! write-set handles consistency itself.

use chrono::Local;
use tracing::{error, info};

use super::crash::Crash;
use super::errors::RingError;
use super::orchestrator::{flush_tables_with_deadline, FlushOutcome};
use crate::cluster::Cluster;
use crate::driver::{ChangeMasterMode, EventState};
use crate::position::GtidList;
use crate::state::FailoverScope;
use crate::topology::Topology;

impl Cluster {
    /// Transition for ring and write-set topologies.
    pub(crate) fn vmaster_failover(&mut self, fail: bool) -> bool {
        let _scope = FailoverScope::enter(&self.sme);

        // Phase 1: Cleanup and election
        let old_idx;
        if !fail {
            info!("----------------------------------");
            info!("Starting virtual master switchover");
            info!("----------------------------------");
            info!(
                "Checking long running updates on virtual master, limit {}s",
                self.conf.switch_wait_write
            );
            let Some(v_idx) = self.vmaster else {
                error!("Cannot switchover without a virtual master");
                return false;
            };
            old_idx = v_idx;
            let Some(conn) = self.servers[v_idx].conn.clone() else {
                error!("Cannot switchover without a virtual master connection");
                return false;
            };
            match conn.check_long_running_writes(self.conf.switch_wait_write) {
                Ok(n) if n > 0 => {
                    error!("Long updates running on virtual master. Cannot switchover");
                    return false;
                }
                Ok(_) => {}
                Err(e) => error!("Could not check long running writes on virtual master: {e}"),
            }
            info!("Flushing tables on virtual master {}", self.servers[v_idx].url);
            match flush_tables_with_deadline(conn, false, self.conf.switch_wait_trx) {
                FlushOutcome::Done => {}
                FlushOutcome::Failed(e) => {
                    // the read lock below still fences writes
                    error!("Could not flush tables on master: {e}");
                }
                FlushOutcome::DeadlineExpired => {
                    error!(
                        "Long running trx on master for at least {}s, cannot switchover",
                        self.conf.switch_wait_trx
                    );
                    return false;
                }
            }
            self.master = self.vmaster;
        } else {
            info!("-------------------------------");
            info!("Starting virtual master failover");
            info!("-------------------------------");
            let Some(m_idx) = self.master else {
                error!("No failed virtual master recorded, cannot failover");
                return false;
            };
            old_idx = m_idx;
        }

        info!("Electing a new virtual master");
        for s in self.slaves.clone() {
            self.servers[s].refresh();
        }
        let Some(cand_idx) = self.elect_virtual_candidate(old_idx, true) else {
            error!("No candidates found");
            return false;
        };
        info!(
            "Server {} has been elected as a new master",
            self.servers[cand_idx].url
        );
        self.vmaster = Some(cand_idx);
        self.master = Some(cand_idx);
        let old_url = self.servers[old_idx].url.clone();
        let new_url = self.servers[cand_idx].url.clone();
        let old_conn = self.servers[old_idx].conn.clone();
        let Some(cand_conn) = self.servers[cand_idx].conn.clone() else {
            error!("Elected master {new_url} has no connection");
            return false;
        };

        self.invoke_hook(
            "Pre-failover",
            self.conf.pre_script.clone(),
            old_idx,
            cand_idx,
        );

        // Phase 2: Reject updates on switchover
        if !fail {
            if self.conf.fail_event_status {
                for v in self.servers[cand_idx].event_status.clone() {
                    if v.status == EventState::SlavesideDisabled {
                        info!(
                            "Set DISABLE ON SLAVE for event {} {} on old master",
                            v.db, v.name
                        );
                        if let Some(conn) = &old_conn {
                            if conn.set_event_status(&v, EventState::SlavesideDisabled).is_err() {
                                error!(
                                    "Could not set DISABLE ON SLAVE for event {} {} on old master",
                                    v.db, v.name
                                );
                            }
                        }
                    }
                }
            }
            if self.conf.fail_event_scheduler {
                info!("Disable Event Scheduler on old master");
                if let Some(conn) = &old_conn {
                    if conn.set_event_scheduler(false).is_err() {
                        error!("Could not disable event scheduler on old master");
                    }
                }
            }
            self.servers[old_idx].freeze();
            info!("Rejecting updates on {old_url} (old master)");
            if let Some(conn) = &old_conn {
                if let Err(e) = conn.flush_tables_with_read_lock() {
                    error!("Could not lock tables on {old_url} (old master) {e}");
                }
            }
        }

        // Write-set replication keeps its own consistency; only ring
        // clusters need the crash snapshot for rejoin.
        if self.topology != Topology::MultiMasterWsrep {
            let mut crash = Crash {
                url: old_url.clone(),
                elected_master_url: new_url.clone(),
                ..Default::default()
            };
            info!("Waiting for candidate master to apply relay log");
            if let Err(e) = cand_conn.read_all_relay_logs() {
                error!("Error while reading relay logs on candidate: {e}");
            }
            info!("Save replication status before electing");
            let cand_source = self.servers[cand_idx].replication_source_name.clone();
            match cand_conn.get_slave_status(&cand_source) {
                Ok(ms) => {
                    info!("master_log_file={}", ms.master_log_file);
                    info!("master_log_pos={}", ms.read_master_log_pos);
                    crash.failover_master_log_file = ms.master_log_file.clone();
                    crash.failover_master_log_pos = ms.read_master_log_pos.clone();
                    let cand = &self.servers[cand_idx];
                    if cand.version.is_mariadb() {
                        crash.failover_io_gtid = if self.conf.mxs_binlog_on {
                            cand.current_gtid.clone()
                        } else {
                            GtidList::parse(&ms.gtid_io_pos)
                        };
                    } else if cand.version.is_mysql_or_percona57() && cand.has_gtid_replication() {
                        crash.failover_io_gtid =
                            GtidList::from_mysql_executed_set(&ms.executed_gtid_set);
                    }
                }
                Err(e) => error!("Failover cannot fetch replication info on new master: {e}"),
            }
            info!(
                "Candidate was in sync={}",
                self.servers[cand_idx].semi_sync_slave_status
            );
            crash.failover_semi_sync_slave_status = self.servers[cand_idx].semi_sync_slave_status;
            self.crashes.push(crash.clone());
            if let Err(e) = self.save() {
                error!("Could not save cluster state: {e}");
            }
            let stamp = Local::now().format("%Y%m%d%H%M%S").to_string();
            let crash_path = self
                .conf
                .working_dir
                .join(&self.conf.cfg_group)
                .join(format!("crash-{stamp}.json"));
            if let Err(e) = crash.save(&crash_path) {
                error!("Could not save crash record: {e}");
            }
        }

        // Phase 3: Prepare new master
        self.invoke_hook(
            "Post-failover",
            self.conf.post_script.clone(),
            old_idx,
            cand_idx,
        );
        self.notify_failover_proxies(&old_url, &new_url);
        if cand_conn.set_read_only(false).is_err() {
            error!("Could not set new master as read-write");
        }
        if self.conf.fail_event_scheduler {
            info!("Enable Event Scheduler on the new master");
            if cand_conn.set_event_scheduler(true).is_err() {
                error!("Could not enable event scheduler on the new master");
            }
        }
        if self.conf.fail_event_status {
            for v in self.servers[cand_idx].event_status.clone() {
                if v.status == EventState::SlavesideDisabled {
                    info!("Set ENABLE for event {} {} on new master", v.db, v.name);
                    if cand_conn.set_event_status(&v, EventState::Enabled).is_err() {
                        error!(
                            "Could not set ENABLE for event {} {} on new master",
                            v.db, v.name
                        );
                    }
                }
            }
        }

        if !fail {
            // Phase 4: Demote old master
            self.servers[old_idx].refresh();
            info!("Switching old master as a slave");
            if let Some(conn) = &old_conn {
                if let Err(e) = conn.unlock_tables() {
                    error!("Could not unlock tables on old master {e}");
                }
            }
            if self.conf.read_only {
                if let Err(e) = self.servers[old_idx].set_read_only() {
                    error!("Could not set old master as read-only, {e}");
                }
            } else if let Err(e) = self.servers[old_idx].set_read_write() {
                error!("Could not set old master as read-write, {e}");
            }
            self.servers[old_idx].restore_max_connections();
        }

        // Phase 5: Closing loop
        if let Err(e) = self.close_ring(old_idx) {
            error!("{e}");
        }

        info!(
            "Virtual master switch on {} complete",
            self.servers[cand_idx].url
        );
        self.servers[cand_idx].fail_count = 0;
        if fail {
            self.failover_ctr += 1;
            self.failover_ts = Local::now().timestamp();
        }
        self.master = None;
        true
    }

    /// Downstream of the old primary: the server whose upstream resolves
    /// to it.
    pub(crate) fn get_ring_child_server(&self, old_idx: usize) -> Option<usize> {
        let old_id = self.servers[old_idx].server_id;
        for i in 0..self.servers.len() {
            if self.servers[i].server_id == old_id {
                continue;
            }
            if let Some(m) = self.get_master_from_replication(i) {
                if self.servers[m].server_id == old_id {
                    return Some(i);
                }
            }
        }
        None
    }

    /// Upstream of the old primary, from its last-seen replication status.
    /// The cached snapshot keeps working after the server died.
    pub(crate) fn get_ring_parent_server(&self, old_idx: usize) -> Option<usize> {
        let ss = self.servers[old_idx].slave_status.as_ref()?;
        self.get_server_from_url(&format!("{}:{}", ss.master_host, ss.master_port))
    }

    /// Re-close the cycle: stop the old primary's child and point it at
    /// the old primary's parent.
    pub(crate) fn close_ring(&mut self, old_idx: usize) -> Result<(), RingError> {
        let old_url = self.servers[old_idx].url.clone();
        info!("Closing ring around {old_url}");
        let child = self
            .get_ring_child_server(old_idx)
            .ok_or_else(|| RingError::ChildNotFound(old_url.clone()))?;
        info!("Child is {}", self.servers[child].url);
        let parent = self
            .get_ring_parent_server(old_idx)
            .ok_or_else(|| RingError::ParentNotFound(old_url.clone()))?;
        info!("Parent is {}", self.servers[parent].url);

        let child_url = self.servers[child].url.clone();
        let Some(child_conn) = self.servers[child].conn.clone() else {
            return Err(RingError::ChildNotFound(old_url));
        };
        if let Err(e) = child_conn.stop_slave() {
            error!("Could not stop slave on server {child_url}, {e}");
        }

        let has_my_gtid = self.servers[parent]
            .conn
            .clone()
            .and_then(|c| c.has_mysql_gtid().ok())
            .unwrap_or(false);
        let parent_host = self.servers[parent].host.clone();
        let parent_port = self.servers[parent].port.clone();
        let mode = if self.servers[parent].version.is_mysql_or_percona57() && has_my_gtid {
            ChangeMasterMode::Unset
        } else {
            ChangeMasterMode::SlavePos
        };
        let opt = self.change_master_opt(mode, &parent_host, &parent_port);
        if let Err(e) = child_conn.change_master(&opt) {
            error!("Could not change master on server {child_url}, {e}");
        }
        if let Err(e) = child_conn.start_slave() {
            error!("Could not start slave on server {child_url}, {e}");
        }
        Ok(())
    }
}
