//! Primary Transition Orchestrator
//!
//! Five strictly sequential phases:
//!
//! 1. cleanup and election: fence preconditions, flush the old primary
//!    under a deadline, elect the candidate, swap role state, pre hook;
//! 2. reject updates and capture state: freeze the old primary, drain the
//!    candidate's relay logs, record the crash coordinates;
//! 3. prepare the new primary: stop its replication, persist the crash
//!    record, post hook, proxies, read-write, scheduler, fake transaction;
//! 4. demote the old primary (switchover only): unlock, redirect by
//!    flavor, restore limits, re-enter the replica list;
//! 5. redirect every other replica in list order, then tell the proxies
//!    about the new backend states.
//!
//! Phase-1 failures abort with the in-progress scope released; from phase
//! 2 on every per-server failure is logged and survived.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Local;
use tracing::{debug, error, info, warn};

use super::crash::Crash;
use super::hooks::{self, HookArgs};
use crate::cluster::Cluster;
use crate::driver::{
    ChangeMasterMode, ChangeMasterOpt, DriverError, DriverResult, EventState, ServerConn,
};
use crate::position::{BinlogPosition, GtidList};
use crate::state::FailoverScope;
use crate::topology::ServerRole;

/// Result of racing the pre-switchover flush against its deadline.
pub(crate) enum FlushOutcome {
    Done,
    Failed(DriverError),
    DeadlineExpired,
}

/// Run the table flush on a worker and wait at most `wait_secs`.
///
/// On deadline the worker is orphaned: the result channel has capacity one
/// and is never read again, so a late completion is discarded silently and
/// the server finishes or aborts the flush on its own.
pub(crate) fn flush_tables_with_deadline(
    conn: Arc<dyn ServerConn>,
    use_timeout_variant: bool,
    wait_secs: i64,
) -> FlushOutcome {
    let (tx, rx) = mpsc::sync_channel::<DriverResult<()>>(1);
    let statement_timeout = wait_secs + 2;
    thread::spawn(move || {
        let res = if use_timeout_variant {
            conn.mariadb_flush_tables_no_log_timeout(statement_timeout)
        } else {
            conn.flush_tables_no_log()
        };
        let _ = tx.send(res);
    });
    match rx.recv_timeout(Duration::from_secs(wait_secs.max(0) as u64)) {
        Ok(Ok(())) => FlushOutcome::Done,
        Ok(Err(e)) => FlushOutcome::Failed(e),
        Err(_) => FlushOutcome::DeadlineExpired,
    }
}

impl Cluster {
    /// Promote a replica and reconverge the cluster onto it.
    ///
    /// `fail` selects failover rules (the old primary is unreachable);
    /// otherwise the transition is a planned switchover. Returns `true`
    /// on success; details of any refusal are in the log stream and the
    /// state sink.
    pub fn master_failover(&mut self, fail: bool) -> bool {
        if self.topology.is_virtual() {
            return self.vmaster_failover(fail);
        }
        let scope = FailoverScope::enter(&self.sme);
        self.run_master_failover(fail, &scope)
    }

    pub(crate) fn run_master_failover(&mut self, fail: bool, scope: &FailoverScope) -> bool {
        // Phase 1: Cleanup and election
        if !fail {
            info!("--------------------------");
            info!("Starting master switchover");
            info!("--------------------------");
            info!(
                "Checking long running updates on master, limit {}s",
                self.conf.switch_wait_write
            );
            let Some(m_idx) = self.master else {
                error!("Cannot switchover without a master");
                return false;
            };
            let Some(conn) = self.servers[m_idx].conn.clone() else {
                error!("Cannot switchover without a master connection");
                return false;
            };
            match conn.check_long_running_writes(self.conf.switch_wait_write) {
                Ok(n) if n > 0 => {
                    error!("Long updates running on master. Cannot switchover");
                    return false;
                }
                Ok(_) => {}
                Err(e) => warn!("Could not check long running writes on master: {e}"),
            }

            info!("Flushing tables on master {}", self.servers[m_idx].url);
            let use_timeout_variant = self.servers[m_idx].version.has_flush_timeout();
            match flush_tables_with_deadline(conn, use_timeout_variant, self.conf.switch_wait_trx) {
                FlushOutcome::Done => {}
                FlushOutcome::Failed(e) => {
                    warn!("Could not flush tables on master: {e}");
                    return false;
                }
                FlushOutcome::DeadlineExpired => {
                    error!(
                        "Long running trx on master for at least {}s, cannot switchover",
                        self.conf.switch_wait_trx
                    );
                    return false;
                }
            }
        } else {
            info!("------------------------");
            info!("Starting master failover");
            info!("------------------------");
        }

        info!("Electing a new master");
        for s in self.slaves.clone() {
            self.servers[s].refresh();
        }
        let key = if fail {
            self.elect_failover_candidate(true)
        } else {
            self.elect_switchover_candidate(true)
        };
        let Some(key) = key else {
            error!("No candidates found");
            return false;
        };
        let cand_idx = self.slaves[key];
        info!(
            "Slave {} has been elected as a new master",
            self.servers[cand_idx].url
        );
        if fail && !self.is_slave_electable(cand_idx, true) {
            info!(
                "Elected slave {} has issues, cancelling failover",
                self.servers[cand_idx].url
            );
            return false;
        }
        let Some(old_idx) = self.master else {
            error!("No former master recorded, cannot proceed");
            return false;
        };

        self.master = Some(cand_idx);
        self.servers[cand_idx].role = ServerRole::Primary;
        if !self.conf.multi_master {
            self.slaves.remove(key);
        }
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

        // Phase 2: Reject updates and capture state
        if !fail {
            if self.conf.fail_event_status {
                // the candidate's slaveside-disabled events are exactly
                // the ones live on the old primary
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

        // Sync the candidate: wait for the apply thread to drain every
        // relay log already fetched, then snapshot the coordinates the
        // rejoin subsystem will need.
        let mut crash = Crash {
            url: old_url.clone(),
            elected_master_url: new_url.clone(),
            ..Default::default()
        };
        info!("Waiting for candidate master to apply relay log");
        if let Err(e) = cand_conn.read_all_relay_logs() {
            error!("Error while reading relay logs on candidate: {e}");
        }
        debug!("Save replication status before electing");
        let cand_source = self.servers[cand_idx].replication_source_name.clone();
        match cand_conn.get_slave_status(&cand_source) {
            Ok(ms) => {
                debug!("master_log_file={}", ms.master_log_file);
                debug!("master_log_pos={}", ms.read_master_log_pos);
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
                    crash.failover_io_gtid = GtidList::from_mysql_executed_set(&ms.executed_gtid_set);
                }
            }
            Err(e) => error!("Failover cannot fetch replication info on new master: {e}"),
        }
        debug!(
            "Candidate was in sync={}",
            self.servers[cand_idx].semi_sync_slave_status
        );
        crash.new_master_log_file = self.servers[cand_idx].binary_log_file.clone();
        crash.new_master_log_pos = self.servers[cand_idx].binary_log_pos.clone();
        crash.failover_semi_sync_slave_status = self.servers[cand_idx].semi_sync_slave_status;

        // Relay-server variant: both transition kinds converge on a fresh
        // binary log whose number matches the relay's position.
        let mut relay_idx = None;
        if self.conf.relay_variant() {
            info!("Candidate master has to catch up with relay server log position");
            relay_idx = self.get_relay_server();
            if let Some(r) = relay_idx {
                let relay_source = self.servers[r].replication_source_name.clone();
                let relay_status = self.servers[r]
                    .conn
                    .clone()
                    .map(|c| c.get_slave_status(&relay_source));
                self.servers[r].refresh();
                match relay_status {
                    Some(Ok(rs)) => {
                        let target = BinlogPosition::new(&rs.master_log_file, "4")
                            .file_number()
                            .unwrap_or(0);
                        info!("Relay server log pos reached {target}");
                        if let Err(e) = cand_conn.reset_master() {
                            error!("Could not reset master on candidate: {e}");
                        }
                        info!("Reset Master on candidate Master");
                        let mut ct = 0;
                        while ct < target {
                            ct += 1;
                            info!("Flush Log on new Master {ct}");
                            if let Err(e) = cand_conn.flush_logs() {
                                error!("Could not flush logs on candidate: {e}");
                            }
                        }
                        thread::sleep(Duration::from_secs(2));
                        if let Ok(ms) = cand_conn.get_master_status() {
                            crash.failover_master_log_file = ms.file;
                            crash.failover_master_log_pos = "4".to_string();
                        }
                        info!(
                            "Backing up master pos {} {}",
                            crash.failover_master_log_file, crash.failover_master_log_pos
                        );
                    }
                    _ => error!(
                        "Cannot find slave status on relay server {}",
                        self.servers[r].url
                    ),
                }
            } else {
                error!("No relay server found");
            }
        }

        // Phase 3: Prepare new master
        if !self.conf.multi_master {
            info!("Stopping slave thread on new master");
            let v = self.servers[cand_idx].version;
            if v.is_mariadb() || (v.is_mysql_or_percona() && !v.at_least(5, 7)) {
                if cand_conn.stop_slave().is_err() {
                    error!("Stopping slave failed on new master");
                }
            } else {
                // MySQL 5.7 and later: full stop first, then only the IO
                // thread stays down until the reset
                let _ = cand_conn.stop_slave();
                if cand_conn.stop_slave_io_thread().is_err() {
                    error!("Stopping IO thread failed on new master");
                }
            }
        }
        self.crashes.push(crash.clone());
        let stamp = Local::now().format("%Y%m%d%H%M%S").to_string();
        let crash_path = self
            .conf
            .working_dir
            .join(format!("{}.crash.{}.json", self.conf.cfg_group, stamp));
        if let Err(e) = crash.save(&crash_path) {
            error!("Could not save crash record: {e}");
        }
        if let Err(e) = self.save() {
            error!("Could not save cluster state: {e}");
        }
        // post hook runs before the old master is unlocked
        self.invoke_hook(
            "Post-failover",
            self.conf.post_script.clone(),
            old_idx,
            cand_idx,
        );
        self.notify_failover_proxies(&old_url, &new_url);
        if !self.conf.multi_master {
            info!("Resetting slave on new master and set read/write mode on");
            if self.servers[cand_idx].version.is_mysql_or_percona() {
                // all threads must be down for a reset on MySQL
                let _ = cand_conn.stop_slave();
            }
            if let Err(e) = cand_conn.reset_slave() {
                error!("Reset slave failed on new master, reason: {e}");
            }
        }
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
        // a bogus transaction so the new master's global-id position
        // visibly diverges from every stale copy
        info!("Inject fake transaction on new master {new_url}");
        if let Err(e) = cand_conn.flush_tables() {
            error!("Could not flush tables on new master for fake trx {e}");
        }

        if !fail {
            // Phase 4: Demote old master to slave
            self.servers[old_idx].refresh();
            self.servers[cand_idx].refresh();
            info!("Switching old master as a slave");
            if let Some(conn) = &old_conn {
                if let Err(e) = conn.unlock_tables() {
                    error!("Could not unlock tables on old master {e}");
                }
                // an old replication setup may still be configured
                let _ = conn.stop_slave();
            }
            let mut one_shot_slave_pos = false;
            let old_v = self.servers[old_idx].version;
            if old_v.is_mariadb() && !self.servers[old_idx].have_mariadb_gtid && old_v.major >= 10 {
                // positional to global-id promotion: seed the apply-side
                // state from the new master's binlog position
                let gtid = self.servers[cand_idx].gtid_binlog_pos.to_string();
                if let Some(conn) = &old_conn {
                    if let Err(e) = conn.set_gtid_slave_pos(&gtid) {
                        error!("Could not set gtid_slave_pos on old master, reason: {e}");
                    }
                }
                one_shot_slave_pos = true;
            }
            let has_my_gtid = match old_conn.as_ref().map(|c| c.has_mysql_gtid()) {
                Some(Ok(v)) => v,
                Some(Err(e)) => {
                    error!("Could not get MySQL GTID status: {e}");
                    false
                }
                None => false,
            };
            let new_host = self.servers[cand_idx].host.clone();
            let new_port = self.servers[cand_idx].port.clone();
            if let Some(conn) = &old_conn {
                if !old_v.is_mariadb() && !has_my_gtid {
                    info!("Doing positional switch of old master");
                    let mut opt =
                        self.change_master_opt(ChangeMasterMode::Positional, &new_host, &new_port);
                    opt.logfile = self.servers[cand_idx].binary_log_file.clone();
                    opt.logpos = self.servers[cand_idx].binary_log_pos.clone();
                    if let Err(e) = conn.change_master(&opt) {
                        error!("Change master failed on old master, reason: {e}");
                    }
                    if let Err(e) = conn.start_slave() {
                        error!("Start slave failed on old master, reason: {e}");
                    }
                } else if has_my_gtid {
                    info!("Doing MySQL GTID switch of the old master");
                    let opt = self.change_master_opt(
                        ChangeMasterMode::MasterAutoPosition,
                        &new_host,
                        &new_port,
                    );
                    if let Err(e) = conn.change_master(&opt) {
                        error!("Change master failed on old master {e}");
                    }
                    if let Err(e) = conn.start_slave() {
                        error!("Start slave failed on old master {e}");
                    }
                } else if !self.conf.mxs_binlog_on {
                    info!("Doing MariaDB GTID switch of the old master");
                    // current_pos covers the writes that diverged on the
                    // old master; slave_pos only after the forced seed
                    let mode = if one_shot_slave_pos {
                        ChangeMasterMode::SlavePos
                    } else {
                        ChangeMasterMode::CurrentPos
                    };
                    let opt = self.change_master_opt(mode, &new_host, &new_port);
                    if let Err(e) = conn.change_master(&opt) {
                        error!("Change master failed on old master {e}");
                    }
                    if let Err(e) = conn.start_slave() {
                        error!("Start slave failed on old master {e}");
                    }
                } else if let Some(r) = relay_idx {
                    // replication starts in phase 5, once the relay has
                    // been repointed at the new master
                    info!("Pointing old master to relay server");
                    let relay_host = self.servers[r].host.clone();
                    let relay_port = self.servers[r].port.clone();
                    let opt = if self.servers[r].mxs_have_gtid {
                        self.change_master_opt(ChangeMasterMode::SlavePos, &relay_host, &relay_port)
                    } else {
                        let mut o = self.change_master_opt(
                            ChangeMasterMode::Positional,
                            &relay_host,
                            &relay_port,
                        );
                        o.logfile = crash.failover_master_log_file.clone();
                        o.logpos = crash.failover_master_log_pos.clone();
                        o
                    };
                    if let Err(e) = conn.change_master(&opt) {
                        error!("Change master failed on old master {e}");
                    }
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
            self.servers[old_idx].role = ServerRole::Replica;
            if !self.conf.multi_master {
                self.slaves.push(old_idx);
            }
        }

        // Phase 5: Switch slaves to new master
        info!("Switching other slaves to the new master");
        let old_gtid_binlog = self.servers[old_idx].gtid_binlog_pos.to_string();
        let old_file = self.servers[old_idx].binary_log_file.clone();
        let old_pos = self.servers[old_idx].binary_log_pos.clone();
        let new_host = self.servers[cand_idx].host.clone();
        let new_port = self.servers[cand_idx].port.clone();
        for sidx in self.slaves.clone() {
            {
                let sl = &self.servers[sidx];
                // skip the old master, any designated primary, and under
                // the relay variant everything that is not the relay
                if sl.url == old_url
                    || sl.role == ServerRole::Primary
                    || (!sl.is_relay && self.conf.mxs_binlog_on)
                {
                    continue;
                }
            }
            let sl_url = self.servers[sidx].url.clone();
            let sl_version = self.servers[sidx].version;
            let Some(sl_conn) = self.servers[sidx].conn.clone() else {
                warn!("No connection to slave {sl_url}, skipping redirect");
                continue;
            };

            if !fail && !self.conf.mxs_binlog_on && self.conf.switch_slave_wait_catch {
                info!("Waiting for slave {sl_url} to sync");
                if sl_version.is_mariadb() {
                    let _ = sl_conn.master_wait_gtid(&old_gtid_binlog, 30);
                } else {
                    let _ = sl_conn.master_pos_wait(&old_file, &old_pos, 30);
                }
            }
            info!("Change master on slave {sl_url}");
            if let Err(e) = sl_conn.stop_slave() {
                error!("Could not stop slave on server {sl_url}, {e}");
            }
            if !fail
                && !self.conf.mxs_binlog_on
                && self.conf.switch_slave_wait_catch
                && self.conf.fail_force_gtid
                && sl_version.is_mariadb()
            {
                if let Err(e) = sl_conn.set_gtid_slave_pos(&old_gtid_binlog) {
                    error!("Could not set gtid_slave_pos on slave {sl_url}, {e}");
                }
            }
            let has_my_gtid = cand_conn.has_mysql_gtid().unwrap_or(false);
            let change_result = if !sl_version.is_mariadb() && !has_my_gtid {
                if self.conf.autorejoin_slave_positional_heartbeat {
                    self.pseudo_gtid_redirect(&sl_conn, &cand_conn, &sl_url, &new_host, &new_port)
                } else {
                    // nothing safe to point a legacy replica at; park it
                    // for the rejoin pass, still attached to the dead
                    // master
                    self.servers[sidx].set_maintenance();
                    None
                }
            } else if self.servers[old_idx].version.is_mysql_or_percona57() && has_my_gtid {
                Some(sl_conn.change_master(&self.change_master_opt(
                    ChangeMasterMode::MasterAutoPosition,
                    &new_host,
                    &new_port,
                )))
            } else if !self.conf.mxs_binlog_on {
                Some(sl_conn.change_master(&self.change_master_opt(
                    ChangeMasterMode::SlavePos,
                    &new_host,
                    &new_port,
                )))
            } else {
                info!("Pointing relay to the new master: {new_host}:{new_port}");
                let mode = if self.servers[sidx].mxs_have_gtid {
                    ChangeMasterMode::SlavePos
                } else {
                    ChangeMasterMode::Mxs
                };
                Some(sl_conn.change_master(&self.change_master_opt(mode, &new_host, &new_port)))
            };
            if let Some(Err(e)) = change_result {
                error!("Change master failed on slave {sl_url}, {e}");
            }
            if let Err(e) = sl_conn.start_slave() {
                error!("Could not start slave on server {sl_url}, {e}");
            }
            if self.conf.mxs_binlog_on && !fail {
                info!("Restarting old master replication, relay server ready");
                if let Some(conn) = &old_conn {
                    let _ = conn.start_slave();
                }
            }
            if self.conf.read_only && !self.conf.mxs_binlog_on {
                if let Err(e) = sl_conn.set_read_only(true) {
                    error!("Could not set slave {sl_url} as read-only, {e}");
                }
            } else if !self.conf.mxs_binlog_on {
                if let Err(e) = sl_conn.set_read_only(false) {
                    error!("Could not set slave {sl_url} as read-write, {e}");
                }
            }
        }
        self.notify_backend_state_change();

        // After a failover that landed off the preferred primary, run one
        // planned transition onto it. The recursion terminates: the next
        // pass elects the preferred primary itself.
        if fail
            && !self.conf.pref_master.is_empty()
            && self.conf.pref_master != old_url
            && new_url != self.conf.pref_master
            && self.found_preferred_master().is_some()
            && self.master.map(|m| self.servers[m].role) != Some(ServerRole::Failed)
        {
            info!("Not on preferred master after failover, proceeding with switchover");
            self.run_master_failover(false, scope);
        }

        let final_idx = self.master.unwrap_or(cand_idx);
        info!("Master switch on {} complete", self.servers[final_idx].url);
        self.servers[final_idx].fail_count = 0;
        if fail {
            self.failover_ctr += 1;
            self.failover_ts = Local::now().timestamp();
        }
        true
    }

    /// Pseudo-identifier positional redirect for a legacy replica: align
    /// on the last marker both sides know, skip the events the replica
    /// already applied past it, and point it at the resulting coordinate
    /// on the new master. Any failed step leaves the replica untouched.
    fn pseudo_gtid_redirect(
        &self,
        sl_conn: &Arc<dyn ServerConn>,
        cand_conn: &Arc<dyn ServerConn>,
        sl_url: &str,
        new_host: &str,
        new_port: &str,
    ) -> Option<DriverResult<()>> {
        let marker = match sl_conn.get_last_pseudo_gtid() {
            Ok(m) => m,
            Err(e) => {
                error!("Could not get pseudo identifier on slave {sl_url}, {e}");
                return None;
            }
        };
        info!("Found pseudo identifier {marker}");
        let sl_coord = match sl_conn.get_binlog_pos_from_pseudo_gtid(&marker) {
            Ok(c) => c,
            Err(e) => {
                error!("Could not find pseudo identifier in slave {sl_url}, {e}");
                return None;
            }
        };
        info!("Found coordinates on slave {}, {}", sl_coord.file, sl_coord.pos);
        let skip = match sl_conn.get_number_of_events_after_pos(&sl_coord) {
            Ok(n) => n,
            Err(e) => {
                error!("Could not count events after pseudo identifier in slave {sl_url}, {e}");
                return None;
            }
        };
        info!(
            "Found {} events to skip after coordinates on slave {}, {}",
            skip, sl_coord.file, sl_coord.pos
        );
        let m_coord = match cand_conn.get_binlog_pos_from_pseudo_gtid(&marker) {
            Ok(c) => c,
            Err(e) => {
                error!("Could not find pseudo identifier in master, {e}");
                return None;
            }
        };
        info!("Found coordinate on master {}, {}", m_coord.file, m_coord.pos);
        let m_coord = match cand_conn.get_binlog_pos_after_skip_number_of_events(&m_coord, skip) {
            Ok(c) => c,
            Err(e) => {
                error!("Could not skip events after pseudo identifier in master, {e}");
                return None;
            }
        };
        info!("Found skip coordinate on master {}, {}", m_coord.file, m_coord.pos);
        info!("Doing positional switch of slave {sl_url}");
        let mut opt = self.change_master_opt(ChangeMasterMode::Positional, new_host, new_port);
        opt.logfile = m_coord.file;
        opt.logpos = m_coord.pos;
        Some(sl_conn.change_master(&opt))
    }

    /// Redirect options shared by every change-master issued during a
    /// transition: credentials, retry/heartbeat tuning and SSL come from
    /// the configuration.
    pub(crate) fn change_master_opt(
        &self,
        mode: ChangeMasterMode,
        host: &str,
        port: &str,
    ) -> ChangeMasterOpt {
        ChangeMasterOpt {
            host: host.to_string(),
            port: port.to_string(),
            user: self.conf.rpl_user.clone(),
            password: self.conf.rpl_pass.clone(),
            retry: self.conf.force_slave_heartbeat_retry.to_string(),
            heartbeat: self.conf.force_slave_heartbeat_time.to_string(),
            mode,
            logfile: String::new(),
            logpos: String::new(),
            ssl: self.conf.replication_ssl,
        }
    }

    pub(crate) fn invoke_hook(&self, label: &str, script: String, old_idx: usize, new_idx: usize) {
        if script.is_empty() {
            return;
        }
        info!("Calling {label} script");
        let old = &self.servers[old_idx];
        let new = &self.servers[new_idx];
        let args = HookArgs {
            old_host: old.host.clone(),
            new_host: new.host.clone(),
            old_port: old.port.clone(),
            new_port: new.port.clone(),
            old_proxy_name: old.proxy_server_name.clone(),
            new_proxy_name: new.proxy_server_name.clone(),
        };
        match hooks::run(&script, &args) {
            Ok(out) => {
                if !out.success {
                    error!("{label} script exited with status {:?}", out.code);
                }
                info!("{label} script complete: {}", out.output);
            }
            Err(e) => error!("{e}"),
        }
    }
}
