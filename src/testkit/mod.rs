//! Test Support
//!
//! A scriptable stand-in for [`ServerConn`] plus cluster builders. Every
//! operation the orchestrators issue is journaled as a flat string, so
//! tests assert on the exact sequence of side effects a transition caused
//! on each server. Shipped as a normal module: the crate's own unit tests,
//! the scenario tests under `tests/` and downstream control planes all
//! drive transitions against it.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::cluster::Cluster;
use crate::config::FailoverConfig;
use crate::driver::{
    ChangeMasterOpt, DriverError, DriverResult, EventInfo, MasterStatus, ReplicationVars,
    ServerConn, SlaveStatus,
};
use crate::position::BinlogPosition;
use crate::topology::{DbVersion, ServerDescriptor, ServerRole, Topology};

/// Mutable behavior of a fake server.
#[derive(Debug, Clone)]
pub struct FakeState {
    pub master_status: MasterStatus,
    /// `None` makes every status fetch fail, like a server that was never
    /// configured as a replica.
    pub slave_status: Option<SlaveStatus>,
    pub vars: ReplicationVars,
    pub has_mysql_gtid: bool,
    pub prerequisites_ok: bool,
    pub long_running_writes: u32,
    pub max_connections: String,
    pub flush_fails: bool,
    pub flush_delay: Option<Duration>,
    pub pseudo_gtid: Option<String>,
    pub pseudo_coord: BinlogPosition,
    pub pseudo_events_after: u64,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            master_status: MasterStatus {
                file: "mariadb-bin.000010".to_string(),
                position: "730".to_string(),
            },
            slave_status: Some(SlaveStatus {
                master_host: "db1".to_string(),
                master_port: "3306".to_string(),
                master_log_file: "mariadb-bin.000010".to_string(),
                read_master_log_pos: "730".to_string(),
                gtid_io_pos: "0-1-100".to_string(),
                executed_gtid_set: String::new(),
                seconds_behind_master: Some(0),
                slave_sql_running: true,
                slave_io_running: true,
            }),
            vars: ReplicationVars {
                current_gtid: "0-1-100".to_string(),
                slave_gtid: "0-1-100".to_string(),
                gtid_binlog_pos: "0-1-100".to_string(),
                semi_sync_slave_status: false,
                have_semi_sync: false,
                event_status: Vec::new(),
            },
            has_mysql_gtid: false,
            prerequisites_ok: true,
            long_running_writes: 0,
            max_connections: "151".to_string(),
            flush_fails: false,
            flush_delay: None,
            pseudo_gtid: None,
            pseudo_coord: BinlogPosition::new("mysql-bin.000001", "120"),
            pseudo_events_after: 0,
        }
    }
}

/// Scriptable server connection journaling every operation.
pub struct FakeConn {
    state: Mutex<FakeState>,
    journal: Mutex<Vec<String>>,
}

impl FakeConn {
    pub fn new(state: FakeState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            journal: Mutex::new(Vec::new()),
        })
    }

    /// Healthy MariaDB replica with matching gtid state everywhere.
    pub fn healthy_mariadb() -> Arc<Self> {
        Self::new(FakeState::default())
    }

    /// Healthy MySQL 5.7 replica replicating with an executed set.
    pub fn healthy_mysql57() -> Arc<Self> {
        let mut state = FakeState::default();
        let set = "3e11fa47-71ca-11e1-9e33-c80aa9429562:1-100";
        state.master_status.file = "mysql-bin.000010".to_string();
        state.has_mysql_gtid = true;
        state.vars.current_gtid = set.to_string();
        state.vars.slave_gtid = String::new();
        state.vars.gtid_binlog_pos = String::new();
        if let Some(ss) = &mut state.slave_status {
            ss.master_log_file = "mysql-bin.000010".to_string();
            ss.gtid_io_pos = String::new();
            ss.executed_gtid_set = set.to_string();
        }
        Self::new(state)
    }

    fn record(&self, entry: impl Into<String>) {
        self.journal.lock().push(entry.into());
    }

    // ---- journal queries -------------------------------------------------

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().clone()
    }

    pub fn saw(&self, entry: &str) -> bool {
        self.journal.lock().iter().any(|e| e == entry)
    }

    pub fn saw_prefix(&self, prefix: &str) -> bool {
        self.journal.lock().iter().any(|e| e.starts_with(prefix))
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.journal
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    /// Modes of every redirect issued on this connection, in order.
    pub fn change_master_modes(&self) -> Vec<String> {
        self.journal
            .lock()
            .iter()
            .filter_map(|e| {
                e.strip_prefix("change-master mode=")
                    .map(|rest| rest.split_whitespace().next().unwrap_or("").to_string())
            })
            .collect()
    }

    // ---- state mutators for tests ----------------------------------------

    pub fn drop_slave_status(&self) {
        self.state.lock().slave_status = None;
    }

    pub fn fail_prerequisites(&self) {
        self.state.lock().prerequisites_ok = false;
    }

    pub fn set_delay(&self, secs: i64) {
        if let Some(ss) = &mut self.state.lock().slave_status {
            ss.seconds_behind_master = Some(secs);
        }
    }

    pub fn stop_sql_thread(&self) {
        if let Some(ss) = &mut self.state.lock().slave_status {
            ss.slave_sql_running = false;
        }
    }

    pub fn set_slave_gtid(&self, gtid: &str) {
        self.state.lock().vars.slave_gtid = gtid.to_string();
    }

    pub fn set_gtid_binlog_pos(&self, gtid: &str) {
        self.state.lock().vars.gtid_binlog_pos = gtid.to_string();
    }

    pub fn set_gtid_io_pos(&self, gtid: &str) {
        if let Some(ss) = &mut self.state.lock().slave_status {
            ss.gtid_io_pos = gtid.to_string();
        }
    }

    pub fn set_read_coordinates(&self, file: &str, pos: &str) {
        if let Some(ss) = &mut self.state.lock().slave_status {
            ss.master_log_file = file.to_string();
            ss.read_master_log_pos = pos.to_string();
        }
    }

    pub fn set_master_status(&self, file: &str, pos: &str) {
        let mut state = self.state.lock();
        state.master_status.file = file.to_string();
        state.master_status.position = pos.to_string();
    }

    pub fn set_upstream(&self, host: &str, port: &str) {
        if let Some(ss) = &mut self.state.lock().slave_status {
            ss.master_host = host.to_string();
            ss.master_port = port.to_string();
        }
    }

    pub fn set_long_running_writes(&self, n: u32) {
        self.state.lock().long_running_writes = n;
    }

    pub fn set_has_mysql_gtid(&self, v: bool) {
        self.state.lock().has_mysql_gtid = v;
    }

    pub fn set_flush_delay(&self, delay: Duration) {
        self.state.lock().flush_delay = Some(delay);
    }

    pub fn set_flush_fails(&self) {
        self.state.lock().flush_fails = true;
    }

    pub fn set_events(&self, events: Vec<EventInfo>) {
        self.state.lock().vars.event_status = events;
    }

    pub fn set_semi_sync(&self, have: bool, in_sync: bool) {
        let mut state = self.state.lock();
        state.vars.have_semi_sync = have;
        state.vars.semi_sync_slave_status = in_sync;
    }

    pub fn set_pseudo_gtid(&self, marker: &str, coord: BinlogPosition, events_after: u64) {
        let mut state = self.state.lock();
        state.pseudo_gtid = Some(marker.to_string());
        state.pseudo_coord = coord;
        state.pseudo_events_after = events_after;
    }

    pub fn max_connections(&self) -> String {
        self.state.lock().max_connections.clone()
    }

    fn flush_behavior(&self) -> DriverResult<()> {
        let (delay, fails) = {
            let state = self.state.lock();
            (state.flush_delay, state.flush_fails)
        };
        if let Some(d) = delay {
            thread::sleep(d);
        }
        if fails {
            return Err(DriverError::Query("flush tables failed".to_string()));
        }
        Ok(())
    }
}

impl ServerConn for FakeConn {
    fn check_long_running_writes(&self, _max_seconds: i64) -> DriverResult<u32> {
        Ok(self.state.lock().long_running_writes)
    }

    fn flush_tables(&self) -> DriverResult<()> {
        self.record("flush-tables");
        Ok(())
    }

    fn flush_tables_no_log(&self) -> DriverResult<()> {
        self.record("flush-tables-no-log");
        self.flush_behavior()
    }

    fn mariadb_flush_tables_no_log_timeout(&self, timeout_secs: i64) -> DriverResult<()> {
        self.record(format!("flush-tables-no-log-timeout {timeout_secs}"));
        self.flush_behavior()
    }

    fn flush_tables_with_read_lock(&self) -> DriverResult<()> {
        self.record("flush-tables-read-lock");
        Ok(())
    }

    fn unlock_tables(&self) -> DriverResult<()> {
        self.record("unlock-tables");
        Ok(())
    }

    fn flush_logs(&self) -> DriverResult<()> {
        self.record("flush-logs");
        let mut state = self.state.lock();
        let current = BinlogPosition::new(&state.master_status.file, "4");
        let prefix = current.file.split_once('.').map(|(p, _)| p).unwrap_or("bin");
        let next = current.file_number().unwrap_or(0) + 1;
        state.master_status.file = format!("{prefix}.{next:06}");
        state.master_status.position = "4".to_string();
        Ok(())
    }

    fn reset_master(&self) -> DriverResult<()> {
        self.record("reset-master");
        let mut state = self.state.lock();
        let prefix = state
            .master_status
            .file
            .split_once('.')
            .map(|(p, _)| p.to_string())
            .unwrap_or_else(|| "bin".to_string());
        state.master_status.file = format!("{prefix}.000001");
        state.master_status.position = "4".to_string();
        Ok(())
    }

    fn get_master_status(&self) -> DriverResult<MasterStatus> {
        Ok(self.state.lock().master_status.clone())
    }

    fn get_slave_status(&self, source_name: &str) -> DriverResult<SlaveStatus> {
        self.state
            .lock()
            .slave_status
            .clone()
            .ok_or_else(|| DriverError::NoReplicationStatus(source_name.to_string()))
    }

    fn stop_slave(&self) -> DriverResult<()> {
        self.record("stop-slave");
        Ok(())
    }

    fn stop_slave_io_thread(&self) -> DriverResult<()> {
        self.record("stop-slave-io-thread");
        Ok(())
    }

    fn start_slave(&self) -> DriverResult<()> {
        self.record("start-slave");
        Ok(())
    }

    fn reset_slave(&self) -> DriverResult<()> {
        self.record("reset-slave");
        Ok(())
    }

    fn change_master(&self, opt: &ChangeMasterOpt) -> DriverResult<()> {
        self.record(format!(
            "change-master mode={} host={}:{} file={} pos={}",
            opt.mode.as_str(),
            opt.host,
            opt.port,
            opt.logfile,
            opt.logpos
        ));
        if let Some(ss) = &mut self.state.lock().slave_status {
            ss.master_host = opt.host.clone();
            ss.master_port = opt.port.clone();
        }
        Ok(())
    }

    fn master_pos_wait(&self, file: &str, pos: &str, timeout_secs: u32) -> DriverResult<()> {
        self.record(format!("master-pos-wait {file}:{pos} {timeout_secs}"));
        Ok(())
    }

    fn master_wait_gtid(&self, gtid: &str, timeout_secs: u32) -> DriverResult<()> {
        self.record(format!("master-wait-gtid {gtid} {timeout_secs}"));
        Ok(())
    }

    fn read_all_relay_logs(&self) -> DriverResult<()> {
        self.record("read-all-relay-logs");
        Ok(())
    }

    fn set_event_status(
        &self,
        event: &EventInfo,
        status: crate::driver::EventState,
    ) -> DriverResult<()> {
        self.record(format!(
            "set-event-status {}.{} {:?}",
            event.db, event.name, status
        ));
        Ok(())
    }

    fn set_event_scheduler(&self, enable: bool) -> DriverResult<()> {
        self.record(format!("set-event-scheduler {enable}"));
        Ok(())
    }

    fn set_read_only(&self, read_only: bool) -> DriverResult<()> {
        self.record(format!("set-read-only {read_only}"));
        Ok(())
    }

    fn set_gtid_slave_pos(&self, gtid: &str) -> DriverResult<()> {
        self.record(format!("set-gtid-slave-pos {gtid}"));
        Ok(())
    }

    fn get_max_connections(&self) -> DriverResult<String> {
        Ok(self.state.lock().max_connections.clone())
    }

    fn set_max_connections(&self, value: &str) -> DriverResult<()> {
        self.record(format!("set-max-connections {value}"));
        self.state.lock().max_connections = value.to_string();
        Ok(())
    }

    fn has_mysql_gtid(&self) -> DriverResult<bool> {
        Ok(self.state.lock().has_mysql_gtid)
    }

    fn check_slave_prerequisites(&self) -> bool {
        self.state.lock().prerequisites_ok
    }

    fn get_last_pseudo_gtid(&self) -> DriverResult<String> {
        self.state
            .lock()
            .pseudo_gtid
            .clone()
            .ok_or_else(|| DriverError::Unsupported("no pseudo identifier found".to_string()))
    }

    fn get_binlog_pos_from_pseudo_gtid(&self, _marker: &str) -> DriverResult<BinlogPosition> {
        Ok(self.state.lock().pseudo_coord.clone())
    }

    fn get_number_of_events_after_pos(&self, _pos: &BinlogPosition) -> DriverResult<u64> {
        Ok(self.state.lock().pseudo_events_after)
    }

    fn get_binlog_pos_after_skip_number_of_events(
        &self,
        pos: &BinlogPosition,
        skip: u64,
    ) -> DriverResult<BinlogPosition> {
        let base: u64 = pos.pos.parse().unwrap_or(0);
        Ok(BinlogPosition::new(pos.file.clone(), (base + skip).to_string()))
    }

    fn get_replication_vars(&self) -> DriverResult<ReplicationVars> {
        Ok(self.state.lock().vars.clone())
    }
}

// ---- cluster builders ----------------------------------------------------

fn build_cluster(
    count: usize,
    version: DbVersion,
    make_conn: fn() -> Arc<FakeConn>,
    master_alive: bool,
) -> (Cluster, Vec<Arc<FakeConn>>) {
    let mut cluster = Cluster::new(FailoverConfig::default(), Topology::MasterSlave);
    let mut conns = Vec::new();
    for i in 0..count {
        let conn = make_conn();
        let alive = master_alive || i != 0;
        let mut server = ServerDescriptor::new(
            format!("db{}", i + 1),
            "3306",
            (i + 1) as u64,
            version,
            if alive {
                Some(conn.clone() as Arc<dyn ServerConn>)
            } else {
                None
            },
        );
        server.have_mariadb_gtid = version.is_mariadb();
        let idx = cluster.add_server(server);
        conns.push(conn);
        if i == 0 {
            cluster.set_master(idx);
            if !master_alive {
                cluster.server_mut(idx).role = ServerRole::Failed;
            }
        } else {
            cluster.add_slave(idx);
        }
    }
    for i in 0..count {
        cluster.server_mut(i).refresh();
    }
    (cluster, conns)
}

/// Live MariaDB primary at index 0, `count - 1` healthy replicas.
pub fn mariadb_cluster(count: usize) -> (Cluster, Vec<Arc<FakeConn>>) {
    build_cluster(count, DbVersion::mariadb(10, 3), FakeConn::healthy_mariadb, true)
}

/// Failed MariaDB primary at index 0 (no connection), healthy replicas.
pub fn fail_cluster(count: usize) -> (Cluster, Vec<Arc<FakeConn>>) {
    build_cluster(count, DbVersion::mariadb(10, 3), FakeConn::healthy_mariadb, false)
}

/// Live MySQL 5.7 primary at index 0, replicas with executed-set gtid.
pub fn mysql57_cluster(count: usize) -> (Cluster, Vec<Arc<FakeConn>>) {
    build_cluster(count, DbVersion::mysql(5, 7), FakeConn::healthy_mysql57, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_records_operations_in_order() {
        let conn = FakeConn::healthy_mariadb();
        conn.stop_slave().unwrap();
        conn.start_slave().unwrap();
        assert_eq!(conn.journal(), vec!["stop-slave", "start-slave"]);
    }

    #[test]
    fn test_change_master_journals_mode_and_repoints_upstream() {
        let conn = FakeConn::healthy_mariadb();
        let mut opt = ChangeMasterOpt::default();
        opt.mode = crate::driver::ChangeMasterMode::SlavePos;
        opt.host = "db9".to_string();
        opt.port = "3306".to_string();
        conn.change_master(&opt).unwrap();
        assert_eq!(conn.change_master_modes(), vec!["SLAVE_POS"]);
        let ss = conn.get_slave_status("").unwrap();
        assert_eq!(ss.master_host, "db9");
    }

    #[test]
    fn test_reset_master_and_flush_logs_rotate_files() {
        let conn = FakeConn::healthy_mariadb();
        conn.reset_master().unwrap();
        assert_eq!(conn.get_master_status().unwrap().file, "mariadb-bin.000001");
        conn.flush_logs().unwrap();
        conn.flush_logs().unwrap();
        assert_eq!(conn.get_master_status().unwrap().file, "mariadb-bin.000003");
    }

    #[test]
    fn test_dropped_slave_status_errors() {
        let conn = FakeConn::healthy_mariadb();
        conn.drop_slave_status();
        assert!(conn.get_slave_status("").is_err());
    }

    #[test]
    fn test_builders_wire_master_and_slaves() {
        let (cluster, conns) = mariadb_cluster(3);
        assert_eq!(cluster.master_url(), Some("db1:3306"));
        assert_eq!(cluster.slave_indices(), &[1, 2]);
        assert_eq!(conns.len(), 3);
        // refresh filled the coordinate caches
        assert_eq!(cluster.server(1).binary_log_file, "mariadb-bin.000010");
    }

    #[test]
    fn test_fail_cluster_has_dead_master() {
        let (cluster, _conns) = fail_cluster(3);
        let m = cluster.master_index().unwrap();
        assert_eq!(cluster.server(m).role, ServerRole::Failed);
        assert!(cluster.server(m).conn.is_none());
    }
}
