//! Cluster Container
//!
//! Owns the server descriptors, the primary/replica pointers, the crash
//! history and the shared state machine. The discovery collaborator builds
//! the container; the orchestrators in [`crate::failover`] and the
//! elections in [`crate::election`] run against it while holding the
//! failover scope. Monitors reading concurrently must tolerate observing a
//! mid-transition snapshot.

use std::fs;
use std::sync::Arc;

use serde::Serialize;
use tracing::error;

use crate::config::FailoverConfig;
use crate::failover::Crash;
use crate::proxy::ProxyNotifier;
use crate::state::StateMachine;
use crate::topology::{ServerDescriptor, ServerRole, Topology};

/// One replication cluster under management.
pub struct Cluster {
    pub(crate) conf: FailoverConfig,
    pub(crate) topology: Topology,
    pub(crate) servers: Vec<ServerDescriptor>,
    /// Index of the current primary in `servers`.
    pub(crate) master: Option<usize>,
    /// Index of the virtual primary for ring/write-set topologies.
    pub(crate) vmaster: Option<usize>,
    /// Indices into `servers`, in caller-provided order; elections break
    /// ties on this order.
    pub(crate) slaves: Vec<usize>,
    pub(crate) crashes: Vec<Crash>,
    pub(crate) sme: Arc<StateMachine>,
    pub(crate) proxies: Vec<Arc<dyn ProxyNotifier>>,
    pub(crate) failover_ctr: u32,
    pub(crate) failover_ts: i64,
}

impl Cluster {
    pub fn new(conf: FailoverConfig, topology: Topology) -> Self {
        Self {
            conf,
            topology,
            servers: Vec::new(),
            master: None,
            vmaster: None,
            slaves: Vec::new(),
            crashes: Vec::new(),
            sme: StateMachine::new(),
            proxies: Vec::new(),
            failover_ctr: 0,
            failover_ts: 0,
        }
    }

    /// Register a server and return its index.
    pub fn add_server(&mut self, server: ServerDescriptor) -> usize {
        self.servers.push(server);
        self.servers.len() - 1
    }

    /// Mark a registered server as the primary.
    pub fn set_master(&mut self, idx: usize) {
        self.servers[idx].role = ServerRole::Primary;
        self.master = Some(idx);
    }

    /// Mark a registered server as the virtual primary (ring/write-set).
    pub fn set_vmaster(&mut self, idx: usize) {
        self.vmaster = Some(idx);
    }

    /// Append a registered server to the replica list.
    pub fn add_slave(&mut self, idx: usize) {
        self.slaves.push(idx);
    }

    pub fn register_proxy(&mut self, proxy: Arc<dyn ProxyNotifier>) {
        self.proxies.push(proxy);
    }

    pub fn conf(&self) -> &FailoverConfig {
        &self.conf
    }

    /// Mutable access for the configuration owner; never called while a
    /// transition holds the failover scope.
    pub fn conf_mut(&mut self) -> &mut FailoverConfig {
        &mut self.conf
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn server(&self, idx: usize) -> &ServerDescriptor {
        &self.servers[idx]
    }

    pub fn server_mut(&mut self, idx: usize) -> &mut ServerDescriptor {
        &mut self.servers[idx]
    }

    pub fn servers(&self) -> &[ServerDescriptor] {
        &self.servers
    }

    pub fn master_index(&self) -> Option<usize> {
        self.master
    }

    pub fn master_url(&self) -> Option<&str> {
        self.master.map(|i| self.servers[i].url.as_str())
    }

    pub fn vmaster_url(&self) -> Option<&str> {
        self.vmaster.map(|i| self.servers[i].url.as_str())
    }

    /// Replica indices in election order.
    pub fn slave_indices(&self) -> &[usize] {
        &self.slaves
    }

    pub fn crashes(&self) -> &[Crash] {
        &self.crashes
    }

    pub fn state_machine(&self) -> &Arc<StateMachine> {
        &self.sme
    }

    pub fn is_in_failover(&self) -> bool {
        self.sme.is_in_failover()
    }

    pub fn failover_count(&self) -> u32 {
        self.failover_ctr
    }

    pub fn failover_timestamp(&self) -> i64 {
        self.failover_ts
    }

    /// First registered relay server still alive.
    pub(crate) fn get_relay_server(&self) -> Option<usize> {
        self.servers
            .iter()
            .position(|s| s.is_relay && s.role != ServerRole::Failed)
    }

    /// Replica whose URL matches the configured preferred primary.
    pub(crate) fn found_preferred_master(&self) -> Option<usize> {
        self.slaves
            .iter()
            .copied()
            .find(|&i| self.servers[i].url == self.conf.pref_master)
    }

    pub(crate) fn get_server_from_url(&self, url: &str) -> Option<usize> {
        self.servers.iter().position(|s| s.url == url)
    }

    /// Resolve the server a given one replicates from, using its live
    /// replication status.
    pub(crate) fn get_master_from_replication(&self, idx: usize) -> Option<usize> {
        let server = &self.servers[idx];
        let conn = server.conn.clone()?;
        let ss = conn
            .get_slave_status(&server.replication_source_name)
            .ok()?;
        self.get_server_from_url(&format!("{}:{}", ss.master_host, ss.master_port))
    }

    pub(crate) fn notify_failover_proxies(&self, old_url: &str, new_url: &str) {
        for proxy in &self.proxies {
            if let Err(e) = proxy.on_failover(old_url, new_url) {
                error!("{e}");
            }
        }
    }

    pub(crate) fn notify_backend_state_change(&self) {
        for proxy in &self.proxies {
            if let Err(e) = proxy.on_backend_state_change() {
                error!("{e}");
            }
        }
    }

    /// Persist a cluster snapshot to `{working_dir}/{cfg_group}.json`.
    /// Failure is soft; the crash record is the durable artifact.
    pub fn save(&self) -> std::io::Result<()> {
        #[derive(Serialize)]
        struct SnapshotServer<'a> {
            url: &'a str,
            role: &'a str,
            ignored: bool,
            maintenance: bool,
        }
        #[derive(Serialize)]
        struct Snapshot<'a> {
            master: Option<&'a str>,
            servers: Vec<SnapshotServer<'a>>,
            crashes: usize,
            failover_count: u32,
        }

        let snapshot = Snapshot {
            master: self.master_url(),
            servers: self
                .servers
                .iter()
                .map(|s| SnapshotServer {
                    url: &s.url,
                    role: s.role.as_str(),
                    ignored: s.is_ignored,
                    maintenance: s.is_maintenance,
                })
                .collect(),
            crashes: self.crashes.len(),
            failover_count: self.failover_ctr,
        };
        fs::create_dir_all(&self.conf.working_dir)?;
        let path = self
            .conf
            .working_dir
            .join(format!("{}.json", self.conf.cfg_group));
        let payload = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, payload)
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("topology", &self.topology)
            .field("servers", &self.servers.len())
            .field("master", &self.master_url())
            .field("slaves", &self.slaves.len())
            .field("in_failover", &self.is_in_failover())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::DbVersion;
    use tempfile::TempDir;

    fn cluster_with_two_servers() -> Cluster {
        let mut cluster = Cluster::new(FailoverConfig::default(), Topology::MasterSlave);
        let m = cluster.add_server(ServerDescriptor::new(
            "db1",
            "3306",
            1,
            DbVersion::mariadb(10, 3),
            None,
        ));
        let s = cluster.add_server(ServerDescriptor::new(
            "db2",
            "3306",
            2,
            DbVersion::mariadb(10, 3),
            None,
        ));
        cluster.set_master(m);
        cluster.add_slave(s);
        cluster
    }

    #[test]
    fn test_master_and_slave_registration() {
        let cluster = cluster_with_two_servers();
        assert_eq!(cluster.master_url(), Some("db1:3306"));
        assert_eq!(cluster.slave_indices().len(), 1);
        assert_eq!(cluster.server(0).role, ServerRole::Primary);
    }

    #[test]
    fn test_preferred_master_lookup() {
        let mut cluster = cluster_with_two_servers();
        assert!(cluster.found_preferred_master().is_none());
        cluster.conf.pref_master = "db2:3306".to_string();
        assert_eq!(cluster.found_preferred_master(), Some(1));
    }

    #[test]
    fn test_server_lookup_by_url() {
        let cluster = cluster_with_two_servers();
        assert_eq!(cluster.get_server_from_url("db2:3306"), Some(1));
        assert_eq!(cluster.get_server_from_url("db9:3306"), None);
    }

    #[test]
    fn test_save_writes_snapshot() {
        let tmp = TempDir::new().unwrap();
        let mut cluster = cluster_with_two_servers();
        cluster.conf.working_dir = tmp.path().to_path_buf();
        cluster.conf.cfg_group = "unit".to_string();
        cluster.save().unwrap();
        let raw = std::fs::read_to_string(tmp.path().join("unit.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["master"], "db1:3306");
        assert_eq!(parsed["servers"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_relay_lookup_skips_failed() {
        let mut cluster = cluster_with_two_servers();
        let r = cluster.add_server(ServerDescriptor::new(
            "relay",
            "3306",
            3,
            DbVersion::mariadb(10, 3),
            None,
        ));
        cluster.server_mut(r).is_relay = true;
        assert_eq!(cluster.get_relay_server(), Some(r));
        cluster.server_mut(r).role = ServerRole::Failed;
        assert_eq!(cluster.get_relay_server(), None);
    }
}
