//! Server Descriptor
//!
//! In-memory handle for one database server: identity, live connection
//! (absent on a failed server), flavor, role state, policy flags, and the
//! last-observed replication snapshot. Descriptors are allocated by the
//! discovery collaborator; the orchestrators mutate only role state, read
//! mode, and the freeze bookkeeping.

use std::sync::Arc;

use tracing::warn;

use super::version::DbVersion;
use crate::driver::{DriverResult, EventInfo, ServerConn, SlaveStatus};
use crate::position::GtidList;

/// Role state of a server inside its cluster.
///
/// At quiescence a single-primary topology holds exactly one descriptor in
/// `Primary` state; the replica set plus the primary partitions the
/// non-ignored, non-failed servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerRole {
    Primary,
    Replica,
    /// Intermediate binlog server fanning out to leaf replicas.
    Relay,
    Failed,
}

impl ServerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "Primary",
            Self::Replica => "Replica",
            Self::Relay => "Relay",
            Self::Failed => "Failed",
        }
    }
}

/// Handle for one database server.
pub struct ServerDescriptor {
    pub host: String,
    pub port: String,
    /// Unique replication server id.
    pub server_id: u64,
    /// `host:port`, the identity used in logs, config and crash records.
    pub url: String,
    /// Live connection; a failed server has none.
    pub conn: Option<Arc<dyn ServerConn>>,
    pub version: DbVersion,
    /// MariaDB-dialect global-id replication actually in use.
    pub have_mariadb_gtid: bool,
    pub role: ServerRole,

    // Policy flags, owned by the discovery/config collaborators.
    pub is_ignored: bool,
    pub is_preferred: bool,
    pub is_maintenance: bool,
    pub is_relay: bool,

    /// Named upstream for multi-source replication; empty for the default
    /// source.
    pub replication_source_name: String,
    /// Name under which the proxy layer knows this server; handed to hook
    /// scripts.
    pub proxy_server_name: String,
    /// Relay server understands global-id positioning.
    pub mxs_have_gtid: bool,

    // Last-observed state, refreshed before elections and phase changes.
    /// Most recent successfully fetched replication status; survives the
    /// server's death so the topology around it can still be resolved.
    pub slave_status: Option<SlaveStatus>,
    pub binary_log_file: String,
    pub binary_log_pos: String,
    pub current_gtid: GtidList,
    pub slave_gtid: GtidList,
    pub gtid_binlog_pos: GtidList,
    pub have_semi_sync: bool,
    pub semi_sync_slave_status: bool,
    pub event_status: Vec<EventInfo>,

    pub fail_count: u32,

    /// `max_connections` value saved by `freeze`, restored on demotion.
    saved_max_connections: Option<String>,
}

impl ServerDescriptor {
    pub fn new(
        host: impl Into<String>,
        port: impl Into<String>,
        server_id: u64,
        version: DbVersion,
        conn: Option<Arc<dyn ServerConn>>,
    ) -> Self {
        let host = host.into();
        let port = port.into();
        let url = format!("{host}:{port}");
        Self {
            host,
            port,
            server_id,
            url,
            conn,
            version,
            have_mariadb_gtid: false,
            role: ServerRole::Replica,
            is_ignored: false,
            is_preferred: false,
            is_maintenance: false,
            is_relay: false,
            replication_source_name: String::new(),
            proxy_server_name: String::new(),
            mxs_have_gtid: false,
            slave_status: None,
            binary_log_file: String::new(),
            binary_log_pos: String::new(),
            current_gtid: GtidList::new(),
            slave_gtid: GtidList::new(),
            gtid_binlog_pos: GtidList::new(),
            have_semi_sync: false,
            semi_sync_slave_status: false,
            event_status: Vec::new(),
            fail_count: 0,
            saved_max_connections: None,
        }
    }

    pub fn conn(&self) -> Option<Arc<dyn ServerConn>> {
        self.conn.clone()
    }

    /// Global-id replication in use, either dialect.
    pub fn has_gtid_replication(&self) -> bool {
        self.have_mariadb_gtid || !self.current_gtid.is_empty()
    }

    /// Re-read the last-observed snapshot from the server. Failures leave
    /// the previous snapshot in place.
    pub fn refresh(&mut self) {
        let Some(conn) = self.conn.clone() else {
            return;
        };
        match conn.get_master_status() {
            Ok(ms) => {
                self.binary_log_file = ms.file;
                self.binary_log_pos = ms.position;
            }
            Err(e) => warn!("Could not refresh master status on {}: {}", self.url, e),
        }
        if let Ok(ss) = conn.get_slave_status(&self.replication_source_name) {
            self.slave_status = Some(ss);
        }
        match conn.get_replication_vars() {
            Ok(vars) => {
                self.current_gtid = GtidList::parse(&vars.current_gtid);
                self.slave_gtid = GtidList::parse(&vars.slave_gtid);
                self.gtid_binlog_pos = GtidList::parse(&vars.gtid_binlog_pos);
                self.semi_sync_slave_status = vars.semi_sync_slave_status;
                self.have_semi_sync = vars.have_semi_sync;
                self.event_status = vars.event_status;
            }
            Err(e) => warn!("Could not refresh variables on {}: {}", self.url, e),
        }
    }

    /// Fence writes ahead of demotion: go read-only, save the connection
    /// ceiling and cap it so only privileged sessions remain.
    pub fn freeze(&mut self) -> bool {
        let Some(conn) = self.conn.clone() else {
            return false;
        };
        if let Err(e) = conn.set_read_only(true) {
            warn!("Could not set {} read-only while freezing: {}", self.url, e);
            return false;
        }
        match conn.get_max_connections() {
            Ok(value) => self.saved_max_connections = Some(value),
            Err(e) => {
                warn!("Could not read max_connections on {}: {}", self.url, e);
                return false;
            }
        }
        if let Err(e) = conn.set_max_connections("0") {
            warn!("Could not cap connections on {}: {}", self.url, e);
            return false;
        }
        true
    }

    /// Undo the freeze cap once the server is a replica again.
    pub fn restore_max_connections(&mut self) {
        let Some(conn) = self.conn.clone() else {
            return;
        };
        if let Some(value) = self.saved_max_connections.take() {
            if let Err(e) = conn.set_max_connections(&value) {
                warn!("Could not restore max_connections on {}: {}", self.url, e);
            }
        }
    }

    /// Park the server for a later rejoin pass.
    pub fn set_maintenance(&mut self) {
        self.is_maintenance = true;
    }

    pub fn set_read_only(&self) -> DriverResult<()> {
        match &self.conn {
            Some(conn) => conn.set_read_only(true),
            None => Ok(()),
        }
    }

    pub fn set_read_write(&self) -> DriverResult<()> {
        match &self.conn {
            Some(conn) => conn.set_read_only(false),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ServerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDescriptor")
            .field("url", &self.url)
            .field("server_id", &self.server_id)
            .field("role", &self.role)
            .field("version", &self.version)
            .field("connected", &self.conn.is_some())
            .finish()
    }
}
