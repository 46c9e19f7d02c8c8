//! Database Driver Contract
//!
//! The orchestrator never speaks SQL itself. Everything it needs from a
//! database server goes through [`ServerConn`], one implementation per
//! supported flavor (MariaDB >= 10, MariaDB 10.1, MySQL 5.6, MySQL/Percona
//! 5.7). Implementations live with the connection-pool collaborator outside
//! this crate; tests use the scriptable double in [`crate::testkit`].
//!
//! All operations are synchronous. Bounded waits (`master_pos_wait`,
//! `master_wait_gtid`, the flush variants) enforce their own internal
//! timeouts; the orchestrator never cancels a call in flight.

mod errors;

pub use errors::{DriverError, DriverResult};

use crate::position::BinlogPosition;

/// Binary-log coordinates of a server acting as a primary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MasterStatus {
    /// Current binary-log file, `name.NNNNNN`.
    pub file: String,
    /// Offset inside the file, decimal string.
    pub position: String,
}

/// One row of replication status for a named upstream.
///
/// Positions stay strings end to end: they are compared through
/// [`BinlogPosition::score`] and written verbatim into redirect statements
/// and crash records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlaveStatus {
    /// Upstream host as configured on this server.
    pub master_host: String,
    /// Upstream port as configured on this server.
    pub master_port: String,
    /// Upstream binary-log file the IO thread is reading.
    pub master_log_file: String,
    /// Offset the IO thread has read up to.
    pub read_master_log_pos: String,
    /// IO-side global-id list (MariaDB dialect).
    pub gtid_io_pos: String,
    /// Executed global-id set (MySQL dialect).
    pub executed_gtid_set: String,
    /// Observed replication lag; absent while the apply thread catches up
    /// after a restart.
    pub seconds_behind_master: Option<i64>,
    /// Apply thread running.
    pub slave_sql_running: bool,
    /// IO thread running.
    pub slave_io_running: bool,
}

/// Scheduled-event state as tracked by the server catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    /// Fires on this server.
    Enabled,
    /// Never fires.
    Disabled,
    /// Defined but suppressed because the server is a replica.
    SlavesideDisabled,
}

/// One scheduled event on a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventInfo {
    pub db: String,
    pub name: String,
    pub status: EventState,
}

/// Replication-related server variables read during a refresh.
#[derive(Debug, Clone, Default)]
pub struct ReplicationVars {
    /// `gtid_current_pos` (or the executed set on MySQL).
    pub current_gtid: String,
    /// `gtid_slave_pos`.
    pub slave_gtid: String,
    /// `gtid_binlog_pos`.
    pub gtid_binlog_pos: String,
    /// Semi-sync replica handshake currently in sync.
    pub semi_sync_slave_status: bool,
    /// Semi-sync plugin loaded.
    pub have_semi_sync: bool,
    /// Scheduled events defined on the server.
    pub event_status: Vec<EventInfo>,
}

/// Replication pointing mode for a redirect statement.
///
/// The SQL generator on the driver side is a single dispatch over this
/// variant; the orchestrator only ever selects one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeMasterMode {
    /// Explicit `(file, offset)` coordinates.
    Positional,
    /// MySQL `MASTER_AUTO_POSITION = 1`.
    MasterAutoPosition,
    /// MariaDB `MASTER_USE_GTID = slave_pos`.
    SlavePos,
    /// MariaDB `MASTER_USE_GTID = current_pos`.
    CurrentPos,
    /// Relay-server dialect without global-id support.
    Mxs,
    /// Flavor default; no positioning clause emitted.
    #[default]
    Unset,
}

impl ChangeMasterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positional => "POSITIONAL",
            Self::MasterAutoPosition => "MASTER_AUTO_POSITION",
            Self::SlavePos => "SLAVE_POS",
            Self::CurrentPos => "CURRENT_POS",
            Self::Mxs => "MXS",
            Self::Unset => "",
        }
    }
}

/// Options for a replication redirect.
#[derive(Debug, Clone, Default)]
pub struct ChangeMasterOpt {
    pub host: String,
    pub port: String,
    pub user: String,
    pub password: String,
    /// `MASTER_CONNECT_RETRY`, decimal string.
    pub retry: String,
    /// `MASTER_HEARTBEAT_PERIOD`, decimal string.
    pub heartbeat: String,
    pub mode: ChangeMasterMode,
    /// Only read in `Positional` mode.
    pub logfile: String,
    /// Only read in `Positional` mode.
    pub logpos: String,
    pub ssl: bool,
}

/// A live connection to one database server.
///
/// A failed server legitimately has no connection at all; descriptors
/// carry `Option<Arc<dyn ServerConn>>`.
pub trait ServerConn: Send + Sync {
    /// Number of writes running longer than `max_seconds` on the server.
    fn check_long_running_writes(&self, max_seconds: i64) -> DriverResult<u32>;

    /// Plain `FLUSH TABLES` (binlogged; used as the fake transaction to
    /// advance the promoted primary's global-id).
    fn flush_tables(&self) -> DriverResult<()>;

    /// `FLUSH NO_WRITE_TO_BINLOG TABLES`.
    fn flush_tables_no_log(&self) -> DriverResult<()>;

    /// MariaDB >= 10.1 flush with a server-side statement timeout.
    fn mariadb_flush_tables_no_log_timeout(&self, timeout_secs: i64) -> DriverResult<()>;

    /// `FLUSH TABLES WITH READ LOCK`.
    fn flush_tables_with_read_lock(&self) -> DriverResult<()>;

    /// `UNLOCK TABLES`.
    fn unlock_tables(&self) -> DriverResult<()>;

    /// `FLUSH LOGS` (rotates the binary log).
    fn flush_logs(&self) -> DriverResult<()>;

    /// `RESET MASTER` (drops all binary logs).
    fn reset_master(&self) -> DriverResult<()>;

    /// Binary-log coordinates of this server.
    fn get_master_status(&self) -> DriverResult<MasterStatus>;

    /// Replication status for the named upstream.
    fn get_slave_status(&self, source_name: &str) -> DriverResult<SlaveStatus>;

    /// Stop both replication threads.
    fn stop_slave(&self) -> DriverResult<()>;

    /// Stop only the IO thread.
    fn stop_slave_io_thread(&self) -> DriverResult<()>;

    /// Start replication.
    fn start_slave(&self) -> DriverResult<()>;

    /// Drop the replication configuration (`RESET SLAVE ALL`).
    fn reset_slave(&self) -> DriverResult<()>;

    /// Repoint replication; the SQL emitted depends on `opt.mode`.
    fn change_master(&self, opt: &ChangeMasterOpt) -> DriverResult<()>;

    /// Block until the apply thread reaches `(file, pos)` or the timeout
    /// expires.
    fn master_pos_wait(&self, file: &str, pos: &str, timeout_secs: u32) -> DriverResult<()>;

    /// Block until the apply thread reaches the global-id position or the
    /// timeout expires.
    fn master_wait_gtid(&self, gtid: &str, timeout_secs: u32) -> DriverResult<()>;

    /// Block until the apply thread has consumed every relay log already
    /// fetched by the IO thread. Bounded internally by the driver.
    fn read_all_relay_logs(&self) -> DriverResult<()>;

    /// Set one scheduled event to the given state.
    fn set_event_status(&self, event: &EventInfo, status: EventState) -> DriverResult<()>;

    /// Toggle the event scheduler.
    fn set_event_scheduler(&self, enable: bool) -> DriverResult<()>;

    /// Toggle `read_only`.
    fn set_read_only(&self, read_only: bool) -> DriverResult<()>;

    /// Force the apply-side global-id state (`gtid_slave_pos`).
    fn set_gtid_slave_pos(&self, gtid: &str) -> DriverResult<()>;

    /// Current `max_connections` value.
    fn get_max_connections(&self) -> DriverResult<String>;

    /// Set `max_connections`; `"0"` retains only privileged sessions.
    fn set_max_connections(&self, value: &str) -> DriverResult<()>;

    /// Whether the server runs with MySQL-dialect global-id replication.
    fn has_mysql_gtid(&self) -> DriverResult<bool>;

    /// Driver-level election prerequisites: the server answers pings and
    /// writes binary logs.
    fn check_slave_prerequisites(&self) -> bool;

    /// Most recent pseudo-identifier marker found in the binary log.
    fn get_last_pseudo_gtid(&self) -> DriverResult<String>;

    /// Coordinates of a pseudo-identifier marker in this server's log.
    fn get_binlog_pos_from_pseudo_gtid(&self, marker: &str) -> DriverResult<BinlogPosition>;

    /// Number of events recorded after the given coordinates.
    fn get_number_of_events_after_pos(&self, pos: &BinlogPosition) -> DriverResult<u64>;

    /// Coordinates reached after skipping `skip` events from `pos`.
    fn get_binlog_pos_after_skip_number_of_events(
        &self,
        pos: &BinlogPosition,
        skip: u64,
    ) -> DriverResult<BinlogPosition>;

    /// Replication-related variables for a descriptor refresh.
    fn get_replication_vars(&self) -> DriverResult<ReplicationVars>;
}
