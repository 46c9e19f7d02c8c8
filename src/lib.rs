//! replicore - failover/switchover orchestration core for primary/replica
//! SQL replication clusters
//!
//! Takes a cluster of database servers, one designated writable primary
//! and its replicas, and on demand or on primary failure promotes a
//! replica and reconverges every other server to replicate from it,
//! preserving as much committed data as possible and never producing two
//! writable primaries simultaneously.
//!
//! The crate is a library driven by a control plane that has already
//! decided a transition is needed. Topology discovery, health probing,
//! real SQL drivers, proxy adapters and the CLI/HTTP surfaces are
//! external collaborators behind the narrow interfaces in [`driver`] and
//! [`proxy`].
//!
//! ```no_run
//! use replicore::cluster::Cluster;
//! use replicore::config::FailoverConfig;
//! use replicore::topology::Topology;
//!
//! let mut cluster = Cluster::new(FailoverConfig::default(), Topology::MasterSlave);
//! // ... discovery registers servers, sets the primary and the replicas ...
//! let promoted = cluster.master_failover(false); // planned switchover
//! assert!(promoted || !cluster.is_in_failover());
//! ```

pub mod cluster;
pub mod config;
pub mod driver;
pub mod election;
pub mod failover;
pub mod position;
pub mod proxy;
pub mod state;
pub mod testkit;
pub mod topology;

pub use cluster::Cluster;
pub use config::FailoverConfig;
pub use driver::{ChangeMasterMode, ChangeMasterOpt, DriverError, ServerConn, SlaveStatus};
pub use failover::Crash;
pub use position::{BinlogPosition, Gtid, GtidList};
pub use state::{FailoverScope, StateCode, StateMachine};
pub use topology::{DbVersion, Flavor, ServerDescriptor, ServerRole, Topology};
