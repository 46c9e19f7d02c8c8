//! Crash Record
//!
//! Serializable snapshot of one transition, written at promotion time and
//! immutable afterwards. It carries enough of the old primary's final
//! coordinates and the candidate's post-promotion state for the rejoin
//! subsystem to reattach the demoted server without losing transactions.
//! The JSON field names are the durable on-disk contract.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::CrashError;
use crate::position::GtidList;

/// Snapshot of a failover/switchover event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Crash {
    /// Old primary URL.
    #[serde(rename = "URL")]
    pub url: String,

    /// URL of the elected primary.
    #[serde(rename = "ElectedMasterURL")]
    pub elected_master_url: String,

    /// Old primary's last log file as observed by the candidate before
    /// promotion.
    #[serde(rename = "FailoverMasterLogFile")]
    pub failover_master_log_file: String,

    /// Offset matching `failover_master_log_file`.
    #[serde(rename = "FailoverMasterLogPos")]
    pub failover_master_log_pos: String,

    /// Candidate's own binary-log file after draining its relay logs.
    #[serde(rename = "NewMasterLogFile")]
    pub new_master_log_file: String,

    /// Offset matching `new_master_log_file`.
    #[serde(rename = "NewMasterLogPos")]
    pub new_master_log_pos: String,

    /// Global-id list in the candidate's native dialect at promotion.
    #[serde(rename = "FailoverIOGtid")]
    pub failover_io_gtid: GtidList,

    /// Candidate's semi-sync replica flag at the moment of promotion.
    #[serde(rename = "FailoverSemiSyncSlaveStatus")]
    pub failover_semi_sync_slave_status: bool,
}

impl Crash {
    /// Persist the record as pretty JSON, fsynced. Parent directories are
    /// created (the ring variant nests records one level down).
    pub fn save(&self, path: &Path) -> Result<(), CrashError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(payload.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Read a record back, for rejoin and post-mortem tooling.
    pub fn load(path: &Path) -> Result<Self, CrashError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Crash {
        Crash {
            url: "db1:3306".to_string(),
            elected_master_url: "db2:3306".to_string(),
            failover_master_log_file: "mysql-bin.000042".to_string(),
            failover_master_log_pos: "107".to_string(),
            new_master_log_file: "mysql-bin.000001".to_string(),
            new_master_log_pos: "4".to_string(),
            failover_io_gtid: GtidList::parse("0-1-100,1-2-50"),
            failover_semi_sync_slave_status: true,
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cluster.crash.20250101120000.json");
        let crash = sample();
        crash.save(&path).unwrap();
        assert_eq!(Crash::load(&path).unwrap(), crash);
    }

    #[test]
    fn test_save_creates_nested_directories() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("group").join("crash-20250101120000.json");
        sample().save(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_field_names_are_the_disk_contract() {
        let json = serde_json::to_string(&sample()).unwrap();
        for field in [
            "URL",
            "ElectedMasterURL",
            "FailoverMasterLogFile",
            "FailoverMasterLogPos",
            "NewMasterLogFile",
            "NewMasterLogPos",
            "FailoverIOGtid",
            "FailoverSemiSyncSlaveStatus",
        ] {
            assert!(json.contains(field), "missing field {field}");
        }
    }

    #[test]
    fn test_same_record_saved_twice_has_identical_payload() {
        let tmp = TempDir::new().unwrap();
        let first = tmp.path().join("c.crash.20250101120000.json");
        let second = tmp.path().join("c.crash.20250101120001.json");
        let crash = sample();
        crash.save(&first).unwrap();
        crash.save(&second).unwrap();
        assert_eq!(
            std::fs::read_to_string(first).unwrap(),
            std::fs::read_to_string(second).unwrap()
        );
    }
}
