//! Planned switchover scenarios driven end to end against scripted
//! connections: the happy path, preferred-primary rigging, the MySQL 5.7
//! global-id path, hook invocation, and every phase-1 abort.

use std::fs;
use std::time::Duration;

use replicore::testkit::{self, FakeConn};
use replicore::topology::{ServerDescriptor, ServerRole, Topology};
use replicore::{Cluster, Crash, DbVersion, FailoverConfig, ServerConn};
use tempfile::TempDir;

fn with_working_dir(cluster: &mut Cluster, tmp: &TempDir, group: &str) {
    cluster.conf_mut().working_dir = tmp.path().to_path_buf();
    cluster.conf_mut().cfg_group = group.to_string();
}

fn crash_files(tmp: &TempDir) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = fs::read_dir(tmp.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.file_name().unwrap().to_string_lossy().contains(".crash."))
        .collect();
    files.sort();
    files
}

#[test]
fn test_happy_switchover_promotes_first_replica() {
    let tmp = TempDir::new().unwrap();
    let (mut cluster, _conns) = testkit::mariadb_cluster(3);
    with_working_dir(&mut cluster, &tmp, "happy");

    assert!(cluster.master_failover(false));

    // the primary moved onto the elected replica
    assert_eq!(cluster.master_url(), Some("db2:3306"));
    assert!(!cluster.is_in_failover());

    // exactly one primary at quiescence
    let primaries = cluster
        .servers()
        .iter()
        .filter(|s| s.role == ServerRole::Primary)
        .count();
    assert_eq!(primaries, 1);

    // no replica lost: old primary re-entered the pool
    assert_eq!(cluster.slave_indices().len(), 2);
    assert_eq!(cluster.server(0).role, ServerRole::Replica);
}

#[test]
fn test_switchover_side_effects_on_each_server() {
    let tmp = TempDir::new().unwrap();
    let (mut cluster, conns) = testkit::mariadb_cluster(3);
    with_working_dir(&mut cluster, &tmp, "effects");

    assert!(cluster.master_failover(false));

    let old = &conns[0];
    let cand = &conns[1];
    let other = &conns[2];

    // old primary: deadline flush, freeze, read lock, unlock, gtid
    // redirect at the new primary, restarted, limits restored
    assert!(old.saw_prefix("flush-tables-no-log-timeout"));
    assert!(old.saw("flush-tables-read-lock"));
    assert!(old.saw("set-max-connections 0"));
    assert!(old.saw("unlock-tables"));
    assert_eq!(old.change_master_modes(), vec!["CURRENT_POS"]);
    assert!(old.saw_prefix("change-master mode=CURRENT_POS host=db2:3306"));
    assert!(old.saw("start-slave"));
    assert!(old.saw("set-max-connections 151"));
    assert!(old.saw("set-read-only true"));

    // candidate: drained, replication dropped, writable, fake transaction
    assert!(cand.saw("read-all-relay-logs"));
    assert!(cand.saw("stop-slave"));
    assert!(cand.saw("reset-slave"));
    assert!(cand.saw("set-read-only false"));
    assert!(cand.saw("flush-tables"));

    // remaining replica: caught up, repointed with gtid, left read-only
    assert!(other.saw_prefix("master-wait-gtid"));
    assert_eq!(other.change_master_modes(), vec!["SLAVE_POS"]);
    assert!(other.saw_prefix("change-master mode=SLAVE_POS host=db2:3306"));
    assert!(other.saw("start-slave"));
    assert!(other.saw("set-read-only true"));
}

#[test]
fn test_switchover_writes_one_crash_record() {
    let tmp = TempDir::new().unwrap();
    let (mut cluster, _conns) = testkit::mariadb_cluster(3);
    with_working_dir(&mut cluster, &tmp, "record");

    assert!(cluster.master_failover(false));

    assert_eq!(cluster.crashes().len(), 1);
    let files = crash_files(&tmp);
    assert_eq!(files.len(), 1);
    let crash = Crash::load(&files[0]).unwrap();
    assert_eq!(crash.url, "db1:3306");
    assert_eq!(crash.elected_master_url, "db2:3306");
    assert_eq!(crash.failover_master_log_file, "mariadb-bin.000010");
    assert_eq!(crash.failover_io_gtid.seq_sum(), 100);

    // cluster snapshot persisted alongside
    assert!(tmp.path().join("record.json").exists());
}

#[test]
fn test_preferred_master_wins_regardless_of_position() {
    let tmp = TempDir::new().unwrap();
    let (mut cluster, conns) = testkit::mariadb_cluster(4);
    with_working_dir(&mut cluster, &tmp, "pref");

    // db4 is far ahead, db3 is preferred
    conns[1].set_slave_gtid("0-2-100");
    conns[2].set_slave_gtid("0-3-200");
    conns[3].set_slave_gtid("0-4-900");
    cluster.conf_mut().pref_master = "db3:3306".to_string();

    assert!(cluster.master_failover(false));
    assert_eq!(cluster.master_url(), Some("db3:3306"));
}

#[test]
fn test_mysql57_switchover_uses_auto_position_everywhere() {
    let tmp = TempDir::new().unwrap();
    let (mut cluster, conns) = testkit::mysql57_cluster(3);
    with_working_dir(&mut cluster, &tmp, "mysql57");

    assert!(cluster.master_failover(false));
    assert_eq!(cluster.master_url(), Some("db2:3306"));

    // demoted primary and remaining replica both ride the executed set
    assert_eq!(conns[0].change_master_modes(), vec!["MASTER_AUTO_POSITION"]);
    assert_eq!(conns[2].change_master_modes(), vec!["MASTER_AUTO_POSITION"]);

    // candidate stop sequence for 5.7: full stop then IO thread
    assert!(conns[1].saw("stop-slave"));
    assert!(conns[1].saw("stop-slave-io-thread"));

    // crash record carries the gtid list built from the executed set
    assert_eq!(cluster.crashes()[0].failover_io_gtid.seq_sum(), 100);
    assert!(!cluster.crashes()[0].failover_io_gtid.is_empty());
}

#[test]
fn test_hooks_receive_host_contract() {
    let tmp = TempDir::new().unwrap();
    let (mut cluster, _conns) = testkit::mariadb_cluster(3);
    with_working_dir(&mut cluster, &tmp, "hooks");

    let marker = tmp.path().join("hook-args");
    let script = tmp.path().join("hook.sh");
    fs::write(
        &script,
        format!("#!/bin/sh\necho \"$1 $2 $3 $4\" >> {}\n", marker.display()),
    )
    .unwrap();
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script, perms).unwrap();
    }
    cluster.conf_mut().pre_script = script.display().to_string();
    cluster.conf_mut().post_script = script.display().to_string();

    assert!(cluster.master_failover(false));

    let recorded = fs::read_to_string(&marker).unwrap();
    let lines: Vec<_> = recorded.lines().collect();
    // pre and post hooks, same positional contract
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "db1 db2 3306 3306");
    assert_eq!(lines[1], "db1 db2 3306 3306");
}

#[test]
fn test_switchover_aborts_without_master_connection() {
    let mut cluster = Cluster::new(FailoverConfig::default(), Topology::MasterSlave);
    let m = cluster.add_server(ServerDescriptor::new(
        "db1",
        "3306",
        1,
        DbVersion::mariadb(10, 3),
        None,
    ));
    let conn = FakeConn::healthy_mariadb();
    let s = cluster.add_server(ServerDescriptor::new(
        "db2",
        "3306",
        2,
        DbVersion::mariadb(10, 3),
        Some(conn as std::sync::Arc<dyn ServerConn>),
    ));
    cluster.set_master(m);
    cluster.add_slave(s);

    assert!(!cluster.master_failover(false));
    assert!(!cluster.is_in_failover());
    assert_eq!(cluster.master_url(), Some("db1:3306"));
}

#[test]
fn test_switchover_aborts_on_long_running_writes() {
    let (mut cluster, conns) = testkit::mariadb_cluster(3);
    conns[0].set_long_running_writes(2);

    assert!(!cluster.master_failover(false));
    assert!(!cluster.is_in_failover());
    // nothing was elected or touched
    assert_eq!(cluster.master_url(), Some("db1:3306"));
    assert!(cluster.crashes().is_empty());
    assert!(!conns[1].saw("stop-slave"));
}

#[test]
fn test_switchover_aborts_on_flush_deadline() {
    let (mut cluster, conns) = testkit::mariadb_cluster(3);
    cluster.conf_mut().switch_wait_trx = 1;
    conns[0].set_flush_delay(Duration::from_secs(3));

    assert!(!cluster.master_failover(false));
    assert!(!cluster.is_in_failover());
    assert_eq!(cluster.master_url(), Some("db1:3306"));
    assert_eq!(cluster.slave_indices().len(), 2);
}

#[test]
fn test_switchover_aborts_on_flush_failure() {
    let (mut cluster, conns) = testkit::mariadb_cluster(3);
    conns[0].set_flush_fails();

    assert!(!cluster.master_failover(false));
    assert!(!cluster.is_in_failover());
    assert_eq!(cluster.master_url(), Some("db1:3306"));
}

#[test]
fn test_switchover_aborts_when_no_candidate() {
    let tmp = TempDir::new().unwrap();
    let (mut cluster, conns) = testkit::mariadb_cluster(3);
    with_working_dir(&mut cluster, &tmp, "nocand");
    conns[1].stop_sql_thread();
    conns[2].stop_sql_thread();

    assert!(!cluster.master_failover(false));
    assert!(!cluster.is_in_failover());
    // abort purity: no partial swap, no crash record
    assert_eq!(cluster.master_url(), Some("db1:3306"));
    assert_eq!(cluster.server(0).role, ServerRole::Primary);
    assert_eq!(cluster.slave_indices().len(), 2);
    assert!(cluster.crashes().is_empty());
    assert!(crash_files(&tmp).is_empty());
}
