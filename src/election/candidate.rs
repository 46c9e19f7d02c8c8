//! Candidate Selection
//!
//! Replicas are ranked on two scores: the global-id sequence sum and the
//! positional score built from the upstream log coordinates. The sequence
//! sum wins whenever any replica has one; the positional score is the
//! fallback for clusters without global-id replication. Ties break on the
//! caller-provided replica order (stable sort, list order preserved).

use tracing::{debug, info};

use crate::cluster::Cluster;
use crate::position::{BinlogPosition, GtidList};
use crate::state::StateCode;
use crate::topology::ServerRole;

/// Election bookkeeping for one replica during a failover.
#[derive(Debug, Clone, Default)]
struct TrackPos {
    url: String,
    /// Position in the replica list.
    index: usize,
    pos: u64,
    seq: u64,
    preferred: bool,
    ignored_conf: bool,
    ignored_relay: bool,
    ignored_multi_primary: bool,
    ignored_replication: bool,
}

impl TrackPos {
    fn passes_skip_flags(&self) -> bool {
        !self.ignored_relay
            && !self.ignored_multi_primary
            && !self.ignored_replication
            && !self.ignored_conf
    }
}

impl Cluster {
    /// Planned-transition election. Walks the replica list in order,
    /// filtering through both eligibility layers, and short-circuits on
    /// the preferred primary. Returns the position in the replica list.
    pub fn elect_switchover_candidate(&self, forcing_log: bool) -> Option<usize> {
        let ll = self.slaves.len();
        let mut seq_list = vec![0u64; ll];
        let mut pos_list = vec![0u64; ll];
        let mut hiseq = 0usize;
        let mut hipos = 0usize;
        let mut max = 0u64;
        let mut maxpos = 0u64;

        for (i, &sidx) in self.slaves.iter().enumerate() {
            let sl = &self.servers[sidx];
            if sl.is_ignored {
                self.sme.add_state(
                    StateCode::IgnoredReplica,
                    format!("Slave {} is in the ignored list", sl.url),
                );
                continue;
            }
            if sl.is_relay {
                self.sme.add_state(
                    StateCode::RelayReplica,
                    format!("Slave {} is a relay and cannot be elected", sl.url),
                );
                continue;
            }
            if self.conf.multi_master && sl.role == ServerRole::Primary {
                self.sme.add_state(
                    StateCode::MultiPrimaryDesignated,
                    format!("Slave {} is designated primary in multi-primary", sl.url),
                );
                continue;
            }

            // The next two layers require the old primary to be up; this
            // election only runs for planned transitions.
            if !self.is_slave_electable_for_switchover(sidx, forcing_log) {
                self.sme.add_state(
                    StateCode::NotElectableForSwitchover,
                    format!("Slave {} is not electable for switchover", sl.url),
                );
                continue;
            }
            if !self.is_slave_electable(sidx, forcing_log) {
                self.sme.add_state(
                    StateCode::NotElectable,
                    format!("Slave {} is not electable", sl.url),
                );
                continue;
            }

            // Rig the election if this replica is the preferred primary.
            if !self.conf.pref_master.is_empty() && sl.url == self.conf.pref_master {
                debug!("Election rig: {} elected as preferred master", sl.url);
                return Some(i);
            }

            let ss = sl
                .conn
                .clone()
                .and_then(|c| c.get_slave_status(&sl.replication_source_name).ok());
            if ss.is_none() && !self.conf.fail_restart_unsafe {
                self.sme.add_state(
                    StateCode::NoReplicationStatus,
                    format!("Slave {} has no replication status", sl.url),
                );
                continue;
            }

            // Fake position when the replica never connected upstream.
            let coord = match &ss {
                Some(ss) => BinlogPosition::new(&ss.master_log_file, &ss.read_master_log_pos),
                None => BinlogPosition::floor(),
            };
            if !coord.file.contains('.') {
                continue;
            }
            pos_list[i] = coord.score().unwrap_or(0);

            let seqnos = match &ss {
                Some(ss) => {
                    if self.master_is_failed() {
                        GtidList::parse(&ss.gtid_io_pos)
                    } else {
                        sl.slave_gtid.clone()
                    }
                }
                None => GtidList::floor(),
            };
            seq_list[i] = seqnos.seq_sum();

            if seq_list[i] > max {
                max = seq_list[i];
                hiseq = i;
            }
            if pos_list[i] > maxpos {
                maxpos = pos_list[i];
                hipos = i;
            }
        }

        if max > 0 {
            return Some(hiseq);
        }
        if maxpos > 0 {
            return Some(hipos);
        }
        None
    }

    /// Unplanned-transition election. Scores every replica, then picks by
    /// descending sequence sum with the preferred replica winning ties,
    /// falling back to positional ordering. The switchover-only predicate
    /// is never consulted and the preference never short-circuits.
    pub fn elect_failover_candidate(&self, forcing_log: bool) -> Option<usize> {
        let ll = self.slaves.len();
        let mut track: Vec<TrackPos> = Vec::with_capacity(ll);
        let mut maxseq = 0u64;
        let mut maxpos = 0u64;

        for (i, &sidx) in self.slaves.iter().enumerate() {
            let sl = &self.servers[sidx];
            let mut tp = TrackPos {
                url: sl.url.clone(),
                index: i,
                preferred: sl.is_preferred,
                ignored_conf: sl.is_ignored,
                ignored_relay: sl.is_relay,
                ..Default::default()
            };

            if sl.is_relay {
                self.sme.add_state(
                    StateCode::RelayReplica,
                    format!("Slave {} is a relay and cannot be elected", sl.url),
                );
                track.push(tp);
                continue;
            }
            if self.conf.multi_master && sl.role == ServerRole::Primary {
                self.sme.add_state(
                    StateCode::MultiPrimaryDesignated,
                    format!("Slave {} is designated primary in multi-primary", sl.url),
                );
                tp.ignored_multi_primary = true;
                track.push(tp);
                continue;
            }

            let ss = sl
                .conn
                .clone()
                .and_then(|c| c.get_slave_status(&sl.replication_source_name).ok());
            if ss.is_none() && !self.conf.fail_restart_unsafe {
                self.sme.add_state(
                    StateCode::NoReplicationStatus,
                    format!("Slave {} has no replication status", sl.url),
                );
                tp.ignored_replication = true;
                track.push(tp);
                continue;
            }
            tp.ignored_replication = !self.is_slave_electable(sidx, false);

            let coord = match &ss {
                Some(ss) => BinlogPosition::new(&ss.master_log_file, &ss.read_master_log_pos),
                None => BinlogPosition::floor(),
            };
            if !coord.file.contains('.') {
                track.push(tp);
                continue;
            }
            tp.pos = coord.score().unwrap_or(0);

            let seqnos = match &ss {
                Some(ss) => {
                    if self.master_is_failed() {
                        GtidList::parse(&ss.gtid_io_pos)
                    } else {
                        sl.slave_gtid.clone()
                    }
                }
                None => GtidList::floor(),
            };
            tp.seq = seqnos.seq_sum();

            maxseq = maxseq.max(tp.seq);
            maxpos = maxpos.max(tp.pos);
            track.push(tp);
        }

        track.sort_by(|a, b| b.seq.cmp(&a.seq));
        if forcing_log {
            info!("Election matrix: {:?}", track);
        }

        if maxseq > 0 {
            // Preferred replica wins among the sequence leaders.
            if let Some(p) = track
                .iter()
                .find(|p| p.seq == maxseq && p.passes_skip_flags() && p.preferred)
            {
                return Some(p.index);
            }
            if let Some(p) = track
                .iter()
                .find(|p| p.seq == maxseq && p.passes_skip_flags())
            {
                return Some(p.index);
            }
            return None;
        }

        track.sort_by(|a, b| b.pos.cmp(&a.pos));
        if maxpos > 0 {
            if let Some(p) = track
                .iter()
                .find(|p| p.pos == maxpos && p.passes_skip_flags() && p.preferred)
            {
                return Some(p.index);
            }
            if let Some(p) = track
                .iter()
                .find(|p| p.pos == maxpos && p.passes_skip_flags())
            {
                return Some(p.index);
            }
            return None;
        }

        None
    }

    /// Ring/write-set election: the first live server that is not the old
    /// primary. Returns an index into the server list.
    pub fn elect_virtual_candidate(&self, old_master: usize, forcing_log: bool) -> Option<usize> {
        let old_id = self.servers[old_master].server_id;
        for (i, sl) in self.servers.iter().enumerate() {
            if sl.is_ignored {
                self.sme.add_state(
                    StateCode::IgnoredReplica,
                    format!("Slave {} is in the ignored list", sl.url),
                );
                if forcing_log {
                    debug!("{} is in the ignore list. Skipping", sl.url);
                }
                continue;
            }
            if sl.role != ServerRole::Failed && sl.server_id != old_id {
                return Some(i);
            }
        }
        None
    }

    fn master_is_failed(&self) -> bool {
        match self.master {
            Some(m) => self.servers[m].role == ServerRole::Failed,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::state::StateCode;
    use crate::testkit;
    use crate::topology::ServerRole;

    #[test]
    fn test_switchover_elects_highest_seq() {
        let (cluster, conns) = testkit::mariadb_cluster(4);
        let slaves = cluster.slave_indices().to_vec();
        // apply-side gtid state ranks the candidates
        for (rank, &idx) in slaves.iter().enumerate() {
            conns[idx].set_slave_gtid(&format!("0-{}-{}", idx, (rank + 1) * 100));
        }
        let mut cluster = cluster;
        for &idx in &slaves {
            cluster.server_mut(idx).refresh();
        }
        let key = cluster.elect_switchover_candidate(true).unwrap();
        assert_eq!(key, slaves.len() - 1);
    }

    #[test]
    fn test_switchover_preferred_master_short_circuits() {
        let (mut cluster, conns) = testkit::mariadb_cluster(4);
        let slaves = cluster.slave_indices().to_vec();
        for (rank, &idx) in slaves.iter().enumerate() {
            conns[idx].set_slave_gtid(&format!("0-{}-{}", idx, (rank + 1) * 100));
        }
        for &idx in &slaves {
            cluster.server_mut(idx).refresh();
        }
        // middle replica is preferred despite a lower seq score
        let mid = slaves[1];
        let mid_url = cluster.server(mid).url.clone();
        cluster.conf_mut().pref_master = mid_url;
        let key = cluster.elect_switchover_candidate(true).unwrap();
        assert_eq!(key, 1);
    }

    #[test]
    fn test_switchover_skips_relay_and_ignored() {
        let (mut cluster, conns) = testkit::mariadb_cluster(4);
        let slaves = cluster.slave_indices().to_vec();
        for (rank, &idx) in slaves.iter().enumerate() {
            conns[idx].set_slave_gtid(&format!("0-{}-{}", idx, (rank + 1) * 100));
        }
        for &idx in &slaves {
            cluster.server_mut(idx).refresh();
        }
        // best two candidates are out of the running
        cluster.server_mut(slaves[2]).is_relay = true;
        cluster.server_mut(slaves[1]).is_ignored = true;
        let key = cluster.elect_switchover_candidate(true).unwrap();
        assert_eq!(key, 0);
        assert!(cluster.state_machine().has_state(StateCode::RelayReplica));
        assert!(cluster.state_machine().has_state(StateCode::IgnoredReplica));
    }

    #[test]
    fn test_switchover_no_candidate_returns_none() {
        let (mut cluster, _conns) = testkit::mariadb_cluster(3);
        let slaves = cluster.slave_indices().to_vec();
        for &idx in &slaves {
            cluster.server_mut(idx).is_ignored = true;
        }
        assert!(cluster.elect_switchover_candidate(true).is_none());
    }

    #[test]
    fn test_failover_tie_prefers_preferred() {
        let (mut cluster, conns) = testkit::fail_cluster(3);
        let slaves = cluster.slave_indices().to_vec();
        // both candidates tied on the IO-side list
        for &idx in &slaves {
            conns[idx].set_gtid_io_pos("0-1-500");
        }
        cluster.server_mut(slaves[1]).is_preferred = true;
        let key = cluster.elect_failover_candidate(true).unwrap();
        assert_eq!(key, 1);
    }

    #[test]
    fn test_failover_monotone_in_seq() {
        let (cluster, conns) = testkit::fail_cluster(4);
        let slaves = cluster.slave_indices().to_vec();
        conns[slaves[0]].set_gtid_io_pos("0-1-100");
        conns[slaves[1]].set_gtid_io_pos("0-1-900");
        conns[slaves[2]].set_gtid_io_pos("0-1-500");
        let key = cluster.elect_failover_candidate(true).unwrap();
        assert_eq!(key, 1);
    }

    #[test]
    fn test_failover_positional_fallback() {
        let (cluster, conns) = testkit::fail_cluster(4);
        let slaves = cluster.slave_indices().to_vec();
        for &idx in &slaves {
            conns[idx].set_gtid_io_pos("");
        }
        conns[slaves[0]].set_read_coordinates("mysql-bin.000003", "500");
        conns[slaves[1]].set_read_coordinates("mysql-bin.000004", "120");
        conns[slaves[2]].set_read_coordinates("mysql-bin.000003", "900");
        let key = cluster.elect_failover_candidate(true).unwrap();
        assert_eq!(key, 1);
    }

    #[test]
    fn test_failover_preference_never_beats_higher_seq() {
        let (mut cluster, conns) = testkit::fail_cluster(3);
        let slaves = cluster.slave_indices().to_vec();
        conns[slaves[0]].set_gtid_io_pos("0-1-900");
        conns[slaves[1]].set_gtid_io_pos("0-1-100");
        cluster.server_mut(slaves[1]).is_preferred = true;
        let key = cluster.elect_failover_candidate(true).unwrap();
        assert_eq!(key, 0);
    }

    #[test]
    fn test_failover_skips_unelectable_leader() {
        let (cluster, conns) = testkit::fail_cluster(3);
        let slaves = cluster.slave_indices().to_vec();
        conns[slaves[0]].set_gtid_io_pos("0-1-900");
        conns[slaves[1]].set_gtid_io_pos("0-1-900");
        // leader's apply thread is down; the tied runner-up must win
        conns[slaves[0]].stop_sql_thread();
        let key = cluster.elect_failover_candidate(true).unwrap();
        assert_eq!(key, 1);
    }

    #[test]
    fn test_virtual_candidate_first_live_non_old() {
        let (mut cluster, _conns) = testkit::mariadb_cluster(3);
        let old = cluster.master_index().unwrap();
        let key = cluster.elect_virtual_candidate(old, true).unwrap();
        assert_ne!(key, old);
        // failed servers are skipped
        cluster.server_mut(key).role = ServerRole::Failed;
        let next = cluster.elect_virtual_candidate(old, true).unwrap();
        assert_ne!(next, key);
        assert_ne!(next, old);
    }
}
