//! Global-Id Lists
//!
//! One unified shape covers both dialects. MariaDB writes
//! `domain-server-seqno` triplets; MySQL writes `uuid:interval[:interval]`
//! sets. MySQL source UUIDs are folded into the 32-bit server slot with a
//! crc32 so the two dialects compare and serialize the same way. Only the
//! sequence-number sum feeds elections; the full list is preserved for the
//! crash record and for forced apply-side state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One replication stream's progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gtid {
    pub domain_id: u32,
    pub server_id: u32,
    pub seq_no: u64,
}

/// An ordered list of per-domain positions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GtidList(pub Vec<Gtid>);

impl GtidList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Parse either dialect; elements that parse as neither are dropped.
    pub fn parse(s: &str) -> Self {
        let mut out = Vec::new();
        for element in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            if element.contains(':') {
                if let Some(g) = parse_mysql_element(element) {
                    out.push(g);
                }
            } else if let Some(g) = parse_mariadb_element(element) {
                out.push(g);
            }
        }
        Self(out)
    }

    /// Parse a MySQL executed-set (`uuid:1-5,uuid:12`).
    pub fn from_mysql_executed_set(s: &str) -> Self {
        let mut out = Vec::new();
        for element in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            if let Some(g) = parse_mysql_element(element) {
                out.push(g);
            }
        }
        Self(out)
    }

    /// Floor list for a replica that never received a transaction.
    pub fn floor() -> Self {
        Self::parse("1-1-1")
    }

    /// Sum of the sequence numbers across all domains. The election
    /// summary: higher means further ahead.
    pub fn seq_sum(&self) -> u64 {
        self.0.iter().map(|g| g.seq_no).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for GtidList {
    /// MariaDB textual form, the shape `gtid_slave_pos` accepts.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for g in &self.0 {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{}-{}-{}", g.domain_id, g.server_id, g.seq_no)?;
            first = false;
        }
        Ok(())
    }
}

fn parse_mariadb_element(element: &str) -> Option<Gtid> {
    let mut parts = element.splitn(3, '-');
    let domain_id = parts.next()?.parse().ok()?;
    let server_id = parts.next()?.parse().ok()?;
    let seq_no = parts.next()?.parse().ok()?;
    Some(Gtid {
        domain_id,
        server_id,
        seq_no,
    })
}

/// `uuid:interval[:interval...]`; the element's position is the highest
/// interval end, the uuid is folded into the server slot.
fn parse_mysql_element(element: &str) -> Option<Gtid> {
    let (uuid, intervals) = element.split_once(':')?;
    let mut seq_no = 0u64;
    for interval in intervals.split(':') {
        let end = match interval.split_once('-') {
            Some((_, end)) => end,
            None => interval,
        };
        seq_no = seq_no.max(end.trim().parse().ok()?);
    }
    Some(Gtid {
        domain_id: 0,
        server_id: crc32fast::hash(uuid.trim().as_bytes()),
        seq_no,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mariadb_list() {
        let list = GtidList::parse("0-1-100,1-2-50");
        assert_eq!(list.len(), 2);
        assert_eq!(
            list.0[0],
            Gtid {
                domain_id: 0,
                server_id: 1,
                seq_no: 100
            }
        );
        assert_eq!(list.seq_sum(), 150);
    }

    #[test]
    fn test_parse_mysql_executed_set() {
        let set = "3e11fa47-71ca-11e1-9e33-c80aa9429562:1-5";
        let list = GtidList::from_mysql_executed_set(set);
        assert_eq!(list.len(), 1);
        assert_eq!(list.0[0].domain_id, 0);
        assert_eq!(list.0[0].seq_no, 5);
        assert_eq!(list.seq_sum(), 5);
    }

    #[test]
    fn test_parse_mysql_multiple_intervals_takes_highest_end() {
        let set = "3e11fa47-71ca-11e1-9e33-c80aa9429562:1-5:11-20";
        let list = GtidList::from_mysql_executed_set(set);
        assert_eq!(list.0[0].seq_no, 20);
    }

    #[test]
    fn test_parse_dispatches_on_dialect() {
        let mixed = GtidList::parse("3e11fa47-71ca-11e1-9e33-c80aa9429562:1-7");
        assert_eq!(mixed.seq_sum(), 7);
        let maria = GtidList::parse("0-1-42");
        assert_eq!(maria.seq_sum(), 42);
    }

    #[test]
    fn test_same_uuid_folds_to_same_server_id() {
        let a = GtidList::from_mysql_executed_set("abcd-ef:1-5");
        let b = GtidList::from_mysql_executed_set("abcd-ef:1-9");
        assert_eq!(a.0[0].server_id, b.0[0].server_id);
    }

    #[test]
    fn test_floor_sums_to_one() {
        assert_eq!(GtidList::floor().seq_sum(), 1);
    }

    #[test]
    fn test_empty_and_garbage_input() {
        assert!(GtidList::parse("").is_empty());
        assert!(GtidList::parse("not-a-gtid").is_empty());
        assert_eq!(GtidList::parse("").seq_sum(), 0);
    }

    #[test]
    fn test_display_round_trips_mariadb_form() {
        let list = GtidList::parse("0-101-2000,1-102-300");
        assert_eq!(list.to_string(), "0-101-2000,1-102-300");
        assert_eq!(GtidList::parse(&list.to_string()), list);
    }

    #[test]
    fn test_serde_round_trip() {
        let list = GtidList::parse("0-1-100,1-2-50");
        let json = serde_json::to_string(&list).unwrap();
        let back: GtidList = serde_json::from_str(&json).unwrap();
        assert_eq!(back, list);
    }
}
