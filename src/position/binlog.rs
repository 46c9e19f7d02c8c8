//! Positional Coordinates
//!
//! Binary-log files are named `name.NNNNNN`; progress across servers is
//! compared by concatenating the numeric tail with the offset left-padded
//! to ten digits, then reading the result as a single integer. The score
//! is strictly monotone in `(tail, offset)` lexicographic order.

use std::fmt;

/// Width the offset is padded to inside a score.
const POS_PAD_WIDTH: usize = 10;

/// A `(log_file, offset)` coordinate pair.
///
/// Offsets stay strings: they flow unmodified from status rows into
/// redirect statements and crash records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinlogPosition {
    pub file: String,
    pub pos: String,
}

impl BinlogPosition {
    pub fn new(file: impl Into<String>, pos: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            pos: pos.into(),
        }
    }

    /// Synthetic floor for a replica that never received a transaction.
    pub fn floor() -> Self {
        Self::new("master.000001", "1")
    }

    /// Numeric election score, `None` when the file name carries no dot
    /// or the concatenation is not numeric.
    pub fn score(&self) -> Option<u64> {
        let (_, tail) = self.file.split_once('.')?;
        let mut offset = self.pos.clone();
        while offset.len() < POS_PAD_WIDTH {
            offset.insert(0, '0');
        }
        format!("{tail}{offset}").parse().ok()
    }

    /// Numeric tail of the log file name, `None` when absent.
    pub fn file_number(&self) -> Option<u64> {
        self.file.split_once('.')?.1.parse().ok()
    }
}

impl fmt::Display for BinlogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_concatenates_tail_and_padded_offset() {
        let pos = BinlogPosition::new("mysql-bin.000042", "107");
        assert_eq!(pos.score(), Some(420000000107));
    }

    #[test]
    fn test_score_monotone_in_file_then_offset() {
        let a = BinlogPosition::new("mysql-bin.000001", "999999");
        let b = BinlogPosition::new("mysql-bin.000002", "4");
        let c = BinlogPosition::new("mysql-bin.000002", "5");
        assert!(a.score().unwrap() < b.score().unwrap());
        assert!(b.score().unwrap() < c.score().unwrap());
    }

    #[test]
    fn test_score_none_without_dot() {
        assert_eq!(BinlogPosition::new("FD-header", "4").score(), None);
    }

    #[test]
    fn test_score_none_on_garbage() {
        assert_eq!(BinlogPosition::new("bin.not-a-number", "4").score(), None);
    }

    #[test]
    fn test_floor_scores_lowest() {
        let floor = BinlogPosition::floor();
        let real = BinlogPosition::new("master.000001", "2");
        assert!(floor.score().unwrap() < real.score().unwrap());
    }

    #[test]
    fn test_file_number() {
        assert_eq!(
            BinlogPosition::new("mariadb-bin.000007", "4").file_number(),
            Some(7)
        );
        assert_eq!(BinlogPosition::new("nodot", "4").file_number(), None);
    }
}
