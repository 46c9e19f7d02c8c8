//! Replication Position Model
//!
//! Two coordinate systems coexist across the supported flavors:
//!
//! - positional `(log_file, offset)` pairs, comparable through a numeric
//!   score built from the file's numeric tail and the zero-padded offset;
//! - global-id lists, a mapping from domain/source to a monotone sequence
//!   number, summarized for comparison by summing the sequence numbers.
//!
//! Elections rank candidates on the global-id summary first and fall back
//! to the positional score for clusters that replicate without global ids.

mod binlog;
mod gtid;

pub use binlog::BinlogPosition;
pub use gtid::{Gtid, GtidList};
