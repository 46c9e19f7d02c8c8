//! Candidate Election
//!
//! Selects the replica to promote. Two layers:
//!
//! - the eligibility predicates decide whether a single replica may be
//!   elected under current policy, reporting every failed condition as a
//!   coded state;
//! - the elections rank the eligible replicas on replication progress,
//!   with different rules for planned switchovers, unplanned failovers
//!   and ring topologies.
//!
//! Both layers are free of database side effects: they read status and
//! write nothing but log lines and state entries.

mod candidate;
mod eligibility;
