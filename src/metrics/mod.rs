//! Activity counters for the counter engine and the membership adapter.
//!
//! Metrics are plain atomics; nothing is exported automatically. Callers read
//! a [`MetricsSnapshot`] and publish it however the host process prefers.

mod counters;
mod gauges;

pub use counters::{Counter, LabeledCounter};
pub use gauges::Gauge;

/// Counters updated by the request and replication paths.
#[derive(Debug)]
pub struct EngineMetrics {
    /// Direct requests executed locally, by command name.
    pub direct_requests: LabeledCounter,
    /// Indirect requests forwarded to a remote master.
    pub forwarded: Counter,
    /// Forwards that failed in transport.
    pub forward_failures: Counter,
    /// `NoRing` and `NotMaster` answers.
    pub routing_errors: Counter,
    /// `IOError` and `UpdateFailed` answers.
    pub storage_errors: Counter,
    /// Replication pushes handed to the transport.
    pub replications_sent: Counter,
    /// Replication pushes applied to local storage.
    pub replications_applied: Counter,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            direct_requests: LabeledCounter::new("counterdb_direct_requests_total", "command"),
            forwarded: Counter::new("counterdb_forwarded_total"),
            forward_failures: Counter::new("counterdb_forward_failures_total"),
            routing_errors: Counter::new("counterdb_routing_errors_total"),
            storage_errors: Counter::new("counterdb_storage_errors_total"),
            replications_sent: Counter::new("counterdb_replications_sent_total"),
            replications_applied: Counter::new("counterdb_replications_applied_total"),
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters updated by membership callbacks.
#[derive(Debug)]
pub struct MembershipMetrics {
    pub joins: Counter,
    pub leaves: Counter,
    /// Join notifications ignored for bad metadata or a foreign marker.
    pub ignored_joins: Counter,
    /// Alive/merge checks that rejected a peer.
    pub rejected_admissions: Counter,
    /// Current number of members in the name table.
    pub members: Gauge,
}

impl MembershipMetrics {
    pub fn new() -> Self {
        Self {
            joins: Counter::new("counterdb_member_joins_total"),
            leaves: Counter::new("counterdb_member_leaves_total"),
            ignored_joins: Counter::new("counterdb_member_ignored_joins_total"),
            rejected_admissions: Counter::new("counterdb_member_rejected_total"),
            members: Gauge::new("counterdb_members"),
        }
    }
}

impl Default for MembershipMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of all metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub direct_requests: Vec<(String, u64)>,
    pub forwarded: u64,
    pub forward_failures: u64,
    pub routing_errors: u64,
    pub storage_errors: u64,
    pub replications_sent: u64,
    pub replications_applied: u64,
    pub joins: u64,
    pub leaves: u64,
    pub ignored_joins: u64,
    pub rejected_admissions: u64,
    pub members: i64,
}

impl MetricsSnapshot {
    pub fn capture(engine: &EngineMetrics, membership: &MembershipMetrics) -> Self {
        Self {
            direct_requests: engine.direct_requests.get_all(),
            forwarded: engine.forwarded.get(),
            forward_failures: engine.forward_failures.get(),
            routing_errors: engine.routing_errors.get(),
            storage_errors: engine.storage_errors.get(),
            replications_sent: engine.replications_sent.get(),
            replications_applied: engine.replications_applied.get(),
            joins: membership.joins.get(),
            leaves: membership.leaves.get(),
            ignored_joins: membership.ignored_joins.get(),
            rejected_admissions: membership.rejected_admissions.get(),
            members: membership.members.get(),
        }
    }

    /// Total direct requests across all commands.
    pub fn total_direct_requests(&self) -> u64 {
        self.direct_requests.iter().map(|(_, n)| n).sum()
    }
}
