//! Server-wide figures sampled next to the operation list.
//!
//! Drivers return a [`RawStatus`] with cumulative counters. The poller keeps
//! the previous counters and turns two samples into [`Rates`]; the result is
//! carried to the dashboard as [`ServerDetails`].

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use super::model::ServerStatus;

/// Cumulative counters from one status sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounters {
    /// Sum of every op counter (queries, inserts, updates, ...).
    pub operations: u64,
    pub flushes: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// A server's status report as a driver returns it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawStatus {
    pub counters: StatusCounters,
    pub active_clients: u64,
    pub queued: u64,
    pub connections: u64,
    pub connections_available: u64,
    pub resident_bytes: u64,
    pub mapped_bytes: u64,
    /// Legacy master/slave replication source, if the server has one.
    pub replication_source: Option<ReplicationSource>,
    /// Replica set membership as seen from this server.
    pub replica_set: Option<ReplicaSetStatus>,
}

impl RawStatus {
    pub fn connections_total(&self) -> u64 {
        self.connections.saturating_add(self.connections_available)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplicationSource {
    pub host: String,
    pub synced_to: Option<SystemTime>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaSetStatus {
    pub name: String,
    /// The reporting server is the primary; its view of lag is authoritative.
    pub reporter_is_primary: bool,
    pub members: Vec<ReplicaMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaMember {
    pub name: String,
    pub state: String,
    pub uptime: Option<Duration>,
    pub lag: Option<Duration>,
    pub ping: Option<Duration>,
    /// This entry describes the reporting server itself.
    pub is_self: bool,
}

/// Per-second rates between two samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rates {
    pub operations: f64,
    pub flushes: f64,
    pub bytes_in: f64,
    pub bytes_out: f64,
}

impl Rates {
    /// Rates over `elapsed`.
    ///
    /// `None` for an empty interval or when any counter went backwards,
    /// which happens when the server restarts between samples.
    pub fn between(previous: &StatusCounters, current: &StatusCounters, elapsed: Duration) -> Option<Self> {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return None;
        }
        let per_sec = |old: u64, new: u64| new.checked_sub(old).map(|delta| delta as f64 / secs);
        Some(Self {
            operations: per_sec(previous.operations, current.operations)?,
            flushes: per_sec(previous.flushes, current.flushes)?,
            bytes_in: per_sec(previous.bytes_in, current.bytes_in)?,
            bytes_out: per_sec(previous.bytes_out, current.bytes_out)?,
        })
    }
}

/// What the servers panel shows beyond reachability.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerDetails {
    pub status: RawStatus,
    /// `None` until two consecutive samples exist.
    pub rates: Option<Rates>,
}

/// One replica set member, merged from every server that reported it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaRow {
    pub set: String,
    /// Label of the configured server this member is, if any.
    pub server_label: Option<String>,
    pub member: ReplicaMember,
}

/// Merge the replica set views of all servers into one row per member.
///
/// Rows keep first-seen order. The longest uptime and ping win, the
/// primary's lag wins, and a member's own report supplies its state and
/// server label.
pub fn merge_replica_sets(servers: &[ServerStatus]) -> Vec<ReplicaRow> {
    let mut rows: Vec<ReplicaRow> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for server in servers {
        let Some(set) = server.details.as_ref().and_then(|d| d.status.replica_set.as_ref()) else {
            continue;
        };
        for member in &set.members {
            let label = member.is_self.then(|| server.info.label.clone());
            let key = (set.name.clone(), member.name.clone());
            match index.get(&key).copied() {
                None => {
                    index.insert(key, rows.len());
                    rows.push(ReplicaRow {
                        set: set.name.clone(),
                        server_label: label,
                        member: member.clone(),
                    });
                }
                Some(at) => {
                    let row = &mut rows[at];
                    row.member.uptime = row.member.uptime.max(member.uptime);
                    row.member.ping = row.member.ping.max(member.ping);
                    if set.reporter_is_primary {
                        row.member.lag = member.lag;
                    }
                    if member.is_self {
                        row.member.state = member.state.clone();
                        row.server_label = label;
                    }
                }
            }
        }
    }

    rows
}
