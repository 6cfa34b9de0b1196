//! Per-server data: servers, operations, and the batches pollers publish.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::status::ServerDetails;

/// Identity of a monitored server.
///
/// The address is the unique key; the label is what the operator sees.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerInfo {
    pub address: String,
    pub label: String,
}

impl ServerInfo {
    pub fn new(address: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            label: label.into(),
        }
    }
}

/// Whether a server answered its most recent poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reachability {
    /// No poll has completed yet.
    #[default]
    Pending,
    Connected,
    Unreachable,
}

impl Reachability {
    /// Returns a short symbol for display.
    pub fn symbol(&self) -> &'static str {
        match self {
            Reachability::Pending => "…",
            Reachability::Connected => "UP",
            Reachability::Unreachable => "DOWN",
        }
    }
}

/// Operation identifier, unique only within its server.
///
/// Plain servers report numeric ids; routers report `shard:id` strings.
/// Numeric ids order numerically and sort before named ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpId {
    Num(i64),
    Name(String),
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpId::Num(n) => write!(f, "{}", n),
            OpId::Name(s) => f.write_str(s),
        }
    }
}

impl From<i64> for OpId {
    fn from(n: i64) -> Self {
        OpId::Num(n)
    }
}

impl From<&str> for OpId {
    fn from(s: &str) -> Self {
        s.parse().map(OpId::Num).unwrap_or_else(|_| OpId::Name(s.to_string()))
    }
}

/// One in-flight operation as seen in a single sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Address of the server that reported it (lookup key, not ownership).
    pub server: String,
    pub op_id: OpId,
    /// Operation kind as reported by the server (`query`, `getmore`, ...).
    pub kind: String,
    /// `database.collection`, possibly empty.
    pub namespace: String,
    /// `None` when the server did not report a running time.
    pub running: Option<Duration>,
    pub client: String,
    /// One-line description of the query shape.
    pub description: String,
    /// Query document, when the server exposed one.
    pub query: Option<serde_json::Value>,
    /// Poll sequence number of the batch this came from.
    pub sequence: u64,
}

/// Outcome of one poll, as recorded by the owning poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Success,
    Failed(String),
}

/// The operations returned by one poll of one server.
#[derive(Debug, Clone)]
pub struct Batch {
    pub server: String,
    /// Poll counter of the owning poller; strictly increasing per server.
    pub sequence: u64,
    pub sampled_at: Instant,
    pub outcome: PollOutcome,
    pub operations: Vec<Operation>,
    /// Server-wide figures, when the status call answered too.
    pub details: Option<ServerDetails>,
}

impl Batch {
    /// A batch from a poll that succeeded.
    pub fn success(server: impl Into<String>, sequence: u64, operations: Vec<Operation>) -> Self {
        Self {
            server: server.into(),
            sequence,
            sampled_at: Instant::now(),
            outcome: PollOutcome::Success,
            operations,
            details: None,
        }
    }

    /// An empty batch standing in for a poll that failed.
    pub fn failure(server: impl Into<String>, sequence: u64, error: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            sequence,
            sampled_at: Instant::now(),
            outcome: PollOutcome::Failed(error.into()),
            operations: Vec::new(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Option<ServerDetails>) -> Self {
        self.details = details;
        self
    }

    pub fn reachability(&self) -> Reachability {
        match self.outcome {
            PollOutcome::Success => Reachability::Connected,
            PollOutcome::Failed(_) => Reachability::Unreachable,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            PollOutcome::Success => None,
            PollOutcome::Failed(e) => Some(e),
        }
    }
}

/// Display state of one configured server inside a snapshot.
#[derive(Debug, Clone)]
pub struct ServerStatus {
    pub info: ServerInfo,
    pub reachability: Reachability,
    pub last_error: Option<String>,
    pub operation_count: usize,
    pub sampled_at: Option<Instant>,
    pub details: Option<ServerDetails>,
}

impl ServerStatus {
    pub fn from_batch(info: &ServerInfo, batch: Option<&Batch>) -> Self {
        match batch {
            Some(batch) => Self {
                info: info.clone(),
                reachability: batch.reachability(),
                last_error: batch.error().map(str::to_string),
                operation_count: batch.operations.len(),
                sampled_at: Some(batch.sampled_at),
                details: batch.details.clone(),
            },
            None => Self {
                info: info.clone(),
                reachability: Reachability::Pending,
                last_error: None,
                operation_count: 0,
                sampled_at: None,
                details: None,
            },
        }
    }
}
