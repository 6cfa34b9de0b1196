//! Simulated server for `--demo` mode.
//!
//! Generates a plausible, slowly changing set of operations so the dashboard
//! can be explored without a database. Each client is seeded from its
//! address, so the same address always produces the same workload shape.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use super::{ExplainTarget, RawOperation, ServerClient};
use crate::data::{OpId, RawStatus, ReplicaMember, ReplicaSetStatus, StatusCounters};
use crate::error::ServerError;

const NAMESPACES: &[&str] = &[
    "shop.orders",
    "shop.customers",
    "shop.inventory",
    "analytics.events",
    "analytics.sessions",
];

const KINDS: &[&str] = &["query", "query", "query", "update", "getmore", "insert"];

/// Upper bound on simulated in-flight operations per server.
const MAX_OPERATIONS: usize = 12;

#[derive(Debug)]
struct DemoOp {
    id: i64,
    kind: &'static str,
    namespace: &'static str,
    client: String,
    query: serde_json::Value,
    started: Instant,
    lifetime: Duration,
}

#[derive(Debug)]
struct DemoState {
    rng: u64,
    next_id: i64,
    calls: u64,
    ops: Vec<DemoOp>,
    counters: StatusCounters,
}

impl DemoState {
    fn next(&mut self) -> u64 {
        self.rng = self
            .rng
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.rng >> 33
    }

    fn pick<T: Copy>(&mut self, items: &[T]) -> T {
        let i = self.next() as usize % items.len();
        items[i]
    }

    fn spawn_op(&mut self) {
        self.next_id += 1;
        let kind = self.pick(KINDS);
        let namespace = self.pick(NAMESPACES);
        let client = format!("10.0.{}.{}:{}", self.next() % 4, self.next() % 250 + 2, 40_000 + self.next() % 20_000);
        let query = match self.next() % 3 {
            0 => json!({ "status": "open", "total": { "$gt": self.next() % 500 } }),
            1 => json!({ "customer_id": self.next() % 10_000 }),
            _ => json!({ "$query": { "created_at": { "$lt": "2024-01-01" } }, "$orderby": { "created_at": -1 } }),
        };
        // Mostly short queries with the occasional long-running scan.
        let lifetime = if self.next() % 10 == 0 {
            Duration::from_secs(20 + self.next() % 120)
        } else {
            Duration::from_millis(500 + self.next() % 8_000)
        };
        self.ops.push(DemoOp {
            id: self.next_id,
            kind,
            namespace,
            client,
            query,
            started: Instant::now(),
            lifetime,
        });
    }
}

#[derive(Debug)]
struct DemoReplicaSet {
    name: String,
    /// Every member's address; the first one is primary.
    members: Vec<String>,
}

/// A simulated database server.
#[derive(Debug)]
pub struct DemoClient {
    address: String,
    started: Instant,
    state: Mutex<DemoState>,
    /// Every this-many listings, the next two fail.
    outage_every: Option<u64>,
    replica_set: Option<DemoReplicaSet>,
}

impl DemoClient {
    pub fn new(address: &str) -> Self {
        // FNV-1a, so each address gets its own stable workload.
        let seed = address
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| (h ^ b as u64).wrapping_mul(0x100_0000_01b3));
        Self {
            address: address.to_string(),
            started: Instant::now(),
            state: Mutex::new(DemoState {
                rng: seed,
                next_id: (seed % 9_000) as i64 + 1_000,
                calls: 0,
                ops: Vec::new(),
                counters: StatusCounters {
                    operations: seed % 1_000_000,
                    flushes: seed % 5_000,
                    bytes_in: seed % 1_000_000_000,
                    bytes_out: seed % 4_000_000_000,
                },
            }),
            outage_every: None,
            replica_set: None,
        }
    }

    /// Report membership of a replica set whose first member is primary.
    pub fn with_replica_set(mut self, name: &str, members: Vec<String>) -> Self {
        self.replica_set = Some(DemoReplicaSet {
            name: name.to_string(),
            members,
        });
        self
    }

    fn in_outage(&self, calls: u64) -> bool {
        self.outage_every.is_some_and(|every| calls % every >= every - 2)
    }

    fn replica_status(&self, state: &mut DemoState) -> Option<ReplicaSetStatus> {
        let set = self.replica_set.as_ref()?;
        let uptime = self.started.elapsed() + Duration::from_secs(86_400 + state.rng % 86_400);
        let members = set
            .members
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let is_self = *name == self.address;
                ReplicaMember {
                    name: name.clone(),
                    state: if i == 0 { "PRIMARY" } else { "SECONDARY" }.to_string(),
                    uptime: Some(uptime),
                    lag: Some(if i == 0 { Duration::ZERO } else { Duration::from_secs(state.next() % 3) }),
                    ping: (!is_self).then(|| Duration::from_millis(1 + state.next() % 8)),
                    is_self,
                }
            })
            .collect();
        Some(ReplicaSetStatus {
            name: set.name.clone(),
            reporter_is_primary: set.members.first() == Some(&self.address),
            members,
        })
    }

    /// Make the server drop out for two polls every `every` polls.
    pub fn with_outages(mut self, every: u64) -> Self {
        self.outage_every = Some(every.max(3));
        self
    }

    fn latency(&self) -> Duration {
        let mut state = self.state.lock();
        Duration::from_millis(10 + state.next() % 60)
    }
}

#[async_trait]
impl ServerClient for DemoClient {
    async fn current_operations(&self) -> Result<Vec<RawOperation>, ServerError> {
        tokio::time::sleep(self.latency()).await;

        let mut state = self.state.lock();
        state.calls += 1;
        if self.in_outage(state.calls) {
            return Err(ServerError::Connection("connection refused (simulated outage)".into()));
        }

        state.ops.retain(|op| op.started.elapsed() < op.lifetime);
        let arrivals = state.next() % 3;
        for _ in 0..arrivals {
            if state.ops.len() < MAX_OPERATIONS {
                state.spawn_op();
            }
        }

        Ok(state
            .ops
            .iter()
            .map(|op| RawOperation {
                op_id: OpId::Num(op.id),
                kind: op.kind.to_string(),
                namespace: op.namespace.to_string(),
                running: Some(op.started.elapsed()),
                client: op.client.clone(),
                description: op.query.to_string(),
                query: Some(op.query.clone()),
            })
            .collect())
    }

    async fn server_status(&self) -> Result<RawStatus, ServerError> {
        tokio::time::sleep(self.latency()).await;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if self.in_outage(state.calls) {
            return Err(ServerError::Connection("connection refused (simulated outage)".into()));
        }

        let served = 50 + state.next() % 400;
        let inbound = served * (200 + state.next() % 300);
        let outbound = served * (800 + state.next() % 2_000);
        let flushed = u64::from(state.next() % 20 == 0);
        state.counters.operations += served;
        state.counters.bytes_in += inbound;
        state.counters.bytes_out += outbound;
        state.counters.flushes += flushed;

        let connections = 20 + state.next() % 80;
        let queued = state.next() % 4;
        let replica_set = self.replica_status(state);
        Ok(RawStatus {
            counters: state.counters,
            active_clients: state.ops.len() as u64,
            queued,
            connections,
            connections_available: 51_200 - connections,
            resident_bytes: (900 + state.rng % 600) << 20,
            mapped_bytes: (4_096 + state.rng % 2_048) << 20,
            replication_source: None,
            replica_set,
        })
    }

    async fn explain(&self, target: &ExplainTarget) -> Result<String, ServerError> {
        tokio::time::sleep(self.latency() * 4).await;

        let indexed = self.state.lock().next() % 2 == 0;
        let plan = json!({
            "namespace": format!("{}.{}", target.database, target.collection),
            "parsedQuery": target.query,
            "winningPlan": if indexed {
                json!({ "stage": "FETCH", "inputStage": { "stage": "IXSCAN", "indexName": "status_1_total_1" } })
            } else {
                json!({ "stage": "COLLSCAN", "direction": "forward" })
            },
            "rejectedPlans": [],
        });
        serde_json::to_string_pretty(&plan).map_err(|e| ServerError::Protocol(e.to_string()))
    }

    async fn kill_op(&self, op_id: &OpId) -> Result<(), ServerError> {
        tokio::time::sleep(self.latency()).await;

        let mut state = self.state.lock();
        let before = state.ops.len();
        state.ops.retain(|op| &OpId::Num(op.id) != op_id);
        if state.ops.len() == before {
            return Err(ServerError::Protocol(format!("no operation with id {}", op_id)));
        }
        Ok(())
    }
}
