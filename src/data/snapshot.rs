//! The merged, ranked view across all servers.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::model::{Batch, Operation, ServerInfo, ServerStatus};
use super::status::{merge_replica_sets, ReplicaRow};

/// One row of the ranked table: an operation and the label of its server.
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub server_label: String,
    pub operation: Operation,
}

/// An immutable, globally ranked view of every server's latest batch.
///
/// Entries are ordered by running time (longest first); ties go to the
/// lexicographically smaller server address, then the smaller op id. Ops
/// without a running time sort last.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub entries: Vec<SnapshotEntry>,
    /// One status per configured server, in configured order.
    pub servers: Vec<ServerStatus>,
    /// Replica set members merged from every server's view.
    pub replica_members: Vec<ReplicaRow>,
    /// Number of publishes that produced this snapshot.
    pub generation: u64,
    pub built_at: Instant,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            servers: Vec::new(),
            replica_members: Vec::new(),
            generation: 0,
            built_at: Instant::now(),
        }
    }
}

impl Snapshot {
    /// Snapshot for a freshly configured set of servers, before any poll.
    pub fn empty(servers: &[ServerInfo]) -> Self {
        Self::build(servers, &HashMap::new(), 0)
    }

    /// Merge the latest batch of every configured server and rank the result.
    ///
    /// Servers with no entry in `batches` show as pending and contribute
    /// nothing; batches for unconfigured servers are ignored.
    pub fn build(servers: &[ServerInfo], batches: &HashMap<String, Batch>, generation: u64) -> Self {
        let mut entries = Vec::new();
        let mut statuses = Vec::with_capacity(servers.len());

        for info in servers {
            let batch = batches.get(&info.address);
            statuses.push(ServerStatus::from_batch(info, batch));
            if let Some(batch) = batch {
                entries.extend(batch.operations.iter().cloned().map(|operation| SnapshotEntry {
                    server_label: info.label.clone(),
                    operation,
                }));
            }
        }

        rank(&mut entries);

        Self {
            entries,
            replica_members: merge_replica_sets(&statuses),
            servers: statuses,
            generation,
            built_at: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SnapshotEntry> {
        self.entries.get(index)
    }

    /// Status of the server with the given address.
    pub fn server(&self, address: &str) -> Option<&ServerStatus> {
        self.servers.iter().find(|s| s.info.address == address)
    }

    /// Operations running for strictly longer than `threshold`, in rank order.
    pub fn longer_than(&self, threshold: Duration) -> impl Iterator<Item = &SnapshotEntry> {
        self.entries
            .iter()
            .filter(move |e| e.operation.running.is_some_and(|d| d > threshold))
    }
}

/// Sort entries into display order.
pub fn rank(entries: &mut [SnapshotEntry]) {
    entries.sort_by(|a, b| compare_operations(&a.operation, &b.operation));
}

/// Ranking order: running time descending, then server address, then op id.
pub fn compare_operations(a: &Operation, b: &Operation) -> Ordering {
    b.running
        .cmp(&a.running)
        .then_with(|| a.server.cmp(&b.server))
        .then_with(|| a.op_id.cmp(&b.op_id))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::OpId;

    pub(crate) fn op(server: &str, id: i64, secs: u64) -> Operation {
        Operation {
            server: server.to_string(),
            op_id: OpId::Num(id),
            kind: "query".to_string(),
            namespace: "app.orders".to_string(),
            running: Some(Duration::from_secs(secs)),
            client: "10.0.0.1:51234".to_string(),
            description: "{}".to_string(),
            query: None,
            sequence: 1,
        }
    }

    fn servers(addrs: &[&str]) -> Vec<ServerInfo> {
        addrs.iter().map(|a| ServerInfo::new(*a, *a)).collect()
    }

    fn order(snapshot: &Snapshot) -> Vec<(String, OpId)> {
        snapshot
            .entries
            .iter()
            .map(|e| (e.operation.server.clone(), e.operation.op_id.clone()))
            .collect()
    }

    #[test]
    fn test_two_servers_ranked_by_duration() {
        let mut batches = HashMap::new();
        batches.insert("db1".into(), Batch::success("db1", 1, vec![op("db1", 1, 5)]));
        batches.insert("db2".into(), Batch::success("db2", 1, vec![op("db2", 7, 12)]));

        let snapshot = Snapshot::build(&servers(&["db1", "db2"]), &batches, 2);

        assert_eq!(
            order(&snapshot),
            vec![("db2".into(), OpId::Num(7)), ("db1".into(), OpId::Num(1))]
        );
    }

    #[test]
    fn test_ties_broken_by_address_then_op_id() {
        let mut batches = HashMap::new();
        batches.insert(
            "db2".into(),
            Batch::success("db2", 1, vec![op("db2", 3, 5), op("db2", 1, 5)]),
        );
        batches.insert("db1".into(), Batch::success("db1", 1, vec![op("db1", 9, 5)]));

        let snapshot = Snapshot::build(&servers(&["db2", "db1"]), &batches, 1);

        assert_eq!(
            order(&snapshot),
            vec![
                ("db1".into(), OpId::Num(9)),
                ("db2".into(), OpId::Num(1)),
                ("db2".into(), OpId::Num(3)),
            ]
        );
    }

    #[test]
    fn test_unknown_running_time_sorts_last() {
        let mut quiet = op("db1", 2, 0);
        quiet.running = None;
        let mut batches = HashMap::new();
        batches.insert("db1".into(), Batch::success("db1", 1, vec![quiet, op("db1", 1, 0)]));

        let snapshot = Snapshot::build(&servers(&["db1"]), &batches, 1);

        assert_eq!(snapshot.entries[0].operation.op_id, OpId::Num(1));
        assert!(snapshot.entries[1].operation.running.is_none());
    }

    #[test]
    fn test_failed_server_keeps_slot_without_operations() {
        let mut batches = HashMap::new();
        batches.insert("db1".into(), Batch::success("db1", 1, vec![op("db1", 1, 5)]));
        batches.insert("db2".into(), Batch::failure("db2", 4, "timed out"));

        let snapshot = Snapshot::build(&servers(&["db1", "db2"]), &batches, 3);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.servers.len(), 2);
        let db2 = snapshot.server("db2").unwrap();
        assert_eq!(db2.reachability, crate::data::Reachability::Unreachable);
        assert_eq!(db2.last_error.as_deref(), Some("timed out"));
    }

    #[test]
    fn test_longer_than_is_strict() {
        let mut batches = HashMap::new();
        batches.insert(
            "db1".into(),
            Batch::success("db1", 1, vec![op("db1", 1, 10), op("db1", 2, 30), op("db1", 3, 31)]),
        );
        let snapshot = Snapshot::build(&servers(&["db1"]), &batches, 1);

        let ids: Vec<_> = snapshot
            .longer_than(Duration::from_secs(30))
            .map(|e| e.operation.op_id.clone())
            .collect();
        assert_eq!(ids, vec![OpId::Num(3)]);
    }
}
