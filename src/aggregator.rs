//! Merges per-server batches into the current ranked snapshot.
//!
//! Pollers call [`Aggregator::publish`]; the dashboard reads
//! [`Aggregator::current_snapshot`] or holds a [`SnapshotSource`]. Every
//! publish rebuilds the snapshot under the batch-table lock and swaps it into
//! a watch channel whole, so readers only ever see a fully sorted view and
//! never need a lock of their own.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::data::{Batch, ServerInfo, Snapshot};
use crate::source::SnapshotSource;

#[derive(Debug, Default)]
struct Batches {
    latest: HashMap<String, Batch>,
    generation: u64,
}

/// Owner of every server's latest batch and of the current [`Snapshot`].
#[derive(Debug)]
pub struct Aggregator {
    servers: Vec<ServerInfo>,
    batches: Mutex<Batches>,
    current: watch::Sender<Arc<Snapshot>>,
}

impl Aggregator {
    /// Create an aggregator for a fixed, ordered set of servers.
    pub fn new(servers: Vec<ServerInfo>) -> Self {
        let (current, _) = watch::channel(Arc::new(Snapshot::empty(&servers)));
        Self {
            servers,
            batches: Mutex::new(Batches::default()),
            current,
        }
    }

    /// Replace a server's latest batch and rebuild the snapshot.
    ///
    /// Returns `false` (and changes nothing) if the server is not configured
    /// or the batch is older than the one already held for that server.
    pub fn publish(&self, batch: Batch) -> bool {
        if !self.servers.iter().any(|s| s.address == batch.server) {
            tracing::warn!(server = %batch.server, "dropping batch for unknown server");
            return false;
        }

        let mut batches = self.batches.lock();
        if let Some(previous) = batches.latest.get(&batch.server) {
            if batch.sequence < previous.sequence {
                tracing::debug!(
                    server = %batch.server,
                    sequence = batch.sequence,
                    held = previous.sequence,
                    "dropping out-of-order batch"
                );
                return false;
            }
        }

        batches.generation += 1;
        batches.latest.insert(batch.server.clone(), batch);
        let snapshot = Snapshot::build(&self.servers, &batches.latest, batches.generation);
        tracing::trace!(
            generation = snapshot.generation,
            operations = snapshot.len(),
            "snapshot rebuilt"
        );
        // Still under the lock, so snapshots are swapped in generation order.
        self.current.send_replace(Arc::new(snapshot));
        true
    }

    /// The current snapshot. Cheap: clones an `Arc`.
    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.current.borrow().clone()
    }

    /// A receiver that yields each new snapshot once.
    pub fn subscribe(&self) -> SnapshotSource {
        SnapshotSource::new(self.current.subscribe(), &describe(&self.servers))
    }

    /// Raw watch receiver, for tasks that want to await changes.
    pub fn watch(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.current.subscribe()
    }
}

fn describe(servers: &[ServerInfo]) -> String {
    match servers {
        [only] => only.label.clone(),
        _ => format!("{} servers", servers.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::snapshot::tests::op;
    use crate::data::{OpId, Reachability};

    fn aggregator() -> Aggregator {
        Aggregator::new(vec![ServerInfo::new("db1", "db1"), ServerInfo::new("db2", "db2")])
    }

    #[test]
    fn test_initial_snapshot_lists_servers_as_pending() {
        let agg = aggregator();
        let snapshot = agg.current_snapshot();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.servers.len(), 2);
        assert!(snapshot.servers.iter().all(|s| s.reachability == Reachability::Pending));
    }

    #[test]
    fn test_publish_for_one_server_leaves_the_other_alone() {
        let agg = aggregator();
        agg.publish(Batch::success("db2", 1, vec![op("db2", 7, 12)]));
        agg.publish(Batch::success("db1", 1, vec![op("db1", 1, 5)]));
        agg.publish(Batch::success("db1", 2, vec![op("db1", 2, 3)]));

        let snapshot = agg.current_snapshot();
        let ids: Vec<_> = snapshot
            .entries
            .iter()
            .map(|e| (e.operation.server.as_str(), e.operation.op_id.clone()))
            .collect();
        assert_eq!(ids, vec![("db2", OpId::Num(7)), ("db1", OpId::Num(2))]);
    }

    #[test]
    fn test_failure_batch_clears_server_operations() {
        let agg = aggregator();
        agg.publish(Batch::success("db1", 1, vec![op("db1", 1, 5)]));
        agg.publish(Batch::success("db2", 1, vec![op("db2", 7, 12)]));
        agg.publish(Batch::failure("db2", 2, "timed out after 800ms"));

        let snapshot = agg.current_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.entries[0].operation.server, "db1");
        assert_eq!(snapshot.server("db2").unwrap().reachability, Reachability::Unreachable);
    }

    #[test]
    fn test_out_of_order_batch_is_ignored() {
        let agg = aggregator();
        assert!(agg.publish(Batch::success("db1", 5, vec![op("db1", 1, 5)])));
        assert!(!agg.publish(Batch::success("db1", 4, vec![])));
        assert_eq!(agg.current_snapshot().len(), 1);
    }

    #[test]
    fn test_unknown_server_is_rejected() {
        let agg = aggregator();
        assert!(!agg.publish(Batch::success("db9", 1, vec![op("db9", 1, 5)])));
        assert_eq!(agg.current_snapshot().generation, 0);
    }

    #[test]
    fn test_handed_out_snapshot_is_not_mutated_by_later_publish() {
        let agg = aggregator();
        agg.publish(Batch::success("db1", 1, vec![op("db1", 1, 5)]));
        let held = agg.current_snapshot();

        agg.publish(Batch::success("db1", 2, vec![]));

        assert_eq!(held.len(), 1);
        assert!(agg.current_snapshot().is_empty());
    }

    #[test]
    fn test_concurrent_publishes_keep_generations_ordered() {
        let agg = Arc::new(aggregator());
        let threads: Vec<_> = ["db1", "db2"]
            .into_iter()
            .map(|server| {
                let agg = agg.clone();
                std::thread::spawn(move || {
                    for seq in 1..=200 {
                        agg.publish(Batch::success(server, seq, vec![op(server, seq as i64, seq)]));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let snapshot = agg.current_snapshot();
        assert_eq!(snapshot.generation, 400);
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.entries.iter().all(|e| e.operation.op_id == OpId::Num(200)));
    }
}
