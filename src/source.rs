//! Snapshot source for the dashboard.
//!
//! Receives ranked snapshots from the [`Aggregator`](crate::Aggregator) via a
//! tokio watch channel. Polling never blocks, so the render loop can check
//! for new data every tick.

use std::sync::Arc;

use tokio::sync::watch;

use crate::data::Snapshot;

/// Non-blocking reader of the aggregator's current snapshot.
///
/// # Example
///
/// ```
/// use opwatch::{Aggregator, ServerInfo};
///
/// let aggregator = Aggregator::new(vec![ServerInfo::new("db1:27017", "db1")]);
/// let mut source = aggregator.subscribe();
///
/// // The first poll always yields the current snapshot.
/// assert!(source.poll().is_some());
/// assert!(source.poll().is_none());
/// ```
#[derive(Debug)]
pub struct SnapshotSource {
    receiver: watch::Receiver<Arc<Snapshot>>,
    description: String,
    /// Track if we've returned the initial value yet
    initial_returned: bool,
}

impl SnapshotSource {
    /// Create a new snapshot source.
    ///
    /// # Arguments
    ///
    /// * `receiver` - The receiving end of the aggregator's watch channel
    /// * `description` - What is being watched, for the status bar
    pub fn new(receiver: watch::Receiver<Arc<Snapshot>>, description: &str) -> Self {
        Self {
            receiver,
            description: description.to_string(),
            initial_returned: false,
        }
    }

    /// Return the latest snapshot if it changed since the last poll.
    pub fn poll(&mut self) -> Option<Arc<Snapshot>> {
        // Return the initial value on first poll
        if !self.initial_returned {
            self.initial_returned = true;
            self.receiver.mark_changed();
        }

        // A closed channel means the aggregator is gone; keep showing what we have.
        if self.receiver.has_changed().unwrap_or(false) {
            Some(self.receiver.borrow_and_update().clone())
        } else {
            None
        }
    }

    /// Returns a human-readable description of the source.
    pub fn description(&self) -> &str {
        &self.description
    }
}
