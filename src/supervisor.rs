//! Lifecycle of the polling tasks.
//!
//! The [`Supervisor`] creates the [`Aggregator`], spawns one [`Poller`] task
//! per server, and watches snapshots for servers coming back from
//! `Unreachable`. A recovered server's poller gets a `Resync` command that
//! clears its failure count and puts its timer back on its staggered phase;
//! the task itself is never recreated.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::aggregator::Aggregator;
use crate::data::Reachability;
use crate::dispatcher::ActionDispatcher;
use crate::poller::{Poller, PollerCommand, PollerConfig};
use crate::server::ServerHandle;

/// Extra time given to tasks at shutdown on top of the fetch timeout.
const SHUTDOWN_MARGIN: Duration = Duration::from_millis(200);

/// Timing shared by every poller and action.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub refresh: Duration,
    pub fetch_timeout: Duration,
    pub action_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            refresh: Duration::from_secs(1),
            fetch_timeout: Duration::from_millis(800),
            action_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
struct PollerTask {
    address: String,
    commands: mpsc::Sender<PollerCommand>,
    task: JoinHandle<()>,
}

/// Owns every background task of a running monitor.
#[derive(Debug)]
pub struct Supervisor {
    aggregator: Arc<Aggregator>,
    dispatcher: ActionDispatcher,
    pollers: Vec<PollerTask>,
    watcher: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    timing: Timing,
}

impl Supervisor {
    /// Spawn pollers for every handle. Must be called inside a tokio runtime.
    ///
    /// First samples are staggered evenly across one refresh interval so
    /// servers are not all queried at the same instant.
    pub fn start(handles: Vec<Arc<ServerHandle>>, timing: Timing) -> Self {
        let servers = handles.iter().map(|h| h.info().clone()).collect();
        let aggregator = Arc::new(Aggregator::new(servers));
        let cancel = CancellationToken::new();
        let dispatcher = ActionDispatcher::new(&handles, timing.action_timeout, cancel.child_token());

        let count = handles.len().max(1) as u32;
        let pollers: Vec<PollerTask> = handles
            .into_iter()
            .enumerate()
            .map(|(index, handle)| {
                let config = PollerConfig::new(timing.refresh, timing.fetch_timeout)
                    .with_first_tick(timing.refresh * index as u32 / count);
                let (tx, rx) = mpsc::channel(4);
                let address = handle.address().to_string();
                let poller = Poller::new(handle, aggregator.clone(), config);
                let task = tokio::spawn(poller.run(rx, cancel.child_token()));
                PollerTask {
                    address,
                    commands: tx,
                    task,
                }
            })
            .collect();

        let restarts: HashMap<_, _> = pollers
            .iter()
            .map(|p| (p.address.clone(), p.commands.clone()))
            .collect();
        let watcher = tokio::spawn(watch_recoveries(aggregator.clone(), restarts, cancel.child_token()));

        tracing::info!(servers = pollers.len(), refresh = ?timing.refresh, "monitor started");

        Self {
            aggregator,
            dispatcher,
            pollers,
            watcher: Some(watcher),
            cancel,
            timing,
        }
    }

    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    /// Ask one server's poller to reset its timer and sample now.
    ///
    /// Returns `false` if the server is unknown or its poller has stopped.
    pub fn restart(&self, address: &str) -> bool {
        self.pollers
            .iter()
            .find(|p| p.address == address)
            .is_some_and(|p| p.commands.try_send(PollerCommand::Restart).is_ok())
    }

    /// Stop every task.
    ///
    /// Pollers and in-flight actions are cancelled together. Tasks get one
    /// fetch-timeout window to finish; any still running after that are
    /// aborted.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        let deadline = tokio::time::Instant::now() + self.timing.fetch_timeout + SHUTDOWN_MARGIN;

        let mut tasks: Vec<(String, JoinHandle<()>)> = self
            .pollers
            .drain(..)
            .map(|p| (p.address, p.task))
            .collect();
        if let Some(watcher) = self.watcher.take() {
            tasks.push(("recovery watcher".to_string(), watcher));
        }

        for (name, mut task) in tasks {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(task = %name, error = %e, "task failed"),
                Err(_) => {
                    tracing::warn!(task = %name, "task did not stop in time, aborting");
                    task.abort();
                }
            }
        }
        tracing::info!("monitor stopped");
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Send `Resync` to pollers whose server just went from unreachable to
/// connected.
async fn watch_recoveries(
    aggregator: Arc<Aggregator>,
    restarts: HashMap<String, mpsc::Sender<PollerCommand>>,
    cancel: CancellationToken,
) {
    let mut snapshots = aggregator.watch();
    let mut previous: HashMap<String, Reachability> = HashMap::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let snapshot = snapshots.borrow_and_update().clone();
        for status in &snapshot.servers {
            let before = previous.insert(status.info.address.clone(), status.reachability);
            if before == Some(Reachability::Unreachable) && status.reachability == Reachability::Connected {
                tracing::debug!(server = %status.info.label, "resyncing poller after recovery");
                if let Some(tx) = restarts.get(&status.info.address) {
                    // A full queue already holds a command for this poller.
                    let _ = tx.try_send(PollerCommand::Resync);
                }
            }
        }
    }
}
