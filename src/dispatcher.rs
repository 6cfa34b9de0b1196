//! Operator-initiated explain and kill.
//!
//! Actions run on the async runtime, outside any poller's cadence. Each is
//! bounded by the action timeout and abandoned if the monitor shuts down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::data::{OpId, SnapshotEntry};
use crate::error::{ActionError, ServerError};
use crate::server::{ExplainTarget, ServerHandle};

/// Identifies one operation on one server, plus what is needed to explain it.
///
/// Captured from the selected row when the operator presses a key, so a later
/// snapshot cannot change what the action refers to.
#[derive(Debug, Clone, PartialEq)]
pub struct OpTarget {
    pub server: String,
    pub server_label: String,
    pub op_id: OpId,
    pub namespace: String,
    pub query: Option<serde_json::Value>,
}

impl OpTarget {
    pub fn from_entry(entry: &SnapshotEntry) -> Self {
        let op = &entry.operation;
        Self {
            server: op.server.clone(),
            server_label: entry.server_label.clone(),
            op_id: op.op_id.clone(),
            namespace: op.namespace.clone(),
            query: op.query.clone(),
        }
    }

    fn explain_target(&self) -> Option<ExplainTarget> {
        ExplainTarget::new(&self.op_id, &self.namespace, self.query.as_ref())
    }
}

/// Outcome of a batch kill.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KillReport {
    pub killed: usize,
    pub failed: Vec<ActionError>,
}

impl KillReport {
    pub fn summary(&self) -> String {
        format!("killed {}, failed {}", self.killed, self.failed.len())
    }
}

/// Routes explain and kill requests to the right [`ServerHandle`].
#[derive(Debug, Clone)]
pub struct ActionDispatcher {
    handles: Arc<HashMap<String, Arc<ServerHandle>>>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl ActionDispatcher {
    pub fn new(handles: &[Arc<ServerHandle>], timeout: Duration, cancel: CancellationToken) -> Self {
        let handles = handles
            .iter()
            .map(|h| (h.address().to_string(), h.clone()))
            .collect();
        Self {
            handles: Arc::new(handles),
            timeout,
            cancel,
        }
    }

    fn handle(&self, server: &str) -> Result<&Arc<ServerHandle>, ActionError> {
        self.handles
            .get(server)
            .ok_or_else(|| ActionError::UnknownServer(server.to_string()))
    }

    /// Fetch the execution plan of a running query.
    pub async fn explain(&self, target: &OpTarget) -> Result<String, ActionError> {
        let handle = self.handle(&target.server)?;
        let explain = target.explain_target().ok_or(ActionError::NotExplainable)?;

        tracing::debug!(server = %target.server_label, op = %target.op_id, "explain");
        let result = tokio::select! {
            _ = self.cancel.cancelled() => Err(ServerError::Cancelled),
            result = handle.explain(&explain, self.timeout) => result,
        };
        result.map_err(|source| ActionError::Failed {
            action: "explain",
            server: target.server_label.clone(),
            source,
        })
    }

    /// Ask the owning server to terminate an operation.
    ///
    /// Success only means the server accepted the request; the operation
    /// drops out of the table once a later poll stops reporting it.
    pub async fn kill(&self, target: &OpTarget) -> Result<(), ActionError> {
        let handle = self.handle(&target.server)?;

        let result = tokio::select! {
            _ = self.cancel.cancelled() => Err(ServerError::Cancelled),
            result = handle.kill(&target.op_id, self.timeout) => result,
        };
        match result {
            Ok(()) => {
                tracing::info!(server = %target.server_label, op = %target.op_id, "operation killed");
                Ok(())
            }
            Err(source) => {
                tracing::warn!(server = %target.server_label, op = %target.op_id, error = %source, "kill failed");
                Err(ActionError::Failed {
                    action: "kill",
                    server: target.server_label.clone(),
                    source,
                })
            }
        }
    }

    /// Kill several operations concurrently.
    pub async fn kill_many(&self, targets: Vec<OpTarget>) -> KillReport {
        let mut set = JoinSet::new();
        for target in targets {
            let dispatcher = self.clone();
            set.spawn(async move { dispatcher.kill(&target).await });
        }

        let mut report = KillReport::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(())) => report.killed += 1,
                Ok(Err(e)) => report.failed.push(e),
                Err(e) => tracing::error!(error = %e, "kill task panicked"),
            }
        }
        report
    }
}
