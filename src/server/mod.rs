//! Server connections.
//!
//! A [`ServerClient`] is the driver-level capability (list, status, explain,
//! kill).
//! A [`ServerHandle`] wraps one client with the server's identity and puts a
//! deadline on every call. Handles never retry; retry policy belongs to the
//! poller and dispatcher.
//!
//! Drivers:
//!
//! - [`DemoClient`]: simulated server, always available
//! - `MongoClient`: MongoDB via the official driver (`mongo` feature)

mod demo;
#[cfg(feature = "mongo")]
mod mongo;
#[cfg(test)]
pub(crate) mod testing;

pub use demo::DemoClient;
#[cfg(feature = "mongo")]
pub use mongo::MongoClient;

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::data::{OpId, Operation, RawStatus, ServerInfo};
use crate::error::ServerError;

/// An operation as reported by a driver, before it is tagged with its server.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOperation {
    pub op_id: OpId,
    pub kind: String,
    pub namespace: String,
    pub running: Option<Duration>,
    pub client: String,
    pub description: String,
    pub query: Option<serde_json::Value>,
}

impl RawOperation {
    /// Replication traffic: oplog tailing on a primary, or source polling on a
    /// legacy secondary.
    pub fn is_replication(&self) -> bool {
        if self.kind == "getmore" && self.namespace.contains("local.oplog.") {
            return true;
        }
        !self.kind.is_empty() && (self.namespace.is_empty() || self.namespace == "local.sources")
    }

    fn into_operation(self, server: &str, sequence: u64) -> Operation {
        Operation {
            server: server.to_string(),
            op_id: self.op_id,
            kind: self.kind,
            namespace: self.namespace,
            running: self.running,
            client: self.client,
            description: self.description,
            query: self.query,
            sequence,
        }
    }
}

/// What a driver needs to explain a running query.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplainTarget {
    pub op_id: OpId,
    pub database: String,
    pub collection: String,
    pub query: serde_json::Value,
}

impl ExplainTarget {
    /// Build a target from a sampled operation.
    ///
    /// Returns `None` unless the operation carries a query document and a
    /// `database.collection` namespace.
    pub fn from_operation(op: &Operation) -> Option<Self> {
        Self::new(&op.op_id, &op.namespace, op.query.as_ref())
    }

    pub fn new(op_id: &OpId, namespace: &str, query: Option<&serde_json::Value>) -> Option<Self> {
        let query = query.filter(|q| q.is_object())?;
        let (database, collection) = namespace.split_once('.')?;
        if database.is_empty() || collection.is_empty() {
            return None;
        }
        Some(Self {
            op_id: op_id.clone(),
            database: database.to_string(),
            collection: collection.to_string(),
            query: query.clone(),
        })
    }
}

/// Driver-level capabilities of one database server.
///
/// Implementations may block on network I/O for as long as they like;
/// [`ServerHandle`] enforces deadlines.
#[async_trait]
pub trait ServerClient: Send + Sync + Debug {
    /// List in-flight operations.
    async fn current_operations(&self) -> Result<Vec<RawOperation>, ServerError>;

    /// Server-wide counters, gauges and replication state.
    async fn server_status(&self) -> Result<RawStatus, ServerError>;

    /// Ask the server for the execution plan of a query.
    async fn explain(&self, target: &ExplainTarget) -> Result<String, ServerError>;

    /// Ask the server to terminate an operation.
    async fn kill_op(&self, op_id: &OpId) -> Result<(), ServerError>;
}

/// One monitored server: identity plus a client, with deadlines on every call.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    info: ServerInfo,
    hide_replication: bool,
    client: Arc<dyn ServerClient>,
}

impl ServerHandle {
    pub fn new(info: ServerInfo, client: Arc<dyn ServerClient>) -> Self {
        Self {
            info,
            hide_replication: false,
            client,
        }
    }

    /// Drop replication traffic from fetched operations.
    pub fn with_hide_replication(mut self, hide: bool) -> Self {
        self.hide_replication = hide;
        self
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn address(&self) -> &str {
        &self.info.address
    }

    pub fn label(&self) -> &str {
        &self.info.label
    }

    /// Fetch the server's in-flight operations, tagged with this server and
    /// the given sample sequence number.
    pub async fn fetch_operations(
        &self,
        sequence: u64,
        timeout: Duration,
    ) -> Result<Vec<Operation>, ServerError> {
        let raw = bounded(timeout, self.client.current_operations()).await?;
        Ok(raw
            .into_iter()
            .filter(|op| !(self.hide_replication && op.is_replication()))
            .map(|op| op.into_operation(&self.info.address, sequence))
            .collect())
    }

    /// Fetch the server's status report.
    pub async fn fetch_status(&self, timeout: Duration) -> Result<RawStatus, ServerError> {
        bounded(timeout, self.client.server_status()).await
    }

    /// Explain a running query.
    pub async fn explain(
        &self,
        target: &ExplainTarget,
        timeout: Duration,
    ) -> Result<String, ServerError> {
        bounded(timeout, self.client.explain(target)).await
    }

    /// Kill an operation.
    pub async fn kill(&self, op_id: &OpId, timeout: Duration) -> Result<(), ServerError> {
        bounded(timeout, self.client.kill_op(op_id)).await
    }
}

/// Run a server call with a deadline.
async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, ServerError>
where
    F: Future<Output = Result<T, ServerError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ServerError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{raw_op, ScriptedClient};
    use super::*;

    fn handle(client: Arc<ScriptedClient>) -> ServerHandle {
        ServerHandle::new(ServerInfo::new("db1:27017", "db1"), client)
    }

    #[tokio::test]
    async fn test_fetch_tags_operations_with_server_and_sequence() {
        let client = Arc::new(ScriptedClient::new(vec![raw_op(1, 5), raw_op(2, 3)]));
        let ops = handle(client).fetch_operations(7, Duration::from_secs(1)).await.unwrap();

        assert_eq!(ops.len(), 2);
        assert!(ops.iter().all(|op| op.server == "db1:27017" && op.sequence == 7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_times_out() {
        let client = Arc::new(ScriptedClient::new(vec![raw_op(1, 5)]));
        client.set_delay(Some(Duration::from_secs(10)));

        let err = handle(client)
            .fetch_operations(1, Duration::from_millis(800))
            .await
            .unwrap_err();

        assert_eq!(err, ServerError::Timeout(Duration::from_millis(800)));
    }

    #[tokio::test]
    async fn test_hide_replication_filters_oplog_tailing() {
        let mut oplog = raw_op(3, 100);
        oplog.kind = "getmore".into();
        oplog.namespace = "local.oplog.rs".into();
        let client = Arc::new(ScriptedClient::new(vec![raw_op(1, 5), oplog]));

        let visible = handle(client.clone())
            .fetch_operations(1, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(visible.len(), 2);

        let filtered = handle(client)
            .with_hide_replication(true)
            .fetch_operations(2, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].op_id, OpId::Num(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_fetch_has_its_own_deadline() {
        let client = Arc::new(ScriptedClient::default());
        client.set_status(RawStatus {
            active_clients: 3,
            ..RawStatus::default()
        });
        let status = handle(client.clone()).fetch_status(Duration::from_secs(1)).await.unwrap();
        assert_eq!(status.active_clients, 3);

        client.set_delay(Some(Duration::from_secs(10)));
        let err = handle(client).fetch_status(Duration::from_millis(800)).await.unwrap_err();
        assert_eq!(err, ServerError::Timeout(Duration::from_millis(800)));
    }

    #[test]
    fn test_explain_target_requires_query_and_namespace() {
        let mut op = crate::data::snapshot::tests::op("db1", 1, 5);
        assert!(ExplainTarget::from_operation(&op).is_none());

        op.query = Some(serde_json::json!({"status": "open"}));
        let target = ExplainTarget::from_operation(&op).unwrap();
        assert_eq!(target.database, "app");
        assert_eq!(target.collection, "orders");

        op.namespace = "admin".into();
        assert!(ExplainTarget::from_operation(&op).is_none());
    }
}
