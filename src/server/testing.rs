//! Scripted [`ServerClient`] for tests.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ExplainTarget, RawOperation, ServerClient};
use crate::data::{OpId, RawStatus};
use crate::error::ServerError;

pub(crate) fn raw_op(id: i64, secs: u64) -> RawOperation {
    RawOperation {
        op_id: OpId::Num(id),
        kind: "query".to_string(),
        namespace: "app.orders".to_string(),
        running: Some(Duration::from_secs(secs)),
        client: "10.0.0.1:51234".to_string(),
        description: "{\"status\":\"open\"}".to_string(),
        query: Some(serde_json::json!({"status": "open"})),
    }
}

#[derive(Debug, Default)]
struct Script {
    operations: Vec<RawOperation>,
    status: RawStatus,
    status_error: Option<ServerError>,
    queued_failures: VecDeque<ServerError>,
    failing: Option<ServerError>,
    delay: Option<Duration>,
    kill_error: Option<ServerError>,
    killed: Vec<OpId>,
    fetches: usize,
}

/// A client whose answers are set by the test.
///
/// Killing an operation removes it from later listings, like a real server.
#[derive(Debug, Default)]
pub(crate) struct ScriptedClient {
    script: Mutex<Script>,
}

impl ScriptedClient {
    pub(crate) fn new(operations: Vec<RawOperation>) -> Self {
        Self {
            script: Mutex::new(Script {
                operations,
                ..Script::default()
            }),
        }
    }

    pub(crate) fn set_status(&self, status: RawStatus) {
        self.script.lock().status = status;
    }

    /// Fail every status call until cleared; listings are unaffected.
    pub(crate) fn set_status_error(&self, error: Option<ServerError>) {
        self.script.lock().status_error = error;
    }

    /// Fail only the next listing.
    pub(crate) fn fail_next(&self, error: ServerError) {
        self.script.lock().queued_failures.push_back(error);
    }

    /// Fail every listing until cleared.
    pub(crate) fn set_failing(&self, error: Option<ServerError>) {
        self.script.lock().failing = error;
    }

    /// Delay every call by this long before answering.
    pub(crate) fn set_delay(&self, delay: Option<Duration>) {
        self.script.lock().delay = delay;
    }

    pub(crate) fn set_kill_error(&self, error: Option<ServerError>) {
        self.script.lock().kill_error = error;
    }

    pub(crate) fn killed(&self) -> Vec<OpId> {
        self.script.lock().killed.clone()
    }

    pub(crate) fn fetches(&self) -> usize {
        self.script.lock().fetches
    }

    async fn pause(&self) {
        let delay = self.script.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ServerClient for ScriptedClient {
    async fn current_operations(&self) -> Result<Vec<RawOperation>, ServerError> {
        self.pause().await;
        let mut script = self.script.lock();
        script.fetches += 1;
        if let Some(err) = script.queued_failures.pop_front() {
            return Err(err);
        }
        if let Some(err) = &script.failing {
            return Err(err.clone());
        }
        Ok(script.operations.clone())
    }

    async fn server_status(&self) -> Result<RawStatus, ServerError> {
        self.pause().await;
        let script = self.script.lock();
        match &script.status_error {
            Some(err) => Err(err.clone()),
            None => Ok(script.status.clone()),
        }
    }

    async fn explain(&self, target: &ExplainTarget) -> Result<String, ServerError> {
        self.pause().await;
        Ok(format!(
            "plan for {} on {}.{}",
            target.op_id, target.database, target.collection
        ))
    }

    async fn kill_op(&self, op_id: &OpId) -> Result<(), ServerError> {
        self.pause().await;
        let mut script = self.script.lock();
        if let Some(err) = &script.kill_error {
            return Err(err.clone());
        }
        script.operations.retain(|op| &op.op_id != op_id);
        script.killed.push(op_id.clone());
        Ok(())
    }
}
