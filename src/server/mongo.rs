//! MongoDB driver.
//!
//! Uses the `currentOp`, `serverStatus`, `replSetGetStatus`, `explain` and
//! `killOp` commands, plus `local.sources` for legacy replication. The driver
//! client is built on first use, so an unreachable or unresolvable server
//! does not fail startup; it simply fails its polls.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use tokio::sync::OnceCell;

use super::{ExplainTarget, RawOperation, ServerClient};
use crate::data::{OpId, RawStatus, ReplicaMember, ReplicaSetStatus, ReplicationSource, StatusCounters};
use crate::error::ServerError;

/// A connection to one `mongod` or `mongos`.
#[derive(Debug)]
pub struct MongoClient {
    uri: String,
    timeout: Duration,
    client: OnceCell<Client>,
}

impl MongoClient {
    /// A client for `host:port` (or a full `mongodb://` URI).
    ///
    /// Nothing is resolved or dialled here. `timeout` bounds connection setup
    /// and server selection inside the driver; per-call deadlines are still
    /// applied by the handle.
    pub fn new(address: &str, timeout: Duration) -> Self {
        Self {
            uri: connection_uri(address),
            timeout,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&Client, ServerError> {
        self.client
            .get_or_try_init(|| async {
                let mut options = ClientOptions::parse(&self.uri).await.map_err(driver_error)?;
                options.app_name = Some("opwatch".to_string());
                options.connect_timeout = Some(self.timeout);
                options.server_selection_timeout = Some(self.timeout);
                Client::with_options(options).map_err(driver_error)
            })
            .await
    }

    async fn admin(&self) -> Result<Database, ServerError> {
        Ok(self.client().await?.database("admin"))
    }

    async fn replica_set(&self) -> Option<ReplicaSetStatus> {
        let admin = self.admin().await.ok()?;
        match admin.run_command(doc! { "replSetGetStatus": 1 }).await {
            Ok(reply) => parse_replica_set(&reply),
            // Standalone servers reject the command.
            Err(e) => {
                tracing::trace!(server = %self.uri, error = %e, "no replica set status");
                None
            }
        }
    }

    async fn replication_source(&self) -> Option<ReplicationSource> {
        let client = self.client().await.ok()?;
        let sources = client.database("local").collection::<Document>("sources");
        match sources.find_one(doc! {}).await {
            Ok(source) => source.as_ref().and_then(parse_replication_source),
            Err(e) => {
                tracing::trace!(server = %self.uri, error = %e, "no replication source");
                None
            }
        }
    }
}

fn connection_uri(address: &str) -> String {
    if address.starts_with("mongodb://") || address.starts_with("mongodb+srv://") {
        address.to_string()
    } else {
        format!("mongodb://{}/?directConnection=true", address)
    }
}

#[async_trait]
impl ServerClient for MongoClient {
    async fn current_operations(&self) -> Result<Vec<RawOperation>, ServerError> {
        let reply = self
            .admin()
            .await?
            .run_command(doc! { "currentOp": 1 })
            .await
            .map_err(driver_error)?;
        let inprog = reply
            .get_array("inprog")
            .map_err(|e| ServerError::Protocol(format!("currentOp reply: {}", e)))?;

        Ok(inprog.iter().filter_map(Bson::as_document).filter_map(parse_operation).collect())
    }

    async fn server_status(&self) -> Result<RawStatus, ServerError> {
        let reply = self
            .admin()
            .await?
            .run_command(doc! { "serverStatus": 1 })
            .await
            .map_err(driver_error)?;
        let mut status = parse_server_status(&reply);
        status.replica_set = self.replica_set().await;
        status.replication_source = self.replication_source().await;
        Ok(status)
    }

    async fn explain(&self, target: &ExplainTarget) -> Result<String, ServerError> {
        let (filter, sort) = query_parts(&target.query);

        let filter = json_to_document(filter)?;
        let mut find = doc! { "find": target.collection.as_str(), "filter": filter };
        if let Some(sort) = sort {
            find.insert("sort", json_to_document(sort)?);
        }

        let reply = self
            .client()
            .await?
            .database(&target.database)
            .run_command(doc! { "explain": find, "verbosity": "queryPlanner" })
            .await
            .map_err(driver_error)?;

        serde_json::to_string_pretty(&Bson::Document(reply).into_relaxed_extjson())
            .map_err(|e| ServerError::Protocol(e.to_string()))
    }

    async fn kill_op(&self, op_id: &OpId) -> Result<(), ServerError> {
        let op = match op_id {
            OpId::Num(n) => Bson::Int64(*n),
            OpId::Name(s) => Bson::String(s.clone()),
        };
        self.admin()
            .await?
            .run_command(doc! { "killOp": 1, "op": op })
            .await
            .map_err(driver_error)?;
        Ok(())
    }
}

fn driver_error(e: MongoError) -> ServerError {
    match *e.kind {
        ErrorKind::Command(_) => ServerError::Protocol(e.to_string()),
        _ => ServerError::Connection(e.to_string()),
    }
}

fn json_to_document(value: &serde_json::Value) -> Result<Document, ServerError> {
    match Bson::try_from(value.clone()) {
        Ok(Bson::Document(doc)) => Ok(doc),
        Ok(other) => Err(ServerError::Protocol(format!("expected a document, got {}", other))),
        Err(e) => Err(ServerError::Protocol(e.to_string())),
    }
}

/// Split a reported query into filter and sort.
///
/// Handles the `find` command shape (`filter`/`sort`), the legacy wrapped
/// shape (`$query`/`$orderby`), and a bare filter document.
fn query_parts(query: &serde_json::Value) -> (&serde_json::Value, Option<&serde_json::Value>) {
    let sort = ["sort", "$orderby", "orderby"].iter().find_map(|k| query.get(*k));
    let filter = ["filter", "$query", "query"].iter().find_map(|k| query.get(*k));
    match filter {
        Some(filter) => (filter, sort),
        None => (query, None),
    }
}

fn number(value: &Bson) -> Option<u64> {
    match value {
        Bson::Int32(n) => Some((*n).max(0) as u64),
        Bson::Int64(n) => Some((*n).max(0) as u64),
        Bson::Double(n) if n.is_finite() => Some(n.max(0.0) as u64),
        _ => None,
    }
}

/// A number at a dotted path, or zero when the server does not report it.
fn number_at(doc: &Document, path: &[&str]) -> u64 {
    let Some((last, parents)) = path.split_last() else {
        return 0;
    };
    let mut current = doc;
    for key in parents {
        match current.get_document(key) {
            Ok(next) => current = next,
            Err(_) => return 0,
        }
    }
    current.get(last).and_then(number).unwrap_or(0)
}

/// Counters and gauges from a `serverStatus` reply.
///
/// Fields missing on newer storage engines (`backgroundFlushing`,
/// `mem.mapped`) read as zero. Memory is reported in MiB.
fn parse_server_status(reply: &Document) -> RawStatus {
    let operations = reply
        .get_document("opcounters")
        .map(|counters| counters.values().filter_map(number).sum::<u64>())
        .unwrap_or(0);

    RawStatus {
        counters: StatusCounters {
            operations,
            flushes: number_at(reply, &["backgroundFlushing", "flushes"]),
            bytes_in: number_at(reply, &["network", "bytesIn"]),
            bytes_out: number_at(reply, &["network", "bytesOut"]),
        },
        active_clients: number_at(reply, &["globalLock", "activeClients", "total"]),
        queued: number_at(reply, &["globalLock", "currentQueue", "total"]),
        connections: number_at(reply, &["connections", "current"]),
        connections_available: number_at(reply, &["connections", "available"]),
        resident_bytes: number_at(reply, &["mem", "resident"]) << 20,
        mapped_bytes: number_at(reply, &["mem", "mapped"]) << 20,
        replication_source: None,
        replica_set: None,
    }
}

/// Members of a `replSetGetStatus` reply, arbiters excluded.
fn parse_replica_set(reply: &Document) -> Option<ReplicaSetStatus> {
    let name = reply.get_str("set").ok()?.to_string();
    let reported_at = reply.get_datetime("date").ok().map(|d| d.timestamp_millis());

    let members = reply
        .get_array("members")
        .ok()?
        .iter()
        .filter_map(Bson::as_document)
        .filter(|m| m.get_str("stateStr").map_or(true, |s| s != "ARBITER"))
        .map(|m| {
            let optime = m.get_datetime("optimeDate").ok().map(|d| d.timestamp_millis());
            ReplicaMember {
                name: m.get_str("name").unwrap_or_default().to_string(),
                state: m.get_str("stateStr").unwrap_or_default().to_string(),
                uptime: m.get("uptime").and_then(number).map(Duration::from_secs),
                lag: reported_at
                    .zip(optime)
                    .map(|(now, at)| Duration::from_millis(now.saturating_sub(at).max(0) as u64)),
                ping: m.get("pingMs").and_then(number).map(Duration::from_millis),
                is_self: m.get_bool("self").unwrap_or(false),
            }
        })
        .collect();

    Some(ReplicaSetStatus {
        name,
        reporter_is_primary: reply.get("myState").and_then(number) == Some(1),
        members,
    })
}

fn parse_replication_source(source: &Document) -> Option<ReplicationSource> {
    let synced_to = match source.get("syncedTo") {
        Some(Bson::Timestamp(ts)) => Some(SystemTime::UNIX_EPOCH + Duration::from_secs(u64::from(ts.time))),
        Some(Bson::DateTime(dt)) => Some(dt.to_system_time()),
        _ => None,
    };
    Some(ReplicationSource {
        host: source.get_str("host").ok()?.to_string(),
        synced_to,
    })
}

fn parse_operation(op: &Document) -> Option<RawOperation> {
    let op_id = match op.get("opid")? {
        Bson::Int32(n) => OpId::Num(*n as i64),
        Bson::Int64(n) => OpId::Num(*n),
        Bson::Double(n) => OpId::Num(*n as i64),
        Bson::String(s) => OpId::from(s.as_str()),
        _ => return None,
    };

    let running = match (op.get("microsecs_running"), op.get("secs_running")) {
        (Some(Bson::Int64(us)), _) => Some(Duration::from_micros((*us).max(0) as u64)),
        (_, Some(Bson::Int32(s))) => Some(Duration::from_secs((*s).max(0) as u64)),
        (_, Some(Bson::Int64(s))) => Some(Duration::from_secs((*s).max(0) as u64)),
        _ => None,
    };

    let query = op
        .get_document("query")
        .or_else(|_| op.get_document("command"))
        .ok()
        .map(|d| Bson::Document(d.clone()).into_relaxed_extjson());

    let description = match &query {
        Some(q) => match q.get("$msg").and_then(|m| m.as_str()) {
            Some(msg) => msg.to_string(),
            None => q.to_string(),
        },
        None => String::new(),
    };

    Some(RawOperation {
        op_id,
        kind: op.get_str("op").unwrap_or_default().to_string(),
        namespace: op.get_str("ns").unwrap_or_default().to_string(),
        running,
        client: op
            .get_str("client")
            .or_else(|_| op.get_str("client_s"))
            .unwrap_or_default()
            .to_string(),
        description,
        query,
    })
}
