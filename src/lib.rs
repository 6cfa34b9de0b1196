//! # opwatch
//!
//! A `top` for database operations: samples the in-flight operations of
//! several servers at once, merges them into one table ranked by running
//! time, and lets the operator explain or kill the selected operation.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                          Supervisor                            │
//! │  ┌──────────┐                                                  │
//! │  │ Poller A │──┐                                               │
//! │  └──────────┘  │ Batch  ┌────────────┐ Arc<Snapshot> ┌─────────┐│
//! │  ┌──────────┐  ├───────▶│ Aggregator │──────────────▶│Dashboard││
//! │  │ Poller B │──┘        └────────────┘   (watch)     └────┬────┘│
//! │  └──────────┘                                           │     │
//! │       │                ┌──────────────────┐  Action     │     │
//! │       ▼                │ ActionDispatcher │◀────────────┘     │
//! │  ServerHandle ◀────────┤ (explain, kill)  │                   │
//! │  (ServerClient)        └──────────────────┘                   │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`server`]**: [`ServerHandle`] wraps a [`ServerClient`] driver with
//!   deadlines; [`DemoClient`] simulates a server, `MongoClient` talks to
//!   MongoDB (`mongo` feature)
//! - **[`poller`]**: one task per server sampling on a fixed interval
//! - **[`aggregator`]**: merges each server's latest [`Batch`] into an
//!   immutable, ranked [`Snapshot`], including each server's status figures
//!   and the merged replica set view
//! - **[`dispatcher`]**: explain and kill on behalf of the operator
//! - **[`supervisor`]**: starts, restarts and stops the pollers
//! - **[`app`]**, **[`events`]**, **[`ui`]**, **[`dashboard`]**: the terminal
//!   interface
//!
//! A server that fails to answer within its deadline contributes an empty
//! batch and is shown as unreachable; it never stalls the other servers or
//! the dashboard.
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Watch two servers
//! opwatch db1.example db2.example:27018
//!
//! # Use a config file and log to a file
//! opwatch --config opwatch.toml --log-file opwatch.log
//!
//! # Try it without a database
//! opwatch --demo
//! ```
//!
//! ### As a library
//!
//! ```
//! use std::sync::Arc;
//! use opwatch::{DemoClient, ServerHandle, ServerInfo, Supervisor, Timing};
//!
//! # tokio_test::block_on(async {
//! let handle = ServerHandle::new(
//!     ServerInfo::new("demo:27017", "demo"),
//!     Arc::new(DemoClient::new("demo:27017")),
//! );
//! let supervisor = Supervisor::start(vec![Arc::new(handle)], Timing::default());
//!
//! let snapshot = supervisor.aggregator().current_snapshot();
//! assert_eq!(snapshot.servers.len(), 1);
//!
//! supervisor.shutdown().await;
//! # });
//! ```

pub mod aggregator;
pub mod app;
pub mod config;
pub mod dashboard;
pub mod data;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod logging;
pub mod poller;
pub mod server;
pub mod source;
pub mod supervisor;
pub mod ui;

// Re-export main types for convenience
pub use aggregator::Aggregator;
pub use app::App;
pub use config::{Overrides, ServerSpec, Settings};
pub use data::{
    Batch, OpId, Operation, Rates, RawStatus, Reachability, ReplicaSetStatus, ServerDetails, ServerInfo,
    ServerStatus, Snapshot, SnapshotEntry,
};
pub use dispatcher::{ActionDispatcher, KillReport, OpTarget};
pub use error::{ActionError, ConfigError, ServerError};
pub use poller::{Poller, PollerCommand, PollerConfig, PollerState};
pub use server::{DemoClient, ServerClient, ServerHandle};
#[cfg(feature = "mongo")]
pub use server::MongoClient;
pub use source::SnapshotSource;
pub use supervisor::{Supervisor, Timing};
