//! Data models for sampled operations.
//!
//! ## Submodules
//!
//! - [`duration`]: Parsing and formatting of duration strings (e.g., "1s", "500ms")
//! - [`model`]: Per-server types ([`ServerInfo`], [`Operation`], [`Batch`], [`Reachability`])
//! - [`snapshot`]: The merged, ranked [`Snapshot`] handed to the dashboard
//! - [`status`]: Server-wide figures ([`RawStatus`], [`Rates`], replica sets)
//!
//! ## Data Flow
//!
//! ```text
//! ServerClient (raw ops)
//!        │
//!        ▼
//! ServerHandle::fetch_operations()  ──▶ Vec<Operation>
//! ServerHandle::fetch_status()      ──▶ RawStatus ──▶ ServerDetails
//!        │
//!        ▼
//! Poller ──▶ Batch ──▶ Aggregator::publish()
//!                             │
//!                             ▼
//!                    Snapshot::build() (ranked, immutable)
//! ```

pub mod duration;
pub mod model;
pub mod snapshot;
pub mod status;

pub use model::{Batch, OpId, Operation, PollOutcome, Reachability, ServerInfo, ServerStatus};
pub use snapshot::{Snapshot, SnapshotEntry};
pub use status::{
    Rates, RawStatus, ReplicaMember, ReplicaRow, ReplicaSetStatus, ReplicationSource, ServerDetails,
    StatusCounters,
};
