//! # Langbridge Worker
//!
//! Lifecycle management for the background analysis worker.
//!
//! ## Architecture Overview
//!
//! ```text
//!  interaction thread                     background context
//! ┌────────────────────┐    spawn/sync   ┌──────────────────┐
//! │   WorkerManager    │ ──────────────▶ │  AnalysisWorker  │
//! │  - lazy spawn      │    requests     │  (LocalWorker:   │
//! │  - coalesced spawn │ ◀────────────── │   thread + loop  │
//! │  - invalidation    │    responses    │   over the word  │
//! │  - idle reaper     │                 │   index engine)  │
//! └────────────────────┘                 └──────────────────┘
//! ```
//!
//! The manager is the sole owner of the worker. Feature providers and the
//! validation pipeline only ever hold a short-lived [`WorkerLease`] obtained
//! through [`WorkerManager::proxy`]; leases keep the idle reaper from
//! evicting a worker that is still servicing requests.

pub mod engine;
pub mod local;
pub mod manager;
pub mod proxy;

pub use engine::WordIndexEngine;
pub use local::{LocalSpawner, LocalWorker};
pub use manager::{WorkerLease, WorkerManager, WorkerTiming};
pub use proxy::{
    AnalysisWorker, Diagnostic, DiagnosticClass, ResourceState, StructuralOptions, WorkerInit,
    WorkerSpawner,
};

/// Result type for worker operations
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors from the worker lifecycle and request path
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The background context could not be started. Never cached: the next
    /// request retries the spawn from scratch.
    #[error("Analysis worker unavailable: {0}")]
    ProxyUnavailable(String),

    #[error("Analysis worker stopped")]
    WorkerStopped,

    #[error("Worker request failed: {0}")]
    RequestFailed(String),

    #[error("Worker manager disposed")]
    ManagerDisposed,
}
