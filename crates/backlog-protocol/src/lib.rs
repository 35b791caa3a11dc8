//! Shared vocabulary for the backlog job dispatch workspace.
//!
//! Everything the dispatcher, the stores, and the per-service adapters
//! exchange lives here: identifiers, job records, the adapter contract,
//! lifecycle events, and the error taxonomy.

pub mod adapter;
pub mod error;
pub mod event;
pub mod ids;
pub mod record;

pub use adapter::{AdapterError, DownstreamJobState, FailureKind, ServiceAdapter};
pub use error::{BacklogError, BacklogResult};
pub use event::{JobEvent, JobEventKind, NotificationPublisher};
pub use ids::{DownstreamJobId, JobId, ServiceApi};
pub use record::{params_fingerprint, JobKey, JobRecord, JobStatus};
