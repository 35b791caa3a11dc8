//! Admission control and idempotent dispatch for capacity-limited services.
//!
//! The dispatcher decides start-vs-queue atomically against a persistent job
//! record store, absorbs downstream quota rejections by requeueing, and
//! resolves naming conflicts by consulting the downstream service's own view
//! of the job instead of failing or duplicating work.

pub mod dispatcher;
pub mod quota;
pub mod registry;
pub mod resolver;
pub mod store;

pub use dispatcher::{BacklogDispatcher, RetrySweepReport, TerminalOutcome};
pub use quota::QuotaTracker;
pub use registry::AdapterRegistry;
pub use resolver::{resolve_submission_conflict, ConflictVerdict};
pub use store::{
    CasOutcome, CreateOutcome, JobRecordStore, NewJobRecord, SqliteJobStore, StatusPatch,
};

#[cfg(test)]
mod test_support;
