//! In-process fanout of job lifecycle events.
//!
//! The dispatcher publishes fire-and-forget; subscribers (retry drivers,
//! observability tooling) attach per service or globally over bounded
//! broadcast channels and must tolerate lag.

pub mod bus;

pub use bus::{
    JobEventBus, JobEventBusConfig, DEFAULT_GLOBAL_BUFFER_CAPACITY,
    DEFAULT_SERVICE_BUFFER_CAPACITY,
};
