use thiserror::Error;

use crate::adapter::AdapterError;
use crate::ids::{JobId, ServiceApi};
use crate::record::JobStatus;

#[derive(Debug, Error)]
pub enum BacklogError {
    #[error("unsupported service api: {0}")]
    UnsupportedService(ServiceApi),
    #[error("job {id} already registered for {service_api} with different params")]
    CreationConflict { service_api: ServiceApi, id: JobId },
    #[error("job {id} already ran to completion on {service_api}: {message}")]
    TerminalConflict {
        service_api: ServiceApi,
        id: JobId,
        message: String,
    },
    #[error("job {id} on {service_api} is {found:?}, expected {expected:?}")]
    InvalidTransition {
        service_api: ServiceApi,
        id: JobId,
        expected: JobStatus,
        found: JobStatus,
    },
    #[error("no job record for {id} on {service_api}")]
    JobNotFound { service_api: ServiceApi, id: JobId },
    #[error("backlog persistence error: {0}")]
    Persistence(String),
    #[error(transparent)]
    Submission(#[from] AdapterError),
    #[error("notification publish failed: {0}")]
    Notification(String),
}

pub type BacklogResult<T> = Result<T, BacklogError>;
