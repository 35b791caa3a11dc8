use backlog_protocol::{BacklogError, JobStatus};
use serde_json::Value;

pub(crate) fn status_to_db(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "Queued",
        JobStatus::Started => "Started",
        JobStatus::Completed => "Completed",
        JobStatus::Error => "Error",
    }
}

pub(crate) fn status_from_db(raw: &str) -> Result<JobStatus, BacklogError> {
    match raw {
        "Queued" => Ok(JobStatus::Queued),
        "Started" => Ok(JobStatus::Started),
        "Completed" => Ok(JobStatus::Completed),
        "Error" => Ok(JobStatus::Error),
        other => Err(BacklogError::Persistence(format!(
            "unknown job status '{other}' in store"
        ))),
    }
}

pub(crate) fn params_to_db(params: &Value) -> String {
    params.to_string()
}

pub(crate) fn params_from_db(raw: &str) -> Result<Value, BacklogError> {
    serde_json::from_str(raw)
        .map_err(|err| BacklogError::Persistence(format!("invalid params payload in store: {err}")))
}

/// Fingerprints are stored as text; sqlite INTEGER is signed 64-bit and would
/// reject the upper half of the u64 range.
pub(crate) fn fingerprint_to_db(fingerprint: u64) -> String {
    format!("{fingerprint:016x}")
}

pub(crate) fn fingerprint_from_db(raw: &str) -> Result<u64, BacklogError> {
    u64::from_str_radix(raw, 16).map_err(|err| {
        BacklogError::Persistence(format!("invalid params fingerprint '{raw}' in store: {err}"))
    })
}
