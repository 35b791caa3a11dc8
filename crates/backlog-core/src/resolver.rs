use backlog_protocol::{
    AdapterError, DownstreamJobId, DownstreamJobState, JobId, ServiceAdapter, ServiceApi,
};

/// Outcome of probing the downstream service after a submission conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictVerdict {
    /// The conflicting job is still running or queued downstream. The earlier
    /// submission (ours or a retried twin) succeeded; treat this call as
    /// having started the job.
    DuplicateOfActive(DownstreamJobId),
    /// The conflicting job already finished. The conflict must surface so the
    /// caller does not requeue a job the service considers done.
    DuplicateOfTerminal(DownstreamJobState),
    /// The status probe itself failed; nothing safe can be concluded.
    Unresolvable(AdapterError),
}

/// A service reports a naming conflict both for a benign retry of the same
/// request and for an id reused after its job ran to completion. Only a fresh
/// status query tells the two apart.
pub async fn resolve_submission_conflict(
    adapter: &dyn ServiceAdapter,
    service_api: &ServiceApi,
    id: &JobId,
) -> ConflictVerdict {
    match adapter.query_status(service_api, id).await {
        Ok(state) if state.is_terminal() => ConflictVerdict::DuplicateOfTerminal(state),
        // The id doubles as the downstream job name for conflict-capable
        // services, so the confirmed name is the id itself.
        Ok(_) => ConflictVerdict::DuplicateOfActive(DownstreamJobId::new(id.as_str())),
        Err(err) => ConflictVerdict::Unresolvable(err),
    }
}
