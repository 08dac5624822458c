use super::context::JobContext;
use crate::error::ErrorKind;
use crate::github::FetchError;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// A resource that could not be refreshed, identified by its cache key.
#[derive(Debug, Clone)]
pub struct ResourceFailure {
    pub resource: String,
    pub error: FetchError,
}

impl fmt::Display for ResourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.resource, self.error)
    }
}

/// Errors that can occur during job execution.
#[derive(Debug, Error)]
pub enum JobError {
    /// GitHub throttled us; the job stopped at `resource`.
    #[error("rate limited while fetching {resource}: {source}")]
    RateLimited {
        resource: String,
        #[source]
        source: FetchError,
    },

    #[error("job was cancelled")]
    Cancelled,

    /// The job ran to the end but some resources kept their previous entry.
    #[error("{} resource(s) of {target} not refreshed: {}", .failures.len(), join_failures(.failures))]
    Incomplete {
        target: String,
        failures: Vec<ResourceFailure>,
    },
}

fn join_failures(failures: &[ResourceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::RateLimited { .. } => ErrorKind::RateLimited,
            JobError::Incomplete { .. } => ErrorKind::FetchFailed,
            JobError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Unit of work run by the dispatcher: refresh everything cached for one target.
///
/// A job is created once and resubmitted every cycle, so `execute` must not
/// consume or mutate the job.
#[async_trait]
pub trait Job: Send + Sync {
    /// The target (organization login) this job refreshes.
    fn target(&self) -> &str;

    /// Run the job once.
    ///
    /// Implementations check `ctx.is_cancelled()` before every external call
    /// and return `JobError::Cancelled` when it is set.
    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;
}
