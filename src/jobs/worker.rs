use super::context::JobContext;
use super::job::Job;
use super::status::RefreshStatus;
use crate::error::ErrorKind;
use crate::server::metrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Keeps the in-flight gauge right even when a job panics.
struct InFlightGuard;

impl InFlightGuard {
    fn enter() -> Self {
        metrics::job_started();
        InFlightGuard
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        metrics::job_finished();
    }
}

/// Runs one job and reports how it went.
///
/// Errors end here: they are logged, counted and stored in the status
/// registry, never returned to the dispatcher.
#[derive(Clone)]
pub struct Worker {
    status: Arc<RefreshStatus>,
}

impl Worker {
    pub fn new(status: Arc<RefreshStatus>) -> Self {
        Self { status }
    }

    pub async fn work(&self, ctx: JobContext, job: Arc<dyn Job>) {
        let target = job.target();
        let _in_flight = InFlightGuard::enter();
        let started = Instant::now();

        let result = job.execute(&ctx).await;
        let elapsed = started.elapsed();

        match result {
            Ok(()) => {
                info!("Refresh of {} completed in {:?}", target, elapsed);
                self.status.record_success(target);
                metrics::record_job_execution(target, "success", elapsed);
            }
            Err(err) => {
                let kind = err.kind();
                match kind {
                    ErrorKind::RateLimited => {
                        warn!("Refresh of {} rate limited: {}", target, err);
                        metrics::record_rate_limit_hit(target);
                    }
                    ErrorKind::Cancelled => info!("Refresh of {} cancelled", target),
                    ErrorKind::FetchFailed | ErrorKind::Fatal => {
                        error!("Refresh of {} failed: {}", target, err)
                    }
                }
                self.status.record_failure(target, kind, err.to_string());
                metrics::record_job_execution(target, kind.as_str(), elapsed);
            }
        }
    }
}
