//! Wiring of the real refresh pipeline around a [`FakeGitHub`]

use super::fake_github::FakeGitHub;
use async_trait::async_trait;
use github_developer_exporter::cache::GitHubCache;
use github_developer_exporter::github::GitHubApi;
use github_developer_exporter::jobs::{
    create_dispatcher, Dispatcher, DispatcherConfig, DispatcherHandle, Job, RefreshJob,
    RefreshScheduler, RefreshStatus, Ticker, Worker,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Upper bound for anything the tests wait on.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll `condition` until it holds.
///
/// # Panics
///
/// Panics with `what` if it does not hold within [`WAIT_TIMEOUT`].
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let waited = tokio::time::timeout(WAIT_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting until {}", what);
}

/// Ticker driven by the test: every `()` sent is one tick.
pub struct ManualTicker {
    ticks: mpsc::UnboundedReceiver<()>,
}

impl ManualTicker {
    pub fn new() -> (Self, mpsc::UnboundedSender<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { ticks: rx }, tx)
    }
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) {
        if self.ticks.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

/// Cache, status registry and a started dispatcher, with one refresh job
/// per fake organization.
pub struct Pipeline {
    pub github: Arc<FakeGitHub>,
    pub cache: Arc<GitHubCache>,
    pub status: Arc<RefreshStatus>,
    pub dispatcher: Dispatcher,
    pub handle: DispatcherHandle,
    pub jobs: Vec<Arc<dyn Job>>,
    pub shutdown: CancellationToken,
}

impl Pipeline {
    pub fn start(github: Arc<FakeGitHub>, max_workers: usize, max_queue: usize) -> Self {
        let cache = Arc::new(GitHubCache::new(Duration::from_secs(60)));
        let status = Arc::new(RefreshStatus::new());
        let (mut dispatcher, handle) = create_dispatcher(
            Worker::new(status.clone()),
            DispatcherConfig {
                max_workers,
                max_queue,
            },
        );
        let shutdown = CancellationToken::new();
        dispatcher
            .start(shutdown.clone())
            .expect("Failed to start dispatcher");

        let api: Arc<dyn GitHubApi> = github.clone();
        let jobs = github
            .logins()
            .iter()
            .map(|login| {
                Arc::new(RefreshJob::new(login.clone(), api.clone(), cache.clone())) as Arc<dyn Job>
            })
            .collect();

        Self {
            github,
            cache,
            status,
            dispatcher,
            handle,
            jobs,
            shutdown,
        }
    }

    pub fn job(&self, target: &str) -> Arc<dyn Job> {
        self.jobs
            .iter()
            .find(|job| job.target() == target)
            .cloned()
            .expect("no job for target")
    }

    pub fn scheduler(&self, ticker: ManualTicker) -> RefreshScheduler {
        RefreshScheduler::new(self.jobs.clone(), self.handle.clone(), Box::new(ticker))
    }

    pub fn finished(&self, target: &str) -> bool {
        self.status.get(target).is_some()
    }

    pub async fn wait_for_all(&self) {
        let targets: Vec<String> = self.github.logins().to_vec();
        wait_until("every target was refreshed", || {
            targets.iter().all(|t| self.finished(t))
        })
        .await;
    }

    /// Cancel and wait for the dispatcher to drain.
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        tokio::time::timeout(WAIT_TIMEOUT, self.dispatcher.wait())
            .await
            .expect("dispatcher did not stop");
    }
}
