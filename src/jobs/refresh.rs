//! The refresh job: pull one organization's data from GitHub into the cache.

use super::context::JobContext;
use super::job::{Job, JobError, ResourceFailure};
use crate::cache::{CacheKey, GitHubCache, ResourceKind};
use crate::github::{FetchError, GitHubApi, Page};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

enum StepError {
    Cancelled,
    Fetch(FetchError),
}

/// Refreshes the organization record, repositories, members and the
/// per-repository pull requests and open issues of one target.
///
/// A resource is written only after all of its pages were fetched. A rate
/// limit aborts the whole job; any other failure skips that resource and the
/// job carries on.
pub struct RefreshJob {
    target: String,
    api: Arc<dyn GitHubApi>,
    cache: Arc<GitHubCache>,
    max_pulls_per_repo: Option<usize>,
}

impl RefreshJob {
    pub fn new(target: impl Into<String>, api: Arc<dyn GitHubApi>, cache: Arc<GitHubCache>) -> Self {
        Self {
            target: target.into(),
            api,
            cache,
            max_pulls_per_repo: None,
        }
    }

    /// Keep at most `limit` pull requests per repository (most recently
    /// updated first). `None` fetches them all.
    pub fn with_pulls_limit(mut self, limit: Option<usize>) -> Self {
        self.max_pulls_per_repo = limit;
        self
    }

    /// Turn a step result into a value, a recorded failure or a job abort.
    fn settle<T>(
        &self,
        kind: ResourceKind,
        result: Result<T, StepError>,
        failures: &mut Vec<ResourceFailure>,
    ) -> Result<Option<T>, JobError> {
        let resource = CacheKey::new(&self.target, kind).to_string();
        match result {
            Ok(value) => Ok(Some(value)),
            Err(StepError::Cancelled) => {
                debug!("Refresh of {} cancelled before {}", self.target, resource);
                Err(JobError::Cancelled)
            }
            Err(StepError::Fetch(source)) if source.is_rate_limited() => {
                Err(JobError::RateLimited { resource, source })
            }
            Err(StepError::Fetch(error)) => {
                warn!("Failed to fetch {}: {}", resource, error);
                failures.push(ResourceFailure { resource, error });
                Ok(None)
            }
        }
    }
}

/// Fetch pages starting at 1 until `next_page` runs out or `limit` items
/// were collected.
async fn collect_pages<T, F, Fut>(
    ctx: &JobContext,
    limit: Option<usize>,
    mut fetch_page: F,
) -> Result<Vec<T>, StepError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, FetchError>>,
{
    let mut items = Vec::new();
    let mut page = 1;

    loop {
        if ctx.is_cancelled() {
            return Err(StepError::Cancelled);
        }

        let fetched = fetch_page(page).await.map_err(StepError::Fetch)?;
        items.extend(fetched.items);

        if let Some(limit) = limit {
            if items.len() >= limit {
                items.truncate(limit);
                break;
            }
        }

        match fetched.next_page {
            // A next page that does not move forward would loop forever.
            Some(next) if next > page => page = next,
            _ => break,
        }
    }

    Ok(items)
}

#[async_trait]
impl Job for RefreshJob {
    fn target(&self) -> &str {
        &self.target
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        let api = self.api.as_ref();
        let target = self.target.as_str();
        let mut failures = Vec::new();

        let org = if ctx.is_cancelled() {
            Err(StepError::Cancelled)
        } else {
            api.fetch_org(target).await.map_err(StepError::Fetch)
        };
        if let Some(org) = self.settle(ResourceKind::Org, org, &mut failures)? {
            self.cache.put_org(target, org);
        }

        let repos = collect_pages(ctx, None, move |page| api.list_repos(target, page)).await;
        let repos = self.settle(ResourceKind::Repos, repos, &mut failures)?;
        if let Some(repos) = &repos {
            self.cache.put_repos(target, repos.clone());
        }

        let members = collect_pages(ctx, None, move |page| api.list_members(target, page)).await;
        if let Some(members) = self.settle(ResourceKind::Members, members, &mut failures)? {
            self.cache.put_members(target, members);
        }

        let repos = repos.unwrap_or_default();
        for repo in &repos {
            let name = repo.name.as_str();

            let pulls = collect_pages(ctx, self.max_pulls_per_repo, move |page| {
                api.list_pulls(target, name, page)
            })
            .await;
            let kind = ResourceKind::Pulls(name.to_string());
            if let Some(pulls) = self.settle(kind, pulls, &mut failures)? {
                self.cache.put_pulls(target, name, pulls);
            }

            let issues =
                collect_pages(ctx, None, move |page| api.list_issues(target, name, page)).await;
            let kind = ResourceKind::Issues(name.to_string());
            if let Some(issues) = self.settle(kind, issues, &mut failures)? {
                self.cache.put_issues(target, name, issues);
            }
        }

        if failures.is_empty() {
            info!("Refreshed {} ({} repositories)", target, repos.len());
            Ok(())
        } else {
            Err(JobError::Incomplete {
                target: target.to_string(),
                failures,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::github::{Account, Issue, Organization, PullRequest, Repository};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// In-memory API: repos are served two per page, pulls one per page.
    #[derive(Default)]
    struct ScriptedApi {
        repos: Vec<&'static str>,
        pulls_per_repo: usize,
        failing: Mutex<HashMap<&'static str, FetchError>>,
        calls: AtomicUsize,
        cancel_after_calls: Option<(usize, CancellationToken)>,
    }

    impl ScriptedApi {
        fn fail(&self, call: &'static str, error: FetchError) {
            self.failing.lock().unwrap().insert(call, error);
        }

        fn check(&self, call: &'static str) -> Result<(), FetchError> {
            let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((limit, token)) = &self.cancel_after_calls {
                if calls >= *limit {
                    token.cancel();
                }
            }
            match self.failing.lock().unwrap().get(call) {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }

    fn page<T>(mut items: Vec<T>, page: u32, per_page: usize) -> Page<T> {
        let start = (page as usize - 1) * per_page;
        let total = items.len();
        let chunk: Vec<T> = items.drain(..).skip(start).take(per_page).collect();
        Page {
            items: chunk,
            next_page: (start + per_page < total).then_some(page + 1),
        }
    }

    #[async_trait]
    impl GitHubApi for ScriptedApi {
        async fn fetch_org(&self, org: &str) -> Result<Organization, FetchError> {
            self.check("org")?;
            Ok(Organization {
                login: org.to_string(),
                ..Default::default()
            })
        }

        async fn list_repos(&self, org: &str, p: u32) -> Result<Page<Repository>, FetchError> {
            self.check("repos")?;
            let repos = self
                .repos
                .iter()
                .map(|name| Repository {
                    name: name.to_string(),
                    full_name: format!("{}/{}", org, name),
                    ..Default::default()
                })
                .collect();
            Ok(page(repos, p, 2))
        }

        async fn list_members(&self, _org: &str, _p: u32) -> Result<Page<Account>, FetchError> {
            self.check("members")?;
            Ok(Page::last(vec![Account {
                login: "alice".to_string(),
            }]))
        }

        async fn list_pulls(
            &self,
            _org: &str,
            _repo: &str,
            p: u32,
        ) -> Result<Page<PullRequest>, FetchError> {
            self.check("pulls")?;
            let pulls = (1..=self.pulls_per_repo as u64)
                .map(|number| PullRequest {
                    number,
                    ..Default::default()
                })
                .collect();
            Ok(page(pulls, p, 1))
        }

        async fn list_issues(
            &self,
            _org: &str,
            _repo: &str,
            _p: u32,
        ) -> Result<Page<Issue>, FetchError> {
            self.check("issues")?;
            Ok(Page::last(vec![]))
        }
    }

    fn cache() -> Arc<GitHubCache> {
        Arc::new(GitHubCache::new(Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn test_refresh_writes_every_resource() {
        let api = Arc::new(ScriptedApi {
            repos: vec!["api", "web", "docs"],
            pulls_per_repo: 3,
            ..Default::default()
        });
        let cache = cache();
        let job = RefreshJob::new("acme", api, cache.clone());

        job.execute(&JobContext::default()).await.unwrap();

        assert_eq!(cache.org("acme").unwrap().login, "acme");
        assert_eq!(cache.repos("acme").unwrap().len(), 3);
        assert_eq!(cache.members("acme").unwrap().len(), 1);
        for repo in ["api", "web", "docs"] {
            assert_eq!(cache.pulls("acme", repo).unwrap().len(), 3);
            assert!(cache.issues("acme", repo).is_some());
        }
    }

    #[tokio::test]
    async fn test_pulls_limit_caps_pages() {
        let api = Arc::new(ScriptedApi {
            repos: vec!["api"],
            pulls_per_repo: 10,
            ..Default::default()
        });
        let cache = cache();
        let job = RefreshJob::new("acme", api.clone(), cache.clone()).with_pulls_limit(Some(2));

        job.execute(&JobContext::default()).await.unwrap();

        assert_eq!(cache.pulls("acme", "api").unwrap().len(), 2);
        // org + repos + members + 2 pull pages + issues
        assert_eq!(api.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_resource_and_keeps_previous_entry() {
        let api = Arc::new(ScriptedApi {
            repos: vec!["api"],
            ..Default::default()
        });
        api.fail(
            "members",
            FetchError::Status {
                status: 502,
                message: "bad gateway".to_string(),
            },
        );
        let cache = cache();
        cache.put_members(
            "acme",
            vec![Account {
                login: "previous".to_string(),
            }],
        );
        let job = RefreshJob::new("acme", api, cache.clone());

        let err = job.execute(&JobContext::default()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::FetchFailed);
        match err {
            JobError::Incomplete { failures, .. } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].resource, "acme-members");
            }
            other => panic!("expected incomplete, got {:?}", other),
        }
        assert_eq!(cache.members("acme").unwrap()[0].login, "previous");
        assert!(cache.repos("acme").is_some());
        assert!(cache.pulls("acme", "api").is_some());
    }

    #[tokio::test]
    async fn test_failed_repo_listing_skips_per_repo_resources() {
        let api = Arc::new(ScriptedApi {
            repos: vec!["api"],
            ..Default::default()
        });
        api.fail("repos", FetchError::Request("connection reset".to_string()));
        let cache = cache();
        let job = RefreshJob::new("acme", api, cache.clone());

        let err = job.execute(&JobContext::default()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::FetchFailed);
        assert!(cache.org("acme").is_some());
        assert!(cache.members("acme").is_some());
        assert!(cache.repos("acme").is_none());
        assert!(cache.pulls("acme", "api").is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_aborts_job() {
        let api = Arc::new(ScriptedApi {
            repos: vec!["api"],
            ..Default::default()
        });
        api.fail("repos", FetchError::RateLimited { reset_at: None });
        let cache = cache();
        let job = RefreshJob::new("acme", api, cache.clone());

        let err = job.execute(&JobContext::default()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert!(cache.org("acme").is_some());
        assert!(cache.repos("acme").is_none());
        assert!(cache.members("acme").is_none());
    }

    #[tokio::test]
    async fn test_cancellation_between_pages_discards_partial_resource() {
        let token = CancellationToken::new();
        // Cancel during the first repos page; the second page is never requested.
        let api = Arc::new(ScriptedApi {
            repos: vec!["a", "b", "c"],
            cancel_after_calls: Some((2, token.clone())),
            ..Default::default()
        });
        let cache = cache();
        let job = RefreshJob::new("acme", api.clone(), cache.clone());

        let err = job.execute(&JobContext::new(token)).await.unwrap_err();

        assert!(matches!(err, JobError::Cancelled));
        assert!(cache.org("acme").is_some());
        assert!(cache.repos("acme").is_none());
        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_makes_no_calls() {
        let token = CancellationToken::new();
        token.cancel();
        let api = Arc::new(ScriptedApi::default());
        let job = RefreshJob::new("acme", api.clone(), cache());

        let err = job.execute(&JobContext::new(token)).await.unwrap_err();

        assert!(matches!(err, JobError::Cancelled));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }
}
