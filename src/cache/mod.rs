//! Staging area between refresh jobs (writers) and the metrics collector
//! (reader).
//!
//! [`TtlCache`] is the generic expiring store. [`GitHubCache`] wraps it with
//! one typed setter/getter pair per GitHub resource, so callers never see
//! untyped values.

mod ttl;

pub use ttl::TtlCache;

use crate::github::{Account, Issue, Organization, PullRequest, Repository};
use crate::server::metrics;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The resource a cache entry holds for a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Org,
    Repos,
    Members,
    Pulls(String),
    Issues(String),
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Org => "org",
            ResourceKind::Repos => "repos",
            ResourceKind::Members => "members",
            ResourceKind::Pulls(_) => "pulls",
            ResourceKind::Issues(_) => "issues",
        }
    }
}

/// Composite cache key: one target plus one resource of that target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub target: String,
    pub kind: ResourceKind,
}

impl CacheKey {
    pub fn new(target: &str, kind: ResourceKind) -> Self {
        Self {
            target: target.to_string(),
            kind,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ResourceKind::Pulls(repo) => write!(f, "{}-{}-pulls", self.target, repo),
            ResourceKind::Issues(repo) => write!(f, "{}-{}-issues", self.target, repo),
            kind => write!(f, "{}-{}", self.target, kind.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
enum CachedValue {
    Org(Arc<Organization>),
    Repos(Arc<Vec<Repository>>),
    Members(Arc<Vec<Account>>),
    Pulls(Arc<Vec<PullRequest>>),
    Issues(Arc<Vec<Issue>>),
}

/// Typed view over the cached GitHub snapshot.
///
/// Values are stored behind `Arc`, so reads are cheap clones and a scrape
/// never holds the cache lock while rendering metrics.
pub struct GitHubCache {
    entries: TtlCache<CacheKey, CachedValue>,
    default_ttl: Duration,
}

impl GitHubCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: TtlCache::new(),
            default_ttl,
        }
    }

    pub fn put_org(&self, target: &str, org: Organization) {
        self.put(target, ResourceKind::Org, CachedValue::Org(Arc::new(org)));
    }

    pub fn org(&self, target: &str) -> Option<Arc<Organization>> {
        match self.lookup(target, ResourceKind::Org)? {
            CachedValue::Org(org) => Some(org),
            _ => None,
        }
    }

    pub fn put_repos(&self, target: &str, repos: Vec<Repository>) {
        self.put(
            target,
            ResourceKind::Repos,
            CachedValue::Repos(Arc::new(repos)),
        );
    }

    pub fn repos(&self, target: &str) -> Option<Arc<Vec<Repository>>> {
        match self.lookup(target, ResourceKind::Repos)? {
            CachedValue::Repos(repos) => Some(repos),
            _ => None,
        }
    }

    pub fn put_members(&self, target: &str, members: Vec<Account>) {
        self.put(
            target,
            ResourceKind::Members,
            CachedValue::Members(Arc::new(members)),
        );
    }

    pub fn members(&self, target: &str) -> Option<Arc<Vec<Account>>> {
        match self.lookup(target, ResourceKind::Members)? {
            CachedValue::Members(members) => Some(members),
            _ => None,
        }
    }

    pub fn put_pulls(&self, target: &str, repo: &str, pulls: Vec<PullRequest>) {
        self.put(
            target,
            ResourceKind::Pulls(repo.to_string()),
            CachedValue::Pulls(Arc::new(pulls)),
        );
    }

    pub fn pulls(&self, target: &str, repo: &str) -> Option<Arc<Vec<PullRequest>>> {
        match self.lookup(target, ResourceKind::Pulls(repo.to_string()))? {
            CachedValue::Pulls(pulls) => Some(pulls),
            _ => None,
        }
    }

    pub fn put_issues(&self, target: &str, repo: &str, issues: Vec<Issue>) {
        self.put(
            target,
            ResourceKind::Issues(repo.to_string()),
            CachedValue::Issues(Arc::new(issues)),
        );
    }

    pub fn issues(&self, target: &str, repo: &str) -> Option<Arc<Vec<Issue>>> {
        match self.lookup(target, ResourceKind::Issues(repo.to_string()))? {
            CachedValue::Issues(issues) => Some(issues),
            _ => None,
        }
    }

    /// Remove expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let purged = self.entries.purge_expired();
        metrics::record_cache_evictions(purged);
        purged
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn put(&self, target: &str, kind: ResourceKind, value: CachedValue) {
        let key = CacheKey::new(target, kind);
        tracing::trace!("Caching {} for {:?}", key, self.default_ttl);
        self.entries.set(key, value, self.default_ttl);
    }

    fn lookup(&self, target: &str, kind: ResourceKind) -> Option<CachedValue> {
        let resource = kind.as_str();
        let value = self.entries.get(&CacheKey::new(target, kind));
        metrics::record_cache_lookup(resource, value.is_some());
        value
    }
}
