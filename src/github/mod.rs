//! Access to the GitHub REST API.
//!
//! The refresh pipeline only sees the [`GitHubApi`] trait; [`GitHubClient`]
//! is the `reqwest` implementation used by the binary.

mod client;
pub mod models;

pub use client::{parse_next_page, GitHubClient, GitHubClientConfig};
pub use models::{Account, Issue, Label, Organization, PullRequest, Repository};

use crate::error::ErrorKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// One page of a paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Page number to request next, `None` when the listing is exhausted.
    pub next_page: Option<u32>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_page: None,
        }
    }
}

/// Errors returned by the fetch capability.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("rate limit exceeded (resets at {})", format_reset(.reset_at))]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

fn format_reset(reset_at: &Option<DateTime<Utc>>) -> String {
    reset_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string())
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::RateLimited { .. } => ErrorKind::RateLimited,
            _ => ErrorKind::FetchFailed,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind() == ErrorKind::RateLimited
    }
}

/// The calls a refresh job makes against GitHub.
///
/// Listing calls fetch a single page (1-based); the caller follows
/// `next_page` until it is `None`.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    async fn fetch_org(&self, org: &str) -> Result<Organization, FetchError>;

    async fn list_repos(&self, org: &str, page: u32) -> Result<Page<Repository>, FetchError>;

    async fn list_members(&self, org: &str, page: u32) -> Result<Page<Account>, FetchError>;

    async fn list_pulls(
        &self,
        org: &str,
        repo: &str,
        page: u32,
    ) -> Result<Page<PullRequest>, FetchError>;

    /// Open issues only, pull requests excluded.
    async fn list_issues(&self, org: &str, repo: &str, page: u32)
        -> Result<Page<Issue>, FetchError>;
}
