//! HTTP client for the GitHub REST API (github.com or GitHub Enterprise).

use super::models::{Account, Issue, Organization, PullRequest, Repository};
use super::{FetchError, GitHubApi, Page};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

const MAX_ERROR_BODY_LENGTH: usize = 512;

/// Settings needed to build a [`GitHubClient`].
#[derive(Debug, Clone)]
pub struct GitHubClientConfig {
    /// API root, e.g. `https://api.github.com/` or `https://ghe.example.com/api/v3/`
    pub base_url: String,
    pub token: String,
    /// Items requested per page (GitHub caps this at 100)
    pub per_page: u32,
    pub timeout_sec: u64,
    pub user_agent: String,
}

/// `reqwest` implementation of [`GitHubApi`].
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    per_page: u32,
}

impl GitHubClient {
    pub fn new(config: GitHubClientConfig) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .context("GitHub token contains characters not allowed in a header")?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_sec))
            .build()
            .context("Failed to create HTTP client")?;

        // Ensure base_url doesn't have trailing slash
        let base_url = config.base_url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            per_page: config.per_page.clamp(1, 100),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path` and decode the body, returning the `rel="next"` page if any.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<(T, Option<u32>), FetchError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("GET {} {:?}", url, query);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = response.status();
        if let Some(err) = rate_limit_error(status, response.headers()) {
            return Err(err);
        }

        if !status.is_success() {
            let mut message = response.text().await.unwrap_or_default();
            truncate_on_char_boundary(&mut message, MAX_ERROR_BODY_LENGTH);
            return Err(FetchError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let next_page = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_next_page);

        let body = response
            .json::<T>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        Ok((body, next_page))
    }

    fn page_query(&self, page: u32) -> Vec<(&'static str, String)> {
        vec![
            ("per_page", self.per_page.to_string()),
            ("page", page.to_string()),
        ]
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn fetch_org(&self, org: &str) -> Result<Organization, FetchError> {
        let path = format!("orgs/{}", urlencoding::encode(org));
        let (org, _) = self.get_json(&path, &[]).await?;
        Ok(org)
    }

    async fn list_repos(&self, org: &str, page: u32) -> Result<Page<Repository>, FetchError> {
        let path = format!("orgs/{}/repos", urlencoding::encode(org));
        let mut query = self.page_query(page);
        query.push(("type", "all".to_string()));

        let (items, next_page) = self.get_json(&path, &query).await?;
        Ok(Page { items, next_page })
    }

    async fn list_members(&self, org: &str, page: u32) -> Result<Page<Account>, FetchError> {
        let path = format!("orgs/{}/members", urlencoding::encode(org));
        let (items, next_page) = self.get_json(&path, &self.page_query(page)).await?;
        Ok(Page { items, next_page })
    }

    async fn list_pulls(
        &self,
        org: &str,
        repo: &str,
        page: u32,
    ) -> Result<Page<PullRequest>, FetchError> {
        let path = format!(
            "repos/{}/{}/pulls",
            urlencoding::encode(org),
            urlencoding::encode(repo)
        );
        let mut query = self.page_query(page);
        query.push(("state", "all".to_string()));
        query.push(("sort", "updated".to_string()));
        query.push(("direction", "desc".to_string()));

        let (items, next_page) = self.get_json(&path, &query).await?;
        Ok(Page { items, next_page })
    }

    async fn list_issues(
        &self,
        org: &str,
        repo: &str,
        page: u32,
    ) -> Result<Page<Issue>, FetchError> {
        let path = format!(
            "repos/{}/{}/issues",
            urlencoding::encode(org),
            urlencoding::encode(repo)
        );
        let mut query = self.page_query(page);
        query.push(("state", "open".to_string()));

        let (items, next_page): (Vec<Issue>, _) = self.get_json(&path, &query).await?;
        let items = items
            .into_iter()
            .filter(|issue| !issue.is_pull_request())
            .collect();
        Ok(Page { items, next_page })
    }
}

/// Classify a response as a rate-limit rejection.
///
/// GitHub answers 403 (primary limit, `x-ratelimit-remaining: 0`) or 429 /
/// 403 with `retry-after` (secondary limit). A 403 without either header is a
/// plain permission error.
pub(crate) fn rate_limit_error(status: StatusCode, headers: &HeaderMap) -> Option<FetchError> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }

    let header_i64 = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    };

    let remaining = header_i64("x-ratelimit-remaining");
    let retry_after = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok());

    let limited = status == StatusCode::TOO_MANY_REQUESTS
        || remaining == Some(0)
        || retry_after.is_some();
    if !limited {
        return None;
    }

    let reset_at = header_i64("x-ratelimit-reset")
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .or_else(|| retry_after.map(|secs| Utc::now() + chrono::Duration::seconds(secs)));

    Some(FetchError::RateLimited { reset_at })
}

/// Cut `text` to at most `max_len` bytes without splitting a character.
fn truncate_on_char_boundary(text: &mut String, max_len: usize) {
    if text.len() <= max_len {
        return;
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}

/// Extract the page number of the `rel="next"` link from a `Link` header.
pub fn parse_next_page(link_header: &str) -> Option<u32> {
    link_header.split(',').find_map(|link| {
        let mut parts = link.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| param.trim() == "rel=\"next\"");
        if !is_next {
            return None;
        }

        let url = Url::parse(target.trim_start_matches('<').trim_end_matches('>')).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == "page")
            .and_then(|(_, value)| value.parse().ok())
    })
}
