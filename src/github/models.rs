//! Models for the GitHub REST API responses.
//!
//! Only the fields the exporter turns into metrics are kept. Everything is
//! optional where GitHub may omit or null the value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user or organization reference (owner, member, assignee).
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Account {
    pub login: String,
}

/// Organization from `GET /orgs/{org}`
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Organization {
    pub login: String,
    pub name: Option<String>,
    pub html_url: Option<String>,
    pub email: Option<String>,
    pub blog: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Repository from `GET /orgs/{org}/repos`
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub owner: Account,
    pub html_url: Option<String>,
    pub default_branch: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub private: bool,
    pub language: Option<String>,
    #[serde(default)]
    pub open_issues_count: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
}

/// Label attached to a pull request or issue
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Label {
    pub name: String,
}

/// Pull request from `GET /repos/{owner}/{repo}/pulls`
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub state: String,
    pub user: Option<Account>,
    pub assignee: Option<Account>,
    #[serde(default)]
    pub labels: Vec<Label>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
}

/// Issue from `GET /repos/{owner}/{repo}/issues`
///
/// GitHub returns pull requests through the issues endpoint too; those carry
/// a `pull_request` object and are dropped by the client.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub state: String,
    pub user: Option<Account>,
    pub assignee: Option<Account>,
    #[serde(default)]
    pub labels: Vec<Label>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing)]
    pub pull_request: Option<serde_json::Value>,
}

impl Issue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}
