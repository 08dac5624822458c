use crate::cache::GitHubCache;
use crate::github::{Account, Issue, Organization, PullRequest, Repository};
use crate::jobs::{RefreshOutcome, RefreshStatus};
use chrono::{DateTime, Utc};
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Gauge, GaugeVec, Opts};
use std::sync::{Arc, Mutex, PoisonError};

const ORG_INFO_LABELS: &[&str] = &[
    "login",
    "name",
    "url",
    "email",
    "blog",
    "created_at",
    "updated_at",
];

const REPO_INFO_LABELS: &[&str] = &[
    "org",
    "name",
    "full_name",
    "owner",
    "url",
    "default_branch",
    "archived",
    "private",
    "language",
    "created_at",
    "updated_at",
    "pushed_at",
];

const PULL_LABELS: &[&str] = &[
    "org",
    "repo",
    "number",
    "state",
    "title",
    "user",
    "assignee",
    "label",
    "created_at",
    "updated_at",
    "closed_at",
    "merged_at",
];

const ISSUE_LABELS: &[&str] = &[
    "org",
    "repo",
    "number",
    "state",
    "title",
    "user",
    "assignee",
    "label",
    "created_at",
    "updated_at",
];

fn gauge_vec(name: &str, help: &str, labels: &[&str]) -> prometheus::Result<GaugeVec> {
    GaugeVec::new(Opts::new(name, help), labels)
}

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value.map(|t| t.to_rfc3339()).unwrap_or_default()
}

fn login(account: Option<&Account>) -> &str {
    account.map(|a| a.login.as_str()).unwrap_or_default()
}

/// Gauges rebuilt from the cache on every scrape.
struct Exported {
    up: Gauge,
    org_info: GaugeVec,
    org_repos: GaugeVec,
    org_public_repos: GaugeVec,
    org_private_repos: GaugeVec,
    org_members: GaugeVec,
    repo_info: GaugeVec,
    repo_open_issues: GaugeVec,
    pulls_info: GaugeVec,
    issues_info: GaugeVec,
    refresh_success: GaugeVec,
    refresh_last_success: GaugeVec,
}

impl Exported {
    fn new() -> prometheus::Result<Self> {
        Ok(Self {
            up: Gauge::new(
                "up",
                "1 while every organization has its cached organization and repository data",
            )?,
            org_info: gauge_vec("github_org_info", "Organization info", ORG_INFO_LABELS)?,
            org_repos: gauge_vec(
                "github_org_repos_total",
                "Repositories in the organization",
                &["org"],
            )?,
            org_public_repos: gauge_vec(
                "github_org_public_repos_total",
                "Public repositories in the organization",
                &["org"],
            )?,
            org_private_repos: gauge_vec(
                "github_org_private_repos_total",
                "Private repositories in the organization",
                &["org"],
            )?,
            org_members: gauge_vec(
                "github_org_members_total",
                "Members of the organization",
                &["org"],
            )?,
            repo_info: gauge_vec("github_repo_info", "Repository info", REPO_INFO_LABELS)?,
            repo_open_issues: gauge_vec(
                "github_repo_open_issues_total",
                "Open issues and pull requests in the repository",
                &["org", "repo"],
            )?,
            pulls_info: gauge_vec(
                "github_pulls_info",
                "Pull request info, one series per label plus one with an empty label",
                PULL_LABELS,
            )?,
            issues_info: gauge_vec(
                "github_issues_info",
                "Open issue info, one series per label plus one with an empty label",
                ISSUE_LABELS,
            )?,
            refresh_success: gauge_vec(
                "github_refresh_success",
                "1 if the last refresh of the organization succeeded",
                &["org"],
            )?,
            refresh_last_success: gauge_vec(
                "github_refresh_last_success_timestamp_seconds",
                "Unix time of the last successful refresh of the organization",
                &["org"],
            )?,
        })
    }

    fn vecs(&self) -> [&GaugeVec; 11] {
        [
            &self.org_info,
            &self.org_repos,
            &self.org_public_repos,
            &self.org_private_repos,
            &self.org_members,
            &self.repo_info,
            &self.repo_open_issues,
            &self.pulls_info,
            &self.issues_info,
            &self.refresh_success,
            &self.refresh_last_success,
        ]
    }

    fn reset(&self) {
        for vec in self.vecs() {
            vec.reset();
        }
    }
}

/// Prometheus collector that renders the cached GitHub snapshot.
///
/// It never calls GitHub: whatever the refresh jobs left in the cache is
/// what gets exported, and a cache miss only means fewer series.
pub struct GitHubCollector {
    targets: Vec<String>,
    cache: Arc<GitHubCache>,
    status: Arc<RefreshStatus>,
    exported: Exported,
    descs: Vec<Desc>,
    scrape: Mutex<()>,
}

impl GitHubCollector {
    pub fn new(
        targets: Vec<String>,
        cache: Arc<GitHubCache>,
        status: Arc<RefreshStatus>,
    ) -> prometheus::Result<Self> {
        let exported = Exported::new()?;
        let mut descs: Vec<Desc> = exported.up.desc().into_iter().cloned().collect();
        for vec in exported.vecs() {
            descs.extend(vec.desc().into_iter().cloned());
        }

        Ok(Self {
            targets,
            cache,
            status,
            exported,
            descs,
            scrape: Mutex::new(()),
        })
    }

    /// Fill the gauges from the cache. Returns whether every target had its
    /// organization and repository entries.
    fn populate(&self) -> bool {
        let mut complete = true;

        for target in &self.targets {
            let target = target.as_str();
            let org = self.cache.org(target);
            let repos = self.cache.repos(target);
            complete &= org.is_some() && repos.is_some();

            if let Some(org) = &org {
                self.export_org(org);
            }

            if let Some(repos) = &repos {
                let private = repos.iter().filter(|r| r.private).count();
                self.exported
                    .org_repos
                    .with_label_values(&[target])
                    .set(repos.len() as f64);
                self.exported
                    .org_public_repos
                    .with_label_values(&[target])
                    .set((repos.len() - private) as f64);
                self.exported
                    .org_private_repos
                    .with_label_values(&[target])
                    .set(private as f64);

                for repo in repos.iter() {
                    self.export_repo(target, repo);
                    if let Some(pulls) = self.cache.pulls(target, &repo.name) {
                        for pull in pulls.iter() {
                            self.export_pull(target, &repo.name, pull);
                        }
                    }
                    if let Some(issues) = self.cache.issues(target, &repo.name) {
                        for issue in issues.iter() {
                            self.export_issue(target, &repo.name, issue);
                        }
                    }
                }
            }

            if let Some(members) = self.cache.members(target) {
                self.exported
                    .org_members
                    .with_label_values(&[target])
                    .set(members.len() as f64);
            }

            if let Some(status) = self.status.get(target) {
                let success = status.last_outcome == RefreshOutcome::Success;
                self.exported
                    .refresh_success
                    .with_label_values(&[target])
                    .set(if success { 1.0 } else { 0.0 });
                if let Some(last_success) = status.last_success {
                    self.exported
                        .refresh_last_success
                        .with_label_values(&[target])
                        .set(last_success.timestamp() as f64);
                }
            }
        }

        complete
    }

    fn export_org(&self, org: &Organization) {
        let created_at = timestamp(org.created_at);
        let updated_at = timestamp(org.updated_at);
        self.exported
            .org_info
            .with_label_values(&[
                org.login.as_str(),
                org.name.as_deref().unwrap_or_default(),
                org.html_url.as_deref().unwrap_or_default(),
                org.email.as_deref().unwrap_or_default(),
                org.blog.as_deref().unwrap_or_default(),
                &created_at,
                &updated_at,
            ])
            .set(1.0);
    }

    fn export_repo(&self, target: &str, repo: &Repository) {
        let archived = repo.archived.to_string();
        let private = repo.private.to_string();
        let created_at = timestamp(repo.created_at);
        let updated_at = timestamp(repo.updated_at);
        let pushed_at = timestamp(repo.pushed_at);
        self.exported
            .repo_info
            .with_label_values(&[
                target,
                repo.name.as_str(),
                repo.full_name.as_str(),
                repo.owner.login.as_str(),
                repo.html_url.as_deref().unwrap_or_default(),
                repo.default_branch.as_deref().unwrap_or_default(),
                &archived,
                &private,
                repo.language.as_deref().unwrap_or_default(),
                &created_at,
                &updated_at,
                &pushed_at,
            ])
            .set(1.0);
        self.exported
            .repo_open_issues
            .with_label_values(&[target, repo.name.as_str()])
            .set(repo.open_issues_count as f64);
    }

    fn export_pull(&self, target: &str, repo: &str, pull: &PullRequest) {
        let number = pull.number.to_string();
        let created_at = timestamp(pull.created_at);
        let updated_at = timestamp(pull.updated_at);
        let closed_at = timestamp(pull.closed_at);
        let merged_at = timestamp(pull.merged_at);

        let label_names = pull.labels.iter().map(|l| l.name.as_str());
        for label in label_names.chain(std::iter::once("")) {
            self.exported
                .pulls_info
                .with_label_values(&[
                    target,
                    repo,
                    &number,
                    pull.state.as_str(),
                    pull.title.as_str(),
                    login(pull.user.as_ref()),
                    login(pull.assignee.as_ref()),
                    label,
                    &created_at,
                    &updated_at,
                    &closed_at,
                    &merged_at,
                ])
                .set(1.0);
        }
    }

    fn export_issue(&self, target: &str, repo: &str, issue: &Issue) {
        let number = issue.number.to_string();
        let created_at = timestamp(issue.created_at);
        let updated_at = timestamp(issue.updated_at);

        let label_names = issue.labels.iter().map(|l| l.name.as_str());
        for label in label_names.chain(std::iter::once("")) {
            self.exported
                .issues_info
                .with_label_values(&[
                    target,
                    repo,
                    &number,
                    issue.state.as_str(),
                    issue.title.as_str(),
                    login(issue.user.as_ref()),
                    login(issue.assignee.as_ref()),
                    label,
                    &created_at,
                    &updated_at,
                ])
                .set(1.0);
        }
    }
}

impl Collector for GitHubCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        // Concurrent scrapes would otherwise reset each other's gauges.
        let _scrape = self.scrape.lock().unwrap_or_else(PoisonError::into_inner);

        self.exported.reset();
        let complete = self.populate();
        if !complete {
            tracing::debug!("Some organizations have no cached data yet");
        }
        self.exported.up.set(if complete { 1.0 } else { 0.0 });

        let mut families = self.exported.up.collect();
        for vec in self.exported.vecs() {
            families.extend(vec.collect());
        }
        families
    }
}
