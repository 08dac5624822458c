//! In-memory GitHub used by the end-to-end tests

use async_trait::async_trait;
use github_developer_exporter::github::{
    Account, FetchError, GitHubApi, Issue, Label, Organization, Page, PullRequest, Repository,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

struct FakeOrg {
    repos: Vec<Repository>,
    members: Vec<Account>,
    pulls: Vec<PullRequest>,
    issues: Vec<Issue>,
    delay: Duration,
    gate: watch::Sender<bool>,
    failures: HashMap<&'static str, FetchError>,
}

impl FakeOrg {
    fn new(login: &str) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            repos: vec![Repository {
                name: "api".to_string(),
                full_name: format!("{}/api", login),
                owner: Account {
                    login: login.to_string(),
                },
                html_url: Some(format!("https://github.com/{}/api", login)),
                default_branch: Some("main".to_string()),
                language: Some("Rust".to_string()),
                open_issues_count: 2,
                ..Default::default()
            }],
            members: vec![
                Account {
                    login: "alice".to_string(),
                },
                Account {
                    login: "bob".to_string(),
                },
            ],
            pulls: vec![PullRequest {
                number: 1,
                title: "Add exporter".to_string(),
                state: "open".to_string(),
                user: Some(Account {
                    login: "alice".to_string(),
                }),
                labels: vec![Label {
                    name: "enhancement".to_string(),
                }],
                ..Default::default()
            }],
            issues: vec![Issue {
                number: 2,
                title: "Scrape is slow".to_string(),
                state: "open".to_string(),
                user: Some(Account {
                    login: "bob".to_string(),
                }),
                ..Default::default()
            }],
            delay: Duration::ZERO,
            gate,
            failures: HashMap::new(),
        }
    }
}

/// Fake [`GitHubApi`] serving one repository ("api") per organization.
///
/// Calls are named `org`, `repos`, `members`, `pulls` and `issues`; any of
/// them can be scripted to fail per organization. `fetch_org` is where the
/// organization's delay and gate apply, so a closed gate holds the whole
/// refresh job of that organization.
pub struct FakeGitHub {
    logins: Vec<String>,
    orgs: Mutex<HashMap<String, FakeOrg>>,
    calls: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeGitHub {
    pub fn with_orgs(logins: &[&str]) -> Arc<Self> {
        let orgs = logins
            .iter()
            .map(|login| (login.to_string(), FakeOrg::new(login)))
            .collect();
        Arc::new(Self {
            logins: logins.iter().map(|l| l.to_string()).collect(),
            orgs: Mutex::new(orgs),
            calls: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    pub fn logins(&self) -> &[String] {
        &self.logins
    }

    pub fn fail(&self, org: &str, call: &'static str, error: FetchError) {
        self.with_org(org, |o| {
            o.failures.insert(call, error);
        });
    }

    pub fn recover(&self, org: &str) {
        self.with_org(org, |o| o.failures.clear());
    }

    pub fn set_delay(&self, org: &str, delay: Duration) {
        self.with_org(org, |o| o.delay = delay);
    }

    pub fn close_gate(&self, org: &str) {
        self.with_org(org, |o| {
            o.gate.send_replace(false);
        });
    }

    pub fn open_gate(&self, org: &str) {
        self.with_org(org, |o| {
            o.gate.send_replace(true);
        });
    }

    pub fn open_all_gates(&self) {
        for org in self.orgs.lock().unwrap().values() {
            org.gate.send_replace(true);
        }
    }

    /// Every call so far, as `"<org>:<call>"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, org: &str, call: &str) -> usize {
        let entry = format!("{}:{}", org, call);
        self.calls().iter().filter(|c| **c == entry).count()
    }

    /// Whether a refresh of `org` has started.
    pub fn started(&self, org: &str) -> bool {
        self.call_count(org, "org") > 0
    }

    /// Highest number of organizations held in `fetch_org` at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn with_org(&self, org: &str, f: impl FnOnce(&mut FakeOrg)) {
        let mut orgs = self.orgs.lock().unwrap();
        f(orgs.get_mut(org).expect("unknown fake organization"));
    }

    /// Record the call and return the scripted failure, if any.
    fn enter(&self, org: &str, call: &'static str) -> Result<(), FetchError> {
        self.calls.lock().unwrap().push(format!("{}:{}", org, call));
        let orgs = self.orgs.lock().unwrap();
        let Some(fake) = orgs.get(org) else {
            return Err(FetchError::Status {
                status: 404,
                message: "Not Found".to_string(),
            });
        };
        match fake.failures.get(call) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn read<T>(&self, org: &str, f: impl FnOnce(&FakeOrg) -> T) -> T {
        let orgs = self.orgs.lock().unwrap();
        f(orgs.get(org).expect("unknown fake organization"))
    }
}

#[async_trait]
impl GitHubApi for FakeGitHub {
    async fn fetch_org(&self, org: &str) -> Result<Organization, FetchError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let result = self.enter(org, "org");
        if result.is_ok() {
            let (delay, mut gate) = self.read(org, |o| (o.delay, o.gate.subscribe()));
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let _ = gate.wait_for(|open| *open).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        result?;

        Ok(Organization {
            login: org.to_string(),
            name: Some(format!("{} Inc.", org)),
            html_url: Some(format!("https://github.com/{}", org)),
            ..Default::default()
        })
    }

    async fn list_repos(&self, org: &str, _page: u32) -> Result<Page<Repository>, FetchError> {
        self.enter(org, "repos")?;
        Ok(Page::last(self.read(org, |o| o.repos.clone())))
    }

    async fn list_members(&self, org: &str, _page: u32) -> Result<Page<Account>, FetchError> {
        self.enter(org, "members")?;
        Ok(Page::last(self.read(org, |o| o.members.clone())))
    }

    async fn list_pulls(
        &self,
        org: &str,
        _repo: &str,
        _page: u32,
    ) -> Result<Page<PullRequest>, FetchError> {
        self.enter(org, "pulls")?;
        Ok(Page::last(self.read(org, |o| o.pulls.clone())))
    }

    async fn list_issues(
        &self,
        org: &str,
        _repo: &str,
        _page: u32,
    ) -> Result<Page<Issue>, FetchError> {
        self.enter(org, "issues")?;
        Ok(Page::last(self.read(org, |o| o.issues.clone())))
    }
}
