mod file_config;

pub use file_config::{DispatcherFileConfig, FileConfig, GitHubFileConfig};

use crate::github::GitHubClientConfig;
use crate::jobs::DispatcherConfig;
use crate::server::{RequestsLoggingLevel, ServerConfig};
use anyhow::{bail, Result};
use clap::ValueEnum;
use reqwest::Url;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_GITHUB_URL: &str = "https://api.github.com/";
pub const DEFAULT_PORT: u16 = 8888;
pub const DEFAULT_MAX_WORKERS: usize = 2;
pub const DEFAULT_MAX_QUEUE: usize = 5;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 25 * 60;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 30 * 60;
pub const DEFAULT_PURGE_INTERVAL_SECS: u64 = 35 * 60;
pub const DEFAULT_PER_PAGE: u32 = 100;
pub const DEFAULT_REQUEST_TIMEOUT_SEC: u64 = 30;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub github_token: Option<String>,
    pub github_orgs: Vec<String>,
    pub github_url: String,
    pub host: String,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub max_workers: usize,
    pub max_queue: usize,
    pub refresh_interval_secs: u64,
    pub cache_ttl_secs: u64,
    pub purge_interval_secs: u64,
    pub per_page: u32,
    pub request_timeout_sec: u64,
    pub max_pulls_per_repo: Option<usize>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            github_token: None,
            github_orgs: Vec::new(),
            github_url: DEFAULT_GITHUB_URL.to_string(),
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            logging_level: RequestsLoggingLevel::default(),
            max_workers: DEFAULT_MAX_WORKERS,
            max_queue: DEFAULT_MAX_QUEUE,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            purge_interval_secs: DEFAULT_PURGE_INTERVAL_SECS,
            per_page: DEFAULT_PER_PAGE,
            request_timeout_sec: DEFAULT_REQUEST_TIMEOUT_SEC,
            max_pulls_per_repo: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GitHubSettings {
    pub token: String,
    pub orgs: Vec<String>,
    pub url: String,
    pub per_page: u32,
    pub timeout_sec: u64,
    pub max_pulls_per_repo: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub github: GitHubSettings,
    pub max_workers: usize,
    pub max_queue: usize,
    pub refresh_interval: Duration,
    pub cache_ttl: Duration,
    pub purge_interval: Duration,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    ///
    /// Every error returned here is fatal: the process must not start.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();
        let gh_file = file.github.unwrap_or_default();
        let dispatcher_file = file.dispatcher.unwrap_or_default();

        let token = gh_file
            .token
            .or_else(|| cli.github_token.clone())
            .map(|t| t.trim().to_string())
            .unwrap_or_default();
        if token.is_empty() {
            bail!("GitHub token must be set via --github-token, GITHUB_TOKEN or the config file");
        }

        let orgs = normalize_orgs(gh_file.orgs.as_deref().unwrap_or(&cli.github_orgs));
        if orgs.is_empty() {
            bail!("At least one organization must be set via --github-orgs, GITHUB_ORGS or the config file");
        }

        let url = gh_file.url.unwrap_or_else(|| cli.github_url.clone());
        match Url::parse(&url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => bail!("Unsupported GitHub URL scheme {:?}: {}", parsed.scheme(), url),
            Err(e) => bail!("Invalid GitHub URL {:?}: {}", url, e),
        }

        let per_page = gh_file.per_page.unwrap_or(cli.per_page);
        if !(1..=100).contains(&per_page) {
            bail!("per_page must be between 1 and 100, got {}", per_page);
        }

        let timeout_sec = gh_file.timeout_sec.unwrap_or(cli.request_timeout_sec);
        if timeout_sec == 0 {
            bail!("request timeout must be greater than 0");
        }

        let max_pulls_per_repo = gh_file.max_pulls_per_repo.or(cli.max_pulls_per_repo);
        if max_pulls_per_repo == Some(0) {
            bail!("max_pulls_per_repo must be greater than 0 when set");
        }

        let max_workers = dispatcher_file.max_workers.unwrap_or(cli.max_workers);
        let max_queue = dispatcher_file.max_queue.unwrap_or(cli.max_queue);
        if max_workers == 0 {
            bail!("max_workers must be greater than 0");
        }
        if max_queue == 0 {
            bail!("max_queue must be greater than 0");
        }

        let refresh_interval_secs = file
            .refresh_interval_secs
            .unwrap_or(cli.refresh_interval_secs);
        let cache_ttl_secs = file.cache_ttl_secs.unwrap_or(cli.cache_ttl_secs);
        let purge_interval_secs = file.purge_interval_secs.unwrap_or(cli.purge_interval_secs);
        if refresh_interval_secs == 0 {
            bail!("refresh_interval_secs must be greater than 0");
        }
        if cache_ttl_secs == 0 {
            bail!("cache_ttl_secs must be greater than 0");
        }
        if purge_interval_secs == 0 {
            bail!("purge_interval_secs must be greater than 0");
        }
        if refresh_interval_secs >= cache_ttl_secs {
            warn!(
                "Refresh interval ({}s) is not shorter than the cache TTL ({}s); \
                 cached data will expire between refreshes",
                refresh_interval_secs, cache_ttl_secs
            );
        }

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or(cli.logging_level);

        Ok(Self {
            host: file.host.unwrap_or_else(|| cli.host.clone()),
            port: file.port.unwrap_or(cli.port),
            logging_level,
            github: GitHubSettings {
                token,
                orgs,
                url,
                per_page,
                timeout_sec,
                max_pulls_per_repo,
            },
            max_workers,
            max_queue,
            refresh_interval: Duration::from_secs(refresh_interval_secs),
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            purge_interval: Duration::from_secs(purge_interval_secs),
        })
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            requests_logging_level: self.logging_level,
            host: self.host.clone(),
            port: self.port,
        }
    }

    pub fn client_config(&self) -> GitHubClientConfig {
        GitHubClientConfig {
            base_url: self.github.url.clone(),
            token: self.github.token.clone(),
            per_page: self.github.per_page,
            timeout_sec: self.github.timeout_sec,
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            max_workers: self.max_workers,
            max_queue: self.max_queue,
        }
    }
}

/// Trim, split on commas, drop empties and duplicates (first one wins).
fn normalize_orgs(raw: &[String]) -> Vec<String> {
    let mut orgs: Vec<String> = Vec::new();
    for org in raw.iter().flat_map(|entry| entry.split(',')) {
        let org = org.trim();
        if org.is_empty() {
            continue;
        }
        if orgs.iter().any(|known| known == org) {
            warn!("Ignoring duplicate organization {}", org);
            continue;
        }
        orgs.push(org.to_string());
    }
    orgs
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn base_cli() -> CliConfig {
        CliConfig {
            github_token: Some("ghp_cli".to_string()),
            github_orgs: vec!["acme".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_logging_level() {
        assert!(matches!(
            parse_logging_level("none"),
            Some(RequestsLoggingLevel::None)
        ));
        assert!(matches!(
            parse_logging_level("PATH"),
            Some(RequestsLoggingLevel::Path)
        ));
        assert!(matches!(
            parse_logging_level("headers"),
            Some(RequestsLoggingLevel::Headers)
        ));
        assert!(parse_logging_level("body").is_none());
    }

    #[test]
    fn test_resolve_cli_only_uses_defaults() {
        let config = AppConfig::resolve(&base_cli(), None).unwrap();

        assert_eq!(config.port, 8888);
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.max_queue, 5);
        assert_eq!(config.refresh_interval, Duration::from_secs(1500));
        assert_eq!(config.cache_ttl, Duration::from_secs(1800));
        assert_eq!(config.purge_interval, Duration::from_secs(2100));
        assert_eq!(config.github.url, "https://api.github.com/");
        assert_eq!(config.github.orgs, vec!["acme"]);
        assert_eq!(config.github.token, "ghp_cli");
        assert!(config.github.max_pulls_per_repo.is_none());
    }

    #[test]
    fn test_file_overrides_cli() {
        let file = FileConfig {
            port: Some(9100),
            logging_level: Some("none".to_string()),
            cache_ttl_secs: Some(3600),
            github: Some(GitHubFileConfig {
                token: Some("ghp_file".to_string()),
                orgs: Some(vec!["globex".to_string()]),
                ..Default::default()
            }),
            dispatcher: Some(DispatcherFileConfig {
                max_workers: Some(8),
                max_queue: None,
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&base_cli(), Some(file)).unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.logging_level, RequestsLoggingLevel::None);
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.github.token, "ghp_file");
        assert_eq!(config.github.orgs, vec!["globex"]);
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.max_queue, 5);
    }

    #[test]
    fn test_resolve_from_loaded_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[github]\norgs = [\"initech\"]\n\n[dispatcher]\nmax_queue = 10"
        )
        .unwrap();
        let file_config = FileConfig::load(file.path()).unwrap();

        let config = AppConfig::resolve(&base_cli(), Some(file_config)).unwrap();

        assert_eq!(config.github.orgs, vec!["initech"]);
        assert_eq!(config.max_queue, 10);
    }

    #[test]
    fn test_orgs_are_split_trimmed_and_deduplicated() {
        let mut cli = base_cli();
        cli.github_orgs = vec![" acme, globex ,".to_string(), "acme".to_string()];

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.github.orgs, vec!["acme", "globex"]);
    }

    #[test]
    fn test_missing_orgs_is_fatal() {
        let mut cli = base_cli();
        cli.github_orgs = vec![" , ".to_string()];

        let err = AppConfig::resolve(&cli, None).unwrap_err();
        assert!(err.to_string().contains("organization"));
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let mut cli = base_cli();
        cli.github_token = Some("   ".to_string());

        let err = AppConfig::resolve(&cli, None).unwrap_err();
        assert!(err.to_string().contains("token"));
    }

    #[test]
    fn test_zero_capacity_is_fatal() {
        let mut cli = base_cli();
        cli.max_workers = 0;
        assert!(AppConfig::resolve(&cli, None).is_err());

        let mut cli = base_cli();
        cli.max_queue = 0;
        assert!(AppConfig::resolve(&cli, None).is_err());
    }

    #[test]
    fn test_zero_durations_are_fatal() {
        let mut cli = base_cli();
        cli.refresh_interval_secs = 0;
        assert!(AppConfig::resolve(&cli, None).is_err());

        let mut cli = base_cli();
        cli.cache_ttl_secs = 0;
        assert!(AppConfig::resolve(&cli, None).is_err());
    }

    #[test]
    fn test_invalid_url_is_fatal() {
        let mut cli = base_cli();
        cli.github_url = "not a url".to_string();
        assert!(AppConfig::resolve(&cli, None).is_err());

        let mut cli = base_cli();
        cli.github_url = "ftp://ghe.example.com/".to_string();
        assert!(AppConfig::resolve(&cli, None).is_err());
    }

    #[test]
    fn test_interval_not_shorter_than_ttl_is_allowed() {
        let mut cli = base_cli();
        cli.refresh_interval_secs = 3600;
        cli.cache_ttl_secs = 600;

        let config = AppConfig::resolve(&cli, None).unwrap();
        assert!(config.refresh_interval > config.cache_ttl);
    }

    #[test]
    fn test_derived_configs() {
        let mut cli = base_cli();
        cli.port = 9200;
        cli.max_pulls_per_repo = Some(15);
        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.server_config().port, 9200);
        assert_eq!(config.dispatcher_config().max_queue, 5);
        let client = config.client_config();
        assert_eq!(client.token, "ghp_cli");
        assert!(client.user_agent.starts_with("github-developer-exporter/"));
        assert_eq!(config.github.max_pulls_per_repo, Some(15));
    }
}
