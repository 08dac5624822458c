use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use github_developer_exporter::cache::GitHubCache;
use github_developer_exporter::config::{self, AppConfig};
use github_developer_exporter::exporter::GitHubCollector;
use github_developer_exporter::github::{GitHubApi, GitHubClient};
use github_developer_exporter::jobs::{
    create_dispatcher, IntervalTicker, Job, RefreshJob, RefreshScheduler, RefreshStatus, Worker,
};
use github_developer_exporter::server::{metrics, run_server, RequestsLoggingLevel};

#[derive(Parser, Debug)]
#[command(version, about = "Prometheus exporter for GitHub organizations")]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Token used to authenticate against the GitHub API.
    #[clap(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Organizations to export, comma separated.
    #[clap(long, env = "GITHUB_ORGS", value_delimiter = ',')]
    pub github_orgs: Vec<String>,

    /// GitHub API root. Point it at `https://<host>/api/v3/` for GitHub Enterprise.
    #[clap(long, env = "GITHUB_URL", default_value = config::DEFAULT_GITHUB_URL)]
    pub github_url: String,

    /// The address to bind.
    #[clap(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// The port to listen on.
    #[clap(short, long, env = "PORT", default_value_t = config::DEFAULT_PORT)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, env = "LOGGING_LEVEL", default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Maximum number of refresh jobs running at once.
    #[clap(long, env = "MAX_WORKER", default_value_t = config::DEFAULT_MAX_WORKERS)]
    pub max_workers: usize,

    /// Maximum number of refresh jobs waiting for a worker.
    #[clap(long, env = "MAX_QUEUE", default_value_t = config::DEFAULT_MAX_QUEUE)]
    pub max_queue: usize,

    /// Seconds between refresh cycles.
    #[clap(long, env = "REFRESH_INTERVAL_SECS", default_value_t = config::DEFAULT_REFRESH_INTERVAL_SECS)]
    pub refresh_interval_secs: u64,

    /// Seconds a cached resource stays valid.
    #[clap(long, env = "CACHE_TTL_SECS", default_value_t = config::DEFAULT_CACHE_TTL_SECS)]
    pub cache_ttl_secs: u64,

    /// Seconds between sweeps of expired cache entries.
    #[clap(long, env = "PURGE_INTERVAL_SECS", default_value_t = config::DEFAULT_PURGE_INTERVAL_SECS)]
    pub purge_interval_secs: u64,

    /// Items requested per page (1-100).
    #[clap(long, env = "GITHUB_PER_PAGE", default_value_t = config::DEFAULT_PER_PAGE)]
    pub per_page: u32,

    /// Timeout in seconds for GitHub API requests.
    #[clap(long, env = "GITHUB_TIMEOUT_SEC", default_value_t = config::DEFAULT_REQUEST_TIMEOUT_SEC)]
    pub request_timeout_sec: u64,

    /// Stop listing pull requests of a repository after this many.
    #[clap(long, env = "MAX_PULLS_PER_REPO")]
    pub max_pulls_per_repo: Option<usize>,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            github_token: args.github_token.clone(),
            github_orgs: args.github_orgs.clone(),
            github_url: args.github_url.clone(),
            host: args.host.clone(),
            port: args.port,
            logging_level: args.logging_level,
            max_workers: args.max_workers,
            max_queue: args.max_queue,
            refresh_interval_secs: args.refresh_interval_secs,
            cache_ttl_secs: args.cache_ttl_secs,
            purge_interval_secs: args.purge_interval_secs,
            per_page: args.per_page,
            request_timeout_sec: args.request_timeout_sec,
            max_pulls_per_repo: args.max_pulls_per_repo,
        }
    }
}

/// Sweep expired cache entries until `shutdown` fires.
async fn run_cache_purge(cache: Arc<GitHubCache>, period: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let removed = cache.purge_expired();
                if removed > 0 {
                    info!("Purged {} expired cache entries", removed);
                }
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    let cli_config = config::CliConfig::from(&cli_args);
    let app_config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration:");
    info!("  github_url: {}", app_config.github.url);
    info!("  orgs: {}", app_config.github.orgs.join(", "));
    info!("  listen: {}:{}", app_config.host, app_config.port);
    info!(
        "  dispatcher: {} workers, queue of {}",
        app_config.max_workers, app_config.max_queue
    );
    info!(
        "  refresh every {:?}, cache ttl {:?}, purge every {:?}",
        app_config.refresh_interval, app_config.cache_ttl, app_config.purge_interval
    );

    metrics::init_metrics();

    let api: Arc<dyn GitHubApi> = Arc::new(GitHubClient::new(app_config.client_config())?);
    let cache = Arc::new(GitHubCache::new(app_config.cache_ttl));
    let status = Arc::new(RefreshStatus::new());

    let collector = GitHubCollector::new(
        app_config.github.orgs.clone(),
        cache.clone(),
        status.clone(),
    )
    .context("Failed to create GitHub collector")?;
    metrics::REGISTRY
        .register(Box::new(collector))
        .context("Failed to register GitHub collector")?;

    let shutdown_token = CancellationToken::new();

    let (mut dispatcher, dispatcher_handle) = create_dispatcher(
        Worker::new(status.clone()),
        app_config.dispatcher_config(),
    );
    dispatcher.start(shutdown_token.clone())?;

    let jobs: Vec<Arc<dyn Job>> = app_config
        .github
        .orgs
        .iter()
        .map(|org| {
            Arc::new(
                RefreshJob::new(org.clone(), api.clone(), cache.clone())
                    .with_pulls_limit(app_config.github.max_pulls_per_repo),
            ) as Arc<dyn Job>
        })
        .collect();

    let mut scheduler = RefreshScheduler::new(
        jobs,
        dispatcher_handle.clone(),
        Box::new(IntervalTicker::new(app_config.refresh_interval)),
    );

    let purge_task = tokio::spawn(run_cache_purge(
        cache.clone(),
        app_config.purge_interval,
        shutdown_token.clone(),
    ));
    let scheduler_task = {
        let token = shutdown_token.clone();
        tokio::spawn(async move { scheduler.run(token).await })
    };
    let server = run_server(
        app_config.server_config(),
        dispatcher_handle,
        shutdown_token.clone(),
    );
    tokio::pin!(server);

    let result = tokio::select! {
        result = &mut server => {
            info!("HTTP server stopped: {:?}", result);
            result
        }
        _ = shutdown_signal() => {
            shutdown_token.cancel();
            server.await
        }
    };

    shutdown_token.cancel();

    if let Err(e) = scheduler_task.await {
        error!("Scheduler task failed: {}", e);
    }
    dispatcher.wait().await;
    if let Err(e) = purge_task.await {
        error!("Cache purge task failed: {}", e);
    }

    info!("Shutdown complete");
    result
}
