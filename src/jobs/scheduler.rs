use super::dispatcher::DispatcherHandle;
use super::job::Job;
use crate::server::metrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval_at, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Source of periodic refresh triggers.
#[async_trait]
pub trait Ticker: Send + Sync {
    /// Wait for the next tick.
    async fn tick(&mut self);
}

/// Production ticker. The first tick fires one period after creation, since
/// the startup cycle is submitted separately.
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Startup,
    Interval,
}

impl Trigger {
    fn as_str(&self) -> &'static str {
        match self {
            Trigger::Startup => "startup",
            Trigger::Interval => "interval",
        }
    }
}

/// Submits every refresh job at startup and then on every tick.
pub struct RefreshScheduler {
    jobs: Vec<Arc<dyn Job>>,
    dispatcher: DispatcherHandle,
    ticker: Box<dyn Ticker>,
    overlaps: u64,
}

impl RefreshScheduler {
    pub fn new(
        jobs: Vec<Arc<dyn Job>>,
        dispatcher: DispatcherHandle,
        ticker: Box<dyn Ticker>,
    ) -> Self {
        Self {
            jobs,
            dispatcher,
            ticker,
            overlaps: 0,
        }
    }

    /// Cycles that started while the previous one still had work pending.
    pub fn overlaps(&self) -> u64 {
        self.overlaps
    }

    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!("Starting refresh scheduler with {} targets", self.jobs.len());

        if self.submit_cycle(Trigger::Startup, &shutdown).await {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Scheduler received shutdown signal");
                        break;
                    }
                    _ = self.ticker.tick() => {
                        self.check_overlap();
                        if !self.submit_cycle(Trigger::Interval, &shutdown).await {
                            break;
                        }
                    }
                }
            }
        }

        info!("Refresh scheduler stopped");
    }

    fn check_overlap(&mut self) {
        let queued = self.dispatcher.queued();
        let in_flight = self.dispatcher.in_flight();
        if queued + in_flight > 0 {
            self.overlaps += 1;
            metrics::record_cycle_overlap();
            warn!(
                "Previous refresh cycle still draining ({} queued, {} running); \
                 the refresh interval is too short for the current load",
                queued, in_flight
            );
        }
    }

    /// Submit one job per target. Returns false when the scheduler should stop.
    async fn submit_cycle(&self, trigger: Trigger, shutdown: &CancellationToken) -> bool {
        debug!("Submitting {} refresh cycle", trigger.as_str());
        let started = Instant::now();

        for job in &self.jobs {
            let submitted = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown while submitting refresh of {}", job.target());
                    return false;
                }
                result = self.dispatcher.add(job.clone()) => result,
            };

            if let Err(e) = submitted {
                warn!("Cannot submit refresh of {}: {}", job.target(), e);
                return false;
            }
        }

        let blocked = started.elapsed();
        metrics::record_refresh_cycle(trigger.as_str(), blocked);
        debug!(
            "Submitted {} jobs ({} cycle) in {:?}",
            self.jobs.len(),
            trigger.as_str(),
            blocked
        );
        true
    }
}
