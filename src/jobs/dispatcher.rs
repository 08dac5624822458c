//! Bounded queue plus bounded worker pool.
//!
//! [`create_dispatcher`] returns the [`Dispatcher`] (owned by whoever controls
//! the lifecycle) and a cloneable [`DispatcherHandle`] used to submit jobs.
//! A single coordination loop owns the queue receiver, the pool semaphore
//! and the set of in-flight tasks.

use super::context::JobContext;
use super::job::Job;
use super::worker::Worker;
use crate::error::ErrorKind;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle of a dispatcher. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatcherState::Idle => write!(f, "Idle"),
            DispatcherState::Running => write!(f, "Running"),
            DispatcherState::Draining => write!(f, "Draining"),
            DispatcherState::Stopped => write!(f, "Stopped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("dispatcher already started")]
    AlreadyStarted,
    #[error("dispatcher is no longer accepting jobs")]
    Stopped,
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::AlreadyStarted => ErrorKind::Fatal,
            DispatchError::Stopped => ErrorKind::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// Jobs allowed to run at the same time.
    pub max_workers: usize,
    /// Jobs allowed to wait in the queue.
    pub max_queue: usize,
}

/// Create a dispatcher and its submission handle.
///
/// Both capacities are clamped to at least 1; configuration rejects zero
/// before we get here.
pub fn create_dispatcher(worker: Worker, config: DispatcherConfig) -> (Dispatcher, DispatcherHandle) {
    let max_workers = config.max_workers.max(1);
    let (sender, receiver) = mpsc::channel(config.max_queue.max(1));
    let (state_tx, state_rx) = watch::channel(DispatcherState::Idle);
    let state_tx = Arc::new(state_tx);
    let pool = Arc::new(Semaphore::new(max_workers));

    let dispatcher = Dispatcher {
        worker,
        receiver: Some(receiver),
        pool: pool.clone(),
        state_tx,
        loop_handle: None,
    };
    let handle = DispatcherHandle {
        sender,
        state_rx,
        pool,
        max_workers,
    };

    (dispatcher, handle)
}

pub struct Dispatcher {
    worker: Worker,
    receiver: Option<mpsc::Receiver<Arc<dyn Job>>>,
    pool: Arc<Semaphore>,
    state_tx: Arc<watch::Sender<DispatcherState>>,
    loop_handle: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawn the coordination loop. It runs until `shutdown` is cancelled or
    /// every [`DispatcherHandle`] has been dropped and the queue is empty.
    pub fn start(&mut self, shutdown: CancellationToken) -> Result<(), DispatchError> {
        let receiver = self.receiver.take().ok_or(DispatchError::AlreadyStarted)?;

        self.state_tx.send_replace(DispatcherState::Running);
        info!(
            "Dispatcher started ({} workers)",
            self.pool.available_permits()
        );

        let coordinator = Coordinator {
            receiver,
            worker: self.worker.clone(),
            pool: self.pool.clone(),
            state_tx: self.state_tx.clone(),
            shutdown,
        };
        self.loop_handle = Some(tokio::spawn(coordinator.run()));
        Ok(())
    }

    /// Resolve once the dispatcher has stopped and every in-flight job has
    /// finished. Returns immediately if it was never started.
    pub async fn wait(&mut self) {
        let Some(handle) = self.loop_handle.take() else {
            return;
        };
        if let Err(e) = handle.await {
            error!("Dispatcher loop terminated abnormally: {}", e);
            self.state_tx.send_replace(DispatcherState::Stopped);
        }
    }

    pub fn state(&self) -> DispatcherState {
        *self.state_tx.borrow()
    }
}

/// Cloneable submission side of a [`Dispatcher`].
#[derive(Clone)]
pub struct DispatcherHandle {
    sender: mpsc::Sender<Arc<dyn Job>>,
    state_rx: watch::Receiver<DispatcherState>,
    pool: Arc<Semaphore>,
    max_workers: usize,
}

impl DispatcherHandle {
    /// Enqueue a job, waiting while the queue is full.
    ///
    /// Fails only once the dispatcher stopped accepting work. A job the
    /// coordination loop has dequeued but not yet started (it is waiting for
    /// a free worker) no longer occupies a queue slot.
    pub async fn add(&self, job: Arc<dyn Job>) -> Result<(), DispatchError> {
        if !self.is_accepting() {
            return Err(DispatchError::Stopped);
        }
        debug!("Queueing refresh of {}", job.target());
        self.sender
            .send(job)
            .await
            .map_err(|_| DispatchError::Stopped)
    }

    pub fn state(&self) -> DispatcherState {
        *self.state_rx.borrow()
    }

    /// A receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<DispatcherState> {
        self.state_rx.clone()
    }

    pub fn is_accepting(&self) -> bool {
        matches!(
            self.state(),
            DispatcherState::Idle | DispatcherState::Running
        )
    }

    /// Jobs waiting in the queue.
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Jobs currently executing.
    pub fn in_flight(&self) -> usize {
        self.max_workers
            .saturating_sub(self.pool.available_permits())
    }

    /// Queued plus executing jobs.
    pub fn pending(&self) -> usize {
        self.queued() + self.in_flight()
    }
}

struct Coordinator {
    receiver: mpsc::Receiver<Arc<dyn Job>>,
    worker: Worker,
    pool: Arc<Semaphore>,
    state_tx: Arc<watch::Sender<DispatcherState>>,
    shutdown: CancellationToken,
}

impl Coordinator {
    async fn run(mut self) {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested, dispatcher draining");
                    break;
                }

                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    log_task_result(result);
                }

                job = self.receiver.recv() => {
                    let Some(job) = job else {
                        info!("All dispatcher handles dropped, draining");
                        break;
                    };

                    let permit = tokio::select! {
                        biased;
                        _ = self.shutdown.cancelled() => {
                            warn!("Discarding refresh of {} dequeued during shutdown", job.target());
                            break;
                        }
                        permit = self.pool.clone().acquire_owned() => permit,
                    };
                    let Ok(permit) = permit else {
                        error!("Worker pool closed unexpectedly");
                        break;
                    };

                    debug!("Starting refresh of {}", job.target());
                    let ctx = JobContext::new(self.shutdown.child_token());
                    let worker = self.worker.clone();
                    tasks.spawn(async move {
                        let _permit = permit;
                        worker.work(ctx, job).await;
                    });
                }
            }
        }

        self.state_tx.send_replace(DispatcherState::Draining);
        self.receiver.close();

        let mut discarded = 0;
        while self.receiver.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            info!("Discarded {} queued job(s)", discarded);
        }

        if !tasks.is_empty() {
            info!("Waiting for {} in-flight job(s)", tasks.len());
        }
        while let Some(result) = tasks.join_next().await {
            log_task_result(result);
        }

        self.state_tx.send_replace(DispatcherState::Stopped);
        info!("Dispatcher stopped");
    }
}

fn log_task_result(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("Job task panicked: {}", e);
        } else {
            warn!("Job task aborted: {}", e);
        }
    }
}
