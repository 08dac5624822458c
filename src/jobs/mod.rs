//! Refresh pipeline: jobs, the worker that runs them, the bounded dispatcher
//! and the periodic scheduler.
//!
//! ```text
//! RefreshScheduler --add--> DispatcherHandle --queue--> Dispatcher loop
//!                                                        |  (<= N at once)
//!                                                        v
//!                                             Worker::work(RefreshJob) --> GitHubCache
//! ```

pub mod context;
pub mod dispatcher;
pub mod job;
pub mod refresh;
pub mod scheduler;
pub mod status;
pub mod worker;

pub use context::JobContext;
pub use dispatcher::{
    create_dispatcher, DispatchError, Dispatcher, DispatcherConfig, DispatcherHandle,
    DispatcherState,
};
pub use job::{Job, JobError, ResourceFailure};
pub use refresh::RefreshJob;
pub use scheduler::{IntervalTicker, RefreshScheduler, Ticker};
pub use status::{RefreshOutcome, RefreshStatus, TargetStatus};
pub use worker::Worker;
