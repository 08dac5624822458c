//! Read side of the pipeline: turns the cached snapshot into Prometheus series.

mod collector;

pub use collector::GitHubCollector;
