//! GitHub organization exporter
//!
//! This library exposes the internal modules for testing and for the binary.

pub mod cache;
pub mod config;
pub mod error;
pub mod exporter;
pub mod github;
pub mod jobs;
pub mod server;

// Re-export commonly used types for convenience
pub use cache::GitHubCache;
pub use error::ErrorKind;
pub use exporter::GitHubCollector;
pub use github::{GitHubApi, GitHubClient};
pub use server::{make_app, run_server, RequestsLoggingLevel};
