//! Common test infrastructure
//!
//! End-to-end tests build the real cache, worker, dispatcher and scheduler
//! around [`FakeGitHub`], an in-memory [`GitHubApi`] whose organizations can
//! be slowed down, held behind a gate, or made to fail.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{FakeGitHub, Pipeline};
//!
//! #[tokio::test]
//! async fn test_refresh() {
//!     let github = FakeGitHub::with_orgs(&["acme"]);
//!     let pipeline = Pipeline::start(github, 1, 1);
//!     pipeline.wait_for_all().await;
//! }
//! ```

#![allow(dead_code)]

mod fake_github;
mod pipeline;

// Public API - this is what tests import
pub use fake_github::FakeGitHub;
pub use pipeline::{wait_until, ManualTicker, Pipeline, WAIT_TIMEOUT};
