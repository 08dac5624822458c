//! Error classification shared by the fetch, job and configuration layers.

use std::fmt;

/// Closed set of failure kinds the refresh pipeline distinguishes.
///
/// Every error type in the crate can be mapped onto one of these, so callers
/// decide how to log and count a failure without inspecting concrete types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Upstream throttling. The prior cache entry stays servable.
    RateLimited,
    /// Any other upstream failure.
    FetchFailed,
    /// Shutdown interrupted the work cooperatively.
    Cancelled,
    /// Invalid configuration. Only raised at startup.
    Fatal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::FetchFailed => "fetch_failed",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
