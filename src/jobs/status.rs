use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Result of the most recent refresh of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Success,
    Failed(ErrorKind),
}

impl RefreshOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshOutcome::Success => "success",
            RefreshOutcome::Failed(kind) => kind.as_str(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TargetStatus {
    pub last_outcome: RefreshOutcome,
    pub last_attempt: DateTime<Utc>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

/// Per-target record of how refreshes went, written by workers and read by
/// the metrics collector.
#[derive(Debug, Default)]
pub struct RefreshStatus {
    targets: RwLock<HashMap<String, TargetStatus>>,
}

impl RefreshStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, target: &str) {
        let now = Utc::now();
        let mut targets = self.targets.write().unwrap_or_else(PoisonError::into_inner);
        targets.insert(
            target.to_string(),
            TargetStatus {
                last_outcome: RefreshOutcome::Success,
                last_attempt: now,
                last_success: Some(now),
                last_error: None,
                consecutive_failures: 0,
            },
        );
    }

    pub fn record_failure(&self, target: &str, kind: ErrorKind, message: String) {
        let now = Utc::now();
        let mut targets = self.targets.write().unwrap_or_else(PoisonError::into_inner);
        let previous = targets.get(target);
        let status = TargetStatus {
            last_outcome: RefreshOutcome::Failed(kind),
            last_attempt: now,
            last_success: previous.and_then(|s| s.last_success),
            last_error: Some(message),
            consecutive_failures: previous.map_or(0, |s| s.consecutive_failures) + 1,
        };
        targets.insert(target.to_string(), status);
    }

    pub fn get(&self, target: &str) -> Option<TargetStatus> {
        self.targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target)
            .cloned()
    }

    /// Every recorded target, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, TargetStatus)> {
        let targets = self.targets.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<_> = targets
            .iter()
            .map(|(target, status)| (target.clone(), status.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}
