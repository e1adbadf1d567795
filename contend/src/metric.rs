use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::macros::metric;

/// A `Metric` is a single observation produced while the harness runs.
///
/// Metrics are folded into an [`crate::Aggregate`] and later turned into a
/// [`crate::Report`]. They must be cheap to clone and safe to move between the
/// tasks that produce them and the aggregator that consumes them.
///
/// The [`crate::macros::metric`] attribute derives the required traits and adds the
/// marker impl.
pub trait Metric
where
    Self: PartialOrd + PartialEq + Send + Sync + Clone,
{
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictOutcome {
    Success,
    Failure,
}

/// Pass/fail classification of one executed behavior.
///
/// `reason` is present exactly when the outcome is a failure.
#[metric]
pub struct Verdict {
    behavior: String,
    outcome: VerdictOutcome,
    reason: Option<String>,
    latency: Duration,
    timestamp: DateTime<Utc>,
}

impl Verdict {
    pub fn success(behavior: impl Into<String>, latency: Duration) -> Self {
        Self {
            behavior: behavior.into(),
            outcome: VerdictOutcome::Success,
            reason: None,
            latency,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(behavior: impl Into<String>, reason: impl Into<String>, latency: Duration) -> Self {
        Self {
            behavior: behavior.into(),
            outcome: VerdictOutcome::Failure,
            reason: Some(reason.into()),
            latency,
            timestamp: Utc::now(),
        }
    }

    /// Builds a verdict from a validation result.
    pub fn from_check(
        behavior: impl Into<String>,
        check: Result<(), String>,
        latency: Duration,
    ) -> Self {
        match check {
            Ok(()) => Self::success(behavior, latency),
            Err(reason) => Self::failure(behavior, reason, latency),
        }
    }

    pub fn behavior(&self) -> &str {
        &self.behavior
    }

    pub fn outcome(&self) -> VerdictOutcome {
        self.outcome
    }

    pub fn is_success(&self) -> bool {
        self.outcome == VerdictOutcome::Success
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_present_iff_failure() {
        let ok = Verdict::from_check("read", Ok(()), Duration::from_millis(3));
        assert!(ok.is_success());
        assert_eq!(ok.reason(), None);

        let bad = Verdict::from_check("read", Err("malformed body".into()), Duration::ZERO);
        assert_eq!(bad.outcome(), VerdictOutcome::Failure);
        assert_eq!(bad.reason(), Some("malformed body"));
    }

    #[test]
    fn serializes_outcome_in_snake_case() {
        let verdict = Verdict::failure("write", "expected 204, got 500", Duration::ZERO);
        let value = serde_json::to_value(&verdict).unwrap();
        assert_eq!(value["outcome"], "failure");
        assert_eq!(value["behavior"], "write");
    }
}
