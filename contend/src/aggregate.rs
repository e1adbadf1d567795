use std::{collections::BTreeMap, fmt::Debug, time::Duration};

use hdrhistogram::Histogram;
use parking_lot::Mutex;

use crate::{
    Metric,
    macros::aggregate,
    metric::{Verdict, VerdictOutcome},
    report::Snapshot,
    request::Outcome,
};

/// The `Aggregate` trait defines how raw [`Metric`] values are folded into a compact,
/// mergeable representation.
///
/// Aggregates keep counts, sums and histograms, never derived statistics: averages
/// and percentiles are computed when the aggregate is turned into a
/// [`crate::Report`]. `merge` must be associative and commutative so partial
/// aggregates can be combined in any order.
pub trait Aggregate
where
    Self: Send + Sync + Debug + Clone,
{
    /// The metric type this aggregate summarizes.
    type Metric: Metric;

    /// Create a new, empty instance of the aggregate.
    fn new() -> Self;

    /// Aggregate multiple metrics into the current instance.
    fn aggregate(&mut self, metrics: &[Self::Metric]) {
        metrics.iter().for_each(|m| self.consume(m));
    }

    /// Incorporate a single metric into the aggregate.
    fn consume(&mut self, metric: &Self::Metric);

    /// Combine two different aggregates into one.
    fn merge(&mut self, other: Self);
}

/// Success/failure counters for one behavior, with failure reasons tallied.
#[aggregate]
#[derive(Default)]
pub struct BehaviorCounts {
    pub success: u64,
    pub failure: u64,
    pub reasons: BTreeMap<String, u64>,
}

impl BehaviorCounts {
    pub fn total(&self) -> u64 {
        self.success + self.failure
    }
}

impl Aggregate for BehaviorCounts {
    type Metric = Verdict;

    fn new() -> Self {
        Self::default()
    }

    fn consume(&mut self, verdict: &Verdict) {
        match verdict.outcome() {
            VerdictOutcome::Success => self.success += 1,
            VerdictOutcome::Failure => {
                self.failure += 1;
                if let Some(reason) = verdict.reason() {
                    *self.reasons.entry(reason.to_string()).or_default() += 1;
                }
            }
        }
    }

    fn merge(&mut self, other: Self) {
        self.success += other.success;
        self.failure += other.failure;
        for (reason, count) in other.reasons {
            *self.reasons.entry(reason).or_default() += count;
        }
    }
}

/// Request counters for one endpoint label.
#[aggregate]
#[derive(Default)]
pub struct EndpointCounts {
    pub requests: u64,
    pub transport_errors: u64,
    /// Keyed by status class: `2xx`, `3xx`, `4xx`, `5xx`.
    pub status_classes: BTreeMap<String, u64>,
}

impl EndpointCounts {
    fn consume(&mut self, outcome: &Outcome) {
        self.requests += 1;
        match outcome.status {
            Some(status) => {
                *self
                    .status_classes
                    .entry(format!("{}xx", status / 100))
                    .or_default() += 1
            }
            None => self.transport_errors += 1,
        }
    }

    fn merge(&mut self, other: Self) {
        self.requests += other.requests;
        self.transport_errors += other.transport_errors;
        for (class, count) in other.status_classes {
            *self.status_classes.entry(class).or_default() += count;
        }
    }
}

const LATENCY_FLOOR_US: u64 = 1;
const LATENCY_CEILING_US: u64 = 60_000_000;

/// Microsecond latency histogram, 1us to 60s at three significant figures.
#[derive(Debug, Clone)]
pub struct LatencyHistogram(Histogram<u64>);

impl LatencyHistogram {
    pub fn new() -> Self {
        Self(
            Histogram::new_with_bounds(LATENCY_FLOOR_US, LATENCY_CEILING_US, 3)
                .expect("latency histogram bounds are valid"),
        )
    }

    pub fn record(&mut self, latency: Duration) {
        let us = (latency.as_micros() as u64).clamp(LATENCY_FLOOR_US, LATENCY_CEILING_US);
        self.0.saturating_record(us);
    }

    pub fn merge(&mut self, other: &Self) {
        if let Err(err) = self.0.add(&other.0) {
            tracing::warn!("dropping latency samples while merging histograms: {err}");
        }
    }

    pub fn len(&self) -> u64 {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn min(&self) -> Duration {
        Duration::from_micros(self.0.min())
    }

    pub fn max(&self) -> Duration {
        Duration::from_micros(self.0.max())
    }

    pub fn mean(&self) -> Duration {
        Duration::from_secs_f64(self.0.mean() / 1_000_000.0)
    }

    pub fn percentile(&self, q: f64) -> Duration {
        Duration::from_micros(self.0.value_at_quantile(q))
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything recorded during a run: verdicts per behavior and requests per endpoint
/// label, each with a latency histogram.
#[derive(Debug, Clone, Default)]
pub struct VerdictTable {
    pub behaviors: BTreeMap<String, BehaviorCounts>,
    pub behavior_latency: BTreeMap<String, LatencyHistogram>,
    pub endpoints: BTreeMap<&'static str, EndpointCounts>,
    pub endpoint_latency: BTreeMap<&'static str, LatencyHistogram>,
}

impl VerdictTable {
    /// Number of verdicts recorded across all behaviors.
    pub fn verdicts(&self) -> u64 {
        self.behaviors.values().map(BehaviorCounts::total).sum()
    }

    pub fn record_request(&mut self, outcome: &Outcome) {
        let label = outcome.endpoint.label();
        self.endpoints.entry(label).or_default().consume(outcome);
        self.endpoint_latency
            .entry(label)
            .or_default()
            .record(outcome.latency);
    }
}

impl Aggregate for VerdictTable {
    type Metric = Verdict;

    fn new() -> Self {
        Self::default()
    }

    fn consume(&mut self, verdict: &Verdict) {
        // Lookup first so the common path does not allocate a key.
        match self.behaviors.get_mut(verdict.behavior()) {
            Some(counts) => counts.consume(verdict),
            None => {
                let mut counts = BehaviorCounts::default();
                counts.consume(verdict);
                self.behaviors.insert(verdict.behavior().to_string(), counts);
            }
        }
        match self.behavior_latency.get_mut(verdict.behavior()) {
            Some(histogram) => histogram.record(verdict.latency()),
            None => {
                let mut histogram = LatencyHistogram::new();
                histogram.record(verdict.latency());
                self.behavior_latency
                    .insert(verdict.behavior().to_string(), histogram);
            }
        }
    }

    fn merge(&mut self, other: Self) {
        for (name, counts) in other.behaviors {
            self.behaviors.entry(name).or_default().merge(counts);
        }
        for (name, histogram) in other.behavior_latency {
            self.behavior_latency
                .entry(name)
                .or_default()
                .merge(&histogram);
        }
        for (label, counts) in other.endpoints {
            self.endpoints.entry(label).or_default().merge(counts);
        }
        for (label, histogram) in other.endpoint_latency {
            self.endpoint_latency
                .entry(label)
                .or_default()
                .merge(&histogram);
        }
    }
}

/// Thread-safe sink shared by every virtual user.
///
/// One mutex guards the [`VerdictTable`]; it is held only for the increment or for
/// the copy taken by [`StatsAggregator::snapshot`]. No request I/O ever happens
/// under it.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    table: Mutex<VerdictTable>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, verdict: &Verdict) {
        self.table.lock().consume(verdict);
    }

    pub fn record_request(&self, outcome: &Outcome) {
        self.table.lock().record_request(outcome);
    }

    /// Point-in-time copy of the raw table.
    pub fn table(&self) -> VerdictTable {
        self.table.lock().clone()
    }

    /// Point-in-time report. Percentiles are computed after the lock is released.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from(self.table())
    }
}
