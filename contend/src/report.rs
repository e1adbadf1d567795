use std::{collections::BTreeMap, fmt, fmt::Debug, future::Future, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Aggregate,
    aggregate::{LatencyHistogram, VerdictTable},
    error::Result,
};

/// A [`Report`] is the processed form of an [`Aggregate`].
///
/// Reports derive rates, ratios and percentiles from the raw aggregate. They are
/// plain data: no I/O, built with a `From<A>` impl, serializable so an external
/// exporter can ship them anywhere. Side effects belong to a [`Reporter`].
pub trait Report<A>
where
    Self: Send + Sync + Debug + From<A> + Serialize + DeserializeOwned,
    A: Aggregate,
{
}

/// A [`Reporter`] takes a [`Report`] and does something with it: prints it, writes it
/// to a file, pushes it to a service.
pub trait Reporter<A: Aggregate, R: Report<A>> {
    fn report(&self, report: &R) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatencySummary {
    pub min: Duration,
    pub mean: Duration,
    pub p50: Duration,
    pub p90: Duration,
    pub p99: Duration,
    pub max: Duration,
}

impl From<&LatencyHistogram> for LatencySummary {
    fn from(h: &LatencyHistogram) -> Self {
        if h.is_empty() {
            return Self::default();
        }
        Self {
            min: h.min(),
            mean: h.mean(),
            p50: h.percentile(0.50),
            p90: h.percentile(0.90),
            p99: h.percentile(0.99),
            max: h.max(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorRow {
    pub name: String,
    pub successes: u64,
    pub failures: u64,
    pub failure_ratio: f64,
    pub reasons: BTreeMap<String, u64>,
    pub latency: LatencySummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointRow {
    pub label: String,
    pub requests: u64,
    pub transport_errors: u64,
    pub status_classes: BTreeMap<String, u64>,
    pub latency: LatencySummary,
}

/// Read-only, point-in-time view of a run.
///
/// `failures / total` is the primary signal; a nonzero failure count on
/// `read_after_write` under low contention is the finding this harness exists for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    pub behaviors: Vec<BehaviorRow>,
    pub endpoints: Vec<EndpointRow>,
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

impl From<VerdictTable> for Snapshot {
    fn from(table: VerdictTable) -> Self {
        let behaviors: Vec<BehaviorRow> = table
            .behaviors
            .into_iter()
            .map(|(name, counts)| {
                let latency = table
                    .behavior_latency
                    .get(&name)
                    .map(LatencySummary::from)
                    .unwrap_or_default();
                BehaviorRow {
                    successes: counts.success,
                    failures: counts.failure,
                    failure_ratio: ratio(counts.failure, counts.total()),
                    reasons: counts.reasons,
                    latency,
                    name,
                }
            })
            .collect();

        let endpoints = table
            .endpoints
            .into_iter()
            .map(|(label, counts)| EndpointRow {
                label: label.to_string(),
                requests: counts.requests,
                transport_errors: counts.transport_errors,
                status_classes: counts.status_classes,
                latency: table
                    .endpoint_latency
                    .get(label)
                    .map(LatencySummary::from)
                    .unwrap_or_default(),
            })
            .collect();

        let successes = behaviors.iter().map(|b| b.successes).sum();
        let failures = behaviors.iter().map(|b| b.failures).sum();
        Self {
            total: successes + failures,
            successes,
            failures,
            behaviors,
            endpoints,
        }
    }
}

impl Report<VerdictTable> for Snapshot {}

impl Snapshot {
    pub fn behavior(&self, name: &str) -> Option<&BehaviorRow> {
        self.behaviors.iter().find(|b| b.name == name)
    }

    pub fn endpoint(&self, label: &str) -> Option<&EndpointRow> {
        self.endpoints.iter().find(|e| e.label == label)
    }

    pub fn failure_ratio(&self) -> f64 {
        ratio(self.failures, self.total)
    }

    /// One-paragraph, human-readable summary.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} behaviors, {} failed ({:.2}%)",
            self.total,
            self.failures,
            self.failure_ratio() * 100.0
        );
        for row in self.behaviors.iter().filter(|b| b.failures > 0) {
            out.push_str(&format!("; {}: {} failed", row.name, row.failures));
        }
        out
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<22} {:>9} {:>9} {:>8} {:>10} {:>10} {:>10}",
            "behavior", "ok", "failed", "fail%", "p50", "p90", "p99"
        )?;
        for row in &self.behaviors {
            writeln!(
                f,
                "{:<22} {:>9} {:>9} {:>7.2}% {:>10.1?} {:>10.1?} {:>10.1?}",
                row.name,
                row.successes,
                row.failures,
                row.failure_ratio * 100.0,
                row.latency.p50,
                row.latency.p90,
                row.latency.p99
            )?;
            for (reason, count) in &row.reasons {
                writeln!(f, "    {count:>6} x {reason}")?;
            }
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:<38} {:>9} {:>9} {:>10} {:>10}",
            "endpoint", "requests", "transport", "p50", "p99"
        )?;
        for row in &self.endpoints {
            writeln!(
                f,
                "{:<38} {:>9} {:>9} {:>10.1?} {:>10.1?}",
                row.label, row.requests, row.transport_errors, row.latency.p50, row.latency.p99
            )?;
        }
        write!(f, "{}", self.summary())
    }
}

/// Prints the snapshot as a table.
pub struct StdoutReporter;

impl Reporter<VerdictTable, Snapshot> for StdoutReporter {
    async fn report(&self, report: &Snapshot) -> Result<()> {
        println!("{report}");
        Ok(())
    }
}

/// Prints the snapshot as pretty JSON.
pub struct JsonReporter;

impl Reporter<VerdictTable, Snapshot> for JsonReporter {
    async fn report(&self, report: &Snapshot) -> Result<()> {
        let value = serde_json::to_string_pretty(report)?;
        println!("{value}");
        Ok(())
    }
}

/// Run-level notifications for whoever reports on the run.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Started { host: String, users: usize },
    Stopped { host: String, summary: String },
}

pub type LifecycleListener = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Registered lifecycle listeners, called in registration order.
#[derive(Clone, Default)]
pub struct Lifecycle {
    listeners: Vec<LifecycleListener>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_event<F>(&mut self, listener: F)
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    pub fn notify(&self, event: &LifecycleEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }
}

impl Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Listener that logs lifecycle events through `tracing`.
pub fn log_lifecycle(event: &LifecycleEvent) {
    match event {
        LifecycleEvent::Started { host, users } => {
            tracing::info!(%host, users, "load test starting: concurrent reads and writes");
        }
        LifecycleEvent::Stopped { host, summary } => {
            tracing::info!(%host, "load test complete: {summary}");
        }
    }
}
