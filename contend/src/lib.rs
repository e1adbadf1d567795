//! Contend: virtual-user load generation that verifies what it reads.
//!
//! Contend spawns many independent simulated clients against an HTTP resource API.
//! Each client picks weighted behaviors at random, issues the requests, checks the
//! responses against what it knows it just did, and records a pass/fail verdict.
//! The verdicts add up to a snapshot whose failure rate says whether the target is
//! correct under concurrency; a failed read-after-write at low load is the finding
//! this crate exists to surface.
//!
//! # Architecture
//!
//! The main building blocks are:
//!
//! - [`Scenario`]: glue that ties everything together from a validated
//!   [`HarnessConfig`](config::HarnessConfig).
//! - [`Scheduler`](scheduler::Scheduler): ramps virtual users up at a spawn rate,
//!   holds them steady and stops them gracefully. It walks
//!   `Idle -> RampingUp -> Steady -> RampingDown -> Stopped`.
//! - [`VirtualUser`](user::VirtualUser): one client looping select, execute,
//!   validate, record, think.
//! - [`BehaviorCatalog`](behavior::BehaviorCatalog) and
//!   [`WeightedSelector`](selector::WeightedSelector): what users do, and how often.
//! - [`RequestExecutor`](request::RequestExecutor): the transport seam. The
//!   built-in [`HttpExecutor`](request::HttpExecutor) uses `reqwest`.
//! - [`validate`]: pure functions from a response to a verdict.
//! - [`Metric`]: the smallest unit a behavior produces; here a
//!   [`Verdict`](metric::Verdict).
//! - [`Aggregate`]: collects metrics into a compact table. The
//!   [`StatsAggregator`](aggregate::StatsAggregator) shares one between all users.
//! - [`Report`] and [`Reporter`]: turn the aggregate into a
//!   [`Snapshot`](report::Snapshot) and ship it somewhere.
//!
//! # Example
//!
//! ```no_run
//! use contend::{
//!     Reporter, Scenario,
//!     config::ConfigLoader,
//!     report::{StdoutReporter, log_lifecycle},
//! };
//!
//! #[tokio::main]
//! async fn main() -> contend::Result<()> {
//!     let config = ConfigLoader::new().load(None::<&str>)?;
//!     let scenario = Scenario::new("product api", config)?.on_event(log_lifecycle);
//!
//!     let stop = scenario.stop_handle();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         stop.stop();
//!     });
//!
//!     let report = scenario.run().await?;
//!     StdoutReporter.report(&report.snapshot).await
//! }
//! ```

// The attribute macros refer to `::contend`, including from inside this crate.
extern crate self as contend;

/// Metric aggregators and the shared stats sink
pub mod aggregate;
/// Weighted behaviors and the catalog
pub mod behavior;
/// Harness configuration and loading
pub mod config;
/// Error types
pub mod error;
/// Single metrics
pub mod metric;
/// Reports, reporters and lifecycle notifications
pub mod report;
/// Requests, outcomes and the transport seam
pub mod request;
/// Resource ids, domains and generated records
pub mod resource;
/// Main entry point that glues everything together
pub mod scenario;
/// Ramping users up and stopping them
pub mod scheduler;
/// Weighted behavior selection
pub mod selector;
/// Think time between behaviors
pub mod think;
/// Virtual users
pub mod user;
/// Response validation
pub mod validate;

pub use aggregate::Aggregate;
pub use error::{ConfigError, Error, Result};
pub use metric::Metric;
pub use report::{Report, Reporter};
pub use scenario::{RunReport, Scenario};

/// Procedural macros to reduce boilerplate
pub mod macros {
    pub use contend_macros::*;
}
