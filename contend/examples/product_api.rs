//! Runs the standard product API mix against a live target.
//!
//! ```text
//! cargo run --example product_api -- [config.yaml] [--json]
//! CONTEND_HOST=http://localhost:8080 CONTEND_USERS=50 cargo run --example product_api
//! ```
//!
//! Ctrl-C stops the run gracefully: in-flight requests finish and are counted.

use contend::{
    Reporter, Scenario,
    config::ConfigLoader,
    report::{JsonReporter, StdoutReporter, log_lifecycle},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> contend::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut path = None;
    let mut json = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--json" => json = true,
            _ => path = Some(arg),
        }
    }

    let config = ConfigLoader::new().load(path.as_deref())?;
    let scenario = Scenario::new("product api", config)?.on_event(log_lifecycle);

    let stop = scenario.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
    });

    let report = scenario.run().await?;
    if report.run.panicked_users > 0 {
        tracing::warn!(panicked = report.run.panicked_users, "some virtual users panicked");
    }
    if json {
        JsonReporter.report(&report.snapshot).await
    } else {
        StdoutReporter.report(&report.snapshot).await
    }
}
