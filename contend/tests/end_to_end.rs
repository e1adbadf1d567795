//! Full runs against an in-process product API.
//!
//! The target keeps records in memory behind a lock. Its racy variant
//! acknowledges a write before the record is visible, which is exactly what the
//! read-after-write behavior is there to catch.

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use contend::{
    Scenario,
    config::{HarnessConfig, RangeConfig, ThinkTimeConfig},
    validate::EXPECTED_EXISTENCE,
};
use serde_json::Value;
use tokio::{net::TcpListener, sync::RwLock};

#[derive(Clone)]
struct Target {
    products: Arc<RwLock<HashMap<u32, Value>>>,
    racy: bool,
}

async fn get_product(State(target): State<Target>, Path(id): Path<u32>) -> Response {
    match target.products.read().await.get(&id) {
        Some(record) => (StatusCode::OK, Json(record.clone())).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn post_details(
    State(target): State<Target>,
    Path(id): Path<u32>,
    Json(record): Json<Value>,
) -> StatusCode {
    if target.racy {
        // Drops the old record and persists the new one after acknowledging.
        target.products.write().await.remove(&id);
        let products = target.products.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            products.write().await.insert(id, record);
        });
    } else {
        target.products.write().await.insert(id, record);
    }
    StatusCode::NO_CONTENT
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn serve(racy: bool) -> SocketAddr {
    let target = Target {
        products: Arc::default(),
        racy,
    };
    let app = Router::new()
        .route("/products/{id}", get(get_product))
        .route("/products/{id}/details", post(post_details))
        .route("/healthz", get(healthz))
        .with_state(target);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn config(host: String) -> HarnessConfig {
    HarnessConfig {
        host,
        users: 5,
        spawn_rate: 50.0,
        max_behaviors: Some(100),
        think_time: Some(ThinkTimeConfig {
            min_secs: 0.0,
            max_secs: 0.0,
        }),
        resource_ids: RangeConfig::new(1, 5),
        contention_ids: RangeConfig::new(1, 5),
        warmup_ids: Some(RangeConfig::new(1, 5)),
        seed: 42,
        request_timeout_secs: 5.0,
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn correct_target_has_no_failures() {
    let addr = serve(false).await;
    let scenario = Scenario::new("correct target", config(format!("http://{addr}"))).unwrap();

    let report = scenario.run().await.unwrap();
    let snapshot = &report.snapshot;

    assert_eq!(report.run.users_spawned, 5);
    assert_eq!(report.run.behaviors_completed, 100);
    assert_eq!(snapshot.total, 100);
    assert_eq!(snapshot.failures, 0, "{snapshot}");
    assert_eq!(
        snapshot.behaviors.iter().map(|b| b.successes).sum::<u64>(),
        snapshot.total
    );
    assert!(snapshot.behavior("read").is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racy_target_fails_read_after_write() {
    let addr = serve(true).await;
    let scenario = Scenario::new("racy target", config(format!("http://{addr}"))).unwrap();

    let report = scenario.run().await.unwrap();
    let snapshot = &report.snapshot;

    assert_eq!(snapshot.total, 100);
    let probe = snapshot
        .behavior("read_after_write")
        .expect("read_after_write never ran");
    assert!(probe.failures >= 1, "{snapshot}");
    assert!(
        probe
            .reasons
            .keys()
            .any(|reason| reason.contains(EXPECTED_EXISTENCE)),
        "{snapshot}"
    );
    // Plain reads tolerate a missing record, writes are acknowledged.
    for name in ["read", "write", "health_check"] {
        if let Some(row) = snapshot.behavior(name) {
            assert_eq!(row.failures, 0, "{name}: {snapshot}");
        }
    }
}

#[tokio::test]
async fn unreachable_target_is_recorded_not_fatal() {
    let config = HarnessConfig {
        users: 2,
        max_behaviors: Some(20),
        ..config("http://127.0.0.1:9".to_string())
    };
    let scenario = Scenario::new("unreachable", config).unwrap();

    let report = scenario.run().await.unwrap();
    let snapshot = &report.snapshot;

    assert_eq!(snapshot.total, 20);
    assert_eq!(snapshot.failures, 20);
    for row in &snapshot.behaviors {
        assert!(
            row.reasons.keys().all(|reason| reason.starts_with("transport")),
            "{snapshot}"
        );
    }
    assert!(snapshot.endpoints.iter().all(|e| e.transport_errors == e.requests));
}
