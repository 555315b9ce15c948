//! Shared fixtures for cross-crate integration tests
//!
//! Provides a local axum target server with routes that exercise each
//! probe family, plus helpers for running plans and collecting the
//! resulting event stream.

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use probe_engine::{
    EventSink, LogEvent, Params, PlanRunner, ProbeClient, RequestLog, Target, TestCategory,
    TestPlan, TestSpec, TestType,
};
use tokio::net::TcpListener;

/// Spawn a local target server on an ephemeral port and return its base URL
pub async fn spawn_target_server() -> String {
    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/health", get(|| async { "healthy" }))
        .route("/blocked", get(|| async { StatusCode::FORBIDDEN }))
        .route("/limited", get(|| async { StatusCode::TOO_MANY_REQUESTS }))
        .route("/upload", post(|| async { StatusCode::PAYLOAD_TOO_LARGE }))
        .route("/login", post(|| async { StatusCode::UNAUTHORIZED }))
        .route(
            "/api/items/:id",
            get(|Path(id): Path<u64>| async move { format!("item {id}") }),
        )
        .fallback(|| async { StatusCode::OK });

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind target server");
    let addr = listener.local_addr().expect("no local addr");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("target server failed: {}", e);
        }
    });
    format!("http://{addr}")
}

/// Build a single-spec plan around the given probe
pub fn single_spec_plan(spec: TestSpec) -> TestPlan {
    TestPlan {
        name: "integration".to_string(),
        description: None,
        tests: vec![spec],
    }
}

/// Convenience spec constructor for tests
pub fn spec(
    category: TestCategory,
    test_type: TestType,
    target: Target,
    params: Params,
) -> TestSpec {
    TestSpec {
        category,
        test_type,
        target,
        params,
        enabled: true,
    }
}

/// Target addressing a plain URL
pub fn url_target(url: &str) -> Target {
    Target {
        target_url: Some(url.to_string()),
        ..Default::default()
    }
}

/// Run a full plan and collect every emitted event in order
pub async fn run_plan_and_collect(plan: &TestPlan) -> Vec<LogEvent> {
    let _ = tracing_subscriber::fmt().try_init();
    let client = ProbeClient::new().expect("failed to build probe client");
    let (sink, mut rx) = EventSink::channel();
    PlanRunner::new(client).run(plan, &sink).await;
    drop(sink);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

/// Extract the request logs from an event stream, preserving order
pub fn request_logs(events: &[LogEvent]) -> Vec<&RequestLog> {
    events
        .iter()
        .filter_map(|event| match event {
            LogEvent::Request { log } => Some(log),
            _ => None,
        })
        .collect()
}

/// Find the terminal plan summary
pub fn plan_summary(events: &[LogEvent]) -> Option<&LogEvent> {
    events.iter().rev().find(|event| {
        matches!(event, LogEvent::Summary { message, .. } if message == "Plan finished")
    })
}
