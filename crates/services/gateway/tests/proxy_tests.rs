//! Reverse-proxy behavior against a real backend server on an ephemeral
//! port. Workers are named `127.0.0.1` so the worker hostname resolves to
//! the test backend.

mod support;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::RawQuery;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;

use llmgate_core::config::ClusterConfig;
use llmgate_core::{Registry, Worker};
use llmgate_gateway::api::{build_router, AppState};
use llmgate_gateway::replace::{ReplacementController, WorkerSpawner};

use support::{serve, MockCluster, StaticProbe};

fn backend() -> Router {
    Router::new()
        .route(
            "/greet",
            get(|RawQuery(query): RawQuery| async move {
                (
                    [("x-worker", "w0")],
                    format!("hello {}", query.unwrap_or_default()),
                )
            }),
        )
        .route("/echo", post(|body: String| async move { body }))
        .route(
            "/teapot",
            get(|| async { (StatusCode::IM_A_TEAPOT, "short and stout") }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                "done"
            }),
        )
}

fn app(registry: Arc<Registry>, worker_port: u16) -> Router {
    let cluster = MockCluster::new();
    let spawner = WorkerSpawner::new(
        cluster.clone(),
        &ClusterConfig::default(),
        Vec::new(),
        None,
    );
    let controller = Arc::new(ReplacementController::new(
        registry.clone(),
        cluster,
        StaticProbe::ready(),
        spawner,
        Duration::from_millis(5),
        Duration::from_millis(200),
        Duration::from_millis(10),
    ));
    build_router(AppState::new(registry, controller, worker_port).unwrap())
}

async fn proxy_for_backend() -> (Arc<Worker>, Arc<Registry>, String) {
    let (backend_addr, _backend) = serve(backend()).await;
    let worker = Arc::new(Worker::new("127.0.0.1"));
    let registry = Arc::new(Registry::new(worker.clone(), 1));
    let (proxy_addr, _proxy) = serve(app(registry.clone(), backend_addr.port())).await;
    (worker, registry, format!("http://{}", proxy_addr))
}

#[tokio::test]
async fn forwards_path_query_headers_and_body() {
    let (_, _, base) = proxy_for_backend().await;

    let response = reqwest::get(format!("{}/greet?name=bob", base))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-worker"], "w0");
    assert_eq!(response.text().await.unwrap(), "hello name=bob");
}

#[tokio::test]
async fn forwards_request_body_and_method() {
    let (_, _, base) = proxy_for_backend().await;

    let response = reqwest::Client::new()
        .post(format!("{}/echo", base))
        .body("streamed payload")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "streamed payload");
}

#[tokio::test]
async fn passes_worker_status_through() {
    let (_, _, base) = proxy_for_backend().await;

    let response = reqwest::get(format!("{}/teapot", base)).await.unwrap();
    assert_eq!(response.status(), 418);
}

#[tokio::test]
async fn unknown_worker_route_is_still_forwarded() {
    let (_, _, base) = proxy_for_backend().await;

    // The worker's 404, not the proxy's.
    let response = reqwest::get(format!("{}/nope", base)).await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn unreachable_worker_yields_bad_gateway() {
    // A port with nothing listening on it.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_port = listener.local_addr().unwrap().port();
    drop(listener);

    let registry = Arc::new(Registry::new(Arc::new(Worker::new("127.0.0.1")), 1));
    let (proxy_addr, _proxy) = serve(app(registry, dead_port)).await;

    let response = reqwest::get(format!("http://{}/greet", proxy_addr))
        .await
        .unwrap();
    assert_eq!(response.status(), 502);
}

#[tokio::test]
async fn in_flight_count_spans_the_whole_request() {
    let (worker, _, base) = proxy_for_backend().await;
    assert_eq!(worker.in_flight(), 0);

    let request = {
        let base = base.clone();
        tokio::spawn(async move { reqwest::get(format!("{}/slow", base)).await })
    };

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(worker.in_flight(), 1);

    let response = request.await.unwrap().unwrap();
    assert_eq!(response.text().await.unwrap(), "done");

    // Decremented exactly once when the response completed.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(worker.in_flight(), 0);
}

#[tokio::test]
async fn requests_survive_a_swap_mid_stream() {
    let (old_worker, registry, base) = proxy_for_backend().await;

    let mut requests = Vec::new();
    for _ in 0..10 {
        let base = base.clone();
        requests.push(tokio::spawn(async move {
            reqwest::get(format!("{}/slow", base)).await
        }));
    }

    // Swap while those requests are in flight. The new worker points at
    // the same backend, as it would after a real rotation.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let new_worker = Arc::new(Worker::new("127.0.0.1"));
    let swapped_out = registry.swap(new_worker.clone());
    assert_eq!(swapped_out.name(), old_worker.name());

    let mut tail = Vec::new();
    for _ in 0..10 {
        let base = base.clone();
        tail.push(tokio::spawn(async move {
            reqwest::get(format!("{}/slow", base)).await
        }));
    }

    for request in requests.into_iter().chain(tail) {
        let response = request.await.unwrap().unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "done");
    }

    // Every request completed and was attributed to exactly one worker.
    assert_eq!(old_worker.in_flight(), 0);
    assert_eq!(new_worker.in_flight(), 0);
}

#[tokio::test]
async fn replace_endpoint_reports_outcome() {
    let (_, registry, base) = proxy_for_backend().await;

    let response = reqwest::Client::new()
        .post(format!("{}/replace", base))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "replaced");
    assert_eq!(registry.active().name(), body["worker"].as_str().unwrap());
}
