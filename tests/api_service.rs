//! tests/api_service.rs
//! End-to-end behavior of a running ApiService: health endpoints, request ids,
//! injected view state, metrics and the stop sequence.

mod common;

use std::{sync::Arc, time::Duration};

use fautil::core::events::{AppStartEvent, AppStopEvent, EventPriority};
use fautil::core::service_manager::ServiceStatus;
use fautil::{ApiService, ComponentType, LifecycleEventType, StartOptions};
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::Value;

#[tokio::test]
async fn health_reports_running_service() {
    let app: common::TestApp = common::spawn_app().await;

    let resp: reqwest::Response = reqwest::get(app.url("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["app_name"], "test-app");
    assert_eq!(json["service_status"], "running");
    assert_eq!(json["components"]["http"]["status"], "ok");

    let resp: reqwest::Response = reqwest::get(app.url("/api/system/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");

    let resp: reqwest::Response = reqwest::get(app.url("/api/system/status")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "running");
    assert_eq!(json["version"], "0.1.0");
    assert_eq!(json["components"], 1);
}

#[tokio::test]
async fn status_is_unavailable_when_not_running() {
    let app: common::TestApp = common::spawn_app().await;
    app.service.services().set_status(ServiceStatus::Stopping);

    let resp: reqwest::Response = reqwest::get(app.url("/api/system/status")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], "SERVICE_UNAVAILABLE");
    assert_eq!(json["error"]["message"], "Service is stopping");

    // The plain health endpoint still answers 200 and carries the state.
    let resp: reqwest::Response = reqwest::get(app.url("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "error");
}

#[tokio::test]
async fn request_id_is_generated_or_echoed() {
    let app: common::TestApp = common::spawn_app().await;
    let client: reqwest::Client = reqwest::Client::new();

    let resp: reqwest::Response = client.get(app.url("/health")).send().await.unwrap();
    let generated: String = resp.headers()["x-request-id"].to_str().unwrap().to_string();
    assert!(!generated.is_empty());

    let resp: reqwest::Response = client
        .get(app.url("/health"))
        .header("x-request-id", "abc-123")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["x-request-id"], "abc-123");
}

#[tokio::test]
async fn injected_singletons_keep_state_across_requests() {
    let app: common::TestApp = common::spawn_app().await;
    let client: reqwest::Client = reqwest::Client::new();

    for expected in 1..=3u64 {
        let json: Value = client
            .get(app.url("/test/counter"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(json["hits"], expected);
    }

    let counter: Arc<common::CounterService> = app.service.injector().get::<common::CounterService>().unwrap();
    assert_eq!(counter.hit(), 4);
}

#[tokio::test]
async fn metrics_count_matched_routes() {
    let app: common::TestApp = common::spawn_app().await;
    let client: reqwest::Client = reqwest::Client::new();

    client.get(app.url("/test/conflict/a")).send().await.unwrap();
    client.get(app.url("/test/conflict/b")).send().await.unwrap();

    let resp: reqwest::Response = client.get(app.url("/metrics")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()["content-type"].to_str().unwrap().starts_with("text/plain"));

    let body: String = resp.text().await.unwrap();
    assert!(body.contains("http_requests_total"));
    assert!(body.contains("path=\"/test/conflict/{name}\""));
    assert!(body.contains("status=\"409\""));
    assert!(!body.contains("path=\"/metrics\""));
}

#[tokio::test]
async fn metrics_can_be_disabled() {
    let mut settings: fautil::Settings = common::test_settings();
    settings.middleware.enable_metrics = false;
    let app: common::TestApp = common::spawn_service(common::build_service(settings).await).await;

    let resp: reqwest::Response = reqwest::get(app.url("/metrics")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn starting_twice_is_a_no_op() {
    let app: common::TestApp = common::spawn_app().await;
    let first = app.service.local_addr();

    app.service
        .start(StartOptions { block: false, handle_signals: false, ..StartOptions::default() })
        .await
        .unwrap();
    assert_eq!(app.service.local_addr(), first);
}

#[tokio::test]
async fn stop_runs_lifecycle_in_order() {
    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let service: ApiService = common::build_service(common::test_settings()).await;

    for event in [
        LifecycleEventType::PreStartup,
        LifecycleEventType::PreHttpStart,
        LifecycleEventType::PostHttpStart,
        LifecycleEventType::PostStartup,
        LifecycleEventType::PreHttpStop,
        LifecycleEventType::PostHttpStop,
        LifecycleEventType::PreServicesStop,
        LifecycleEventType::PreCleanup,
        LifecycleEventType::PostShutdown,
    ] {
        let log: Arc<Mutex<Vec<String>>> = log.clone();
        service.lifecycle().register(event, format!("record.{event}"), move |ctx| {
            log.lock().push(ctx.event.as_str().to_string());
            futures::future::ready(Ok(()))
        });
    }

    let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let started: Arc<Mutex<Vec<String>>> = events.clone();
    service.events().register::<AppStartEvent, _, _>(EventPriority::Normal, "test.start", move |posted| {
        started.lock().push(format!("start:{}", posted.event().app_name));
        futures::future::ready(Ok(()))
    });
    let stopped: Arc<Mutex<Vec<String>>> = events.clone();
    service.events().register::<AppStopEvent, _, _>(EventPriority::Normal, "test.stop", move |posted| {
        let reason: String = posted.event().reason.clone().unwrap_or_default();
        stopped.lock().push(format!("stop:{reason}"));
        futures::future::ready(Ok(()))
    });

    let app: common::TestApp = common::spawn_service(service).await;
    let url: String = app.url("/health");
    assert_eq!(reqwest::get(&url).await.unwrap().status(), StatusCode::OK);

    assert!(app.service.stop().await);

    assert_eq!(app.service.services().status(), ServiceStatus::Stopped);
    assert!(!app.service.http().is_running());
    assert!(reqwest::get(&url).await.is_err());

    let recorded: Vec<String> = log.lock().clone();
    let expected: Vec<String> = [
        LifecycleEventType::PreStartup,
        LifecycleEventType::PreHttpStart,
        LifecycleEventType::PostHttpStart,
        LifecycleEventType::PostStartup,
        LifecycleEventType::PreHttpStop,
        LifecycleEventType::PostHttpStop,
        LifecycleEventType::PreServicesStop,
        LifecycleEventType::PreCleanup,
        LifecycleEventType::PostShutdown,
    ]
    .iter()
    .map(|event| event.as_str().to_string())
    .collect();
    assert_eq!(recorded, expected);

    assert_eq!(*events.lock(), vec!["start:test-app".to_string(), "stop:stop requested".to_string()]);
}

#[tokio::test]
async fn demo_package_serves_hello() {
    let service: ApiService = fautil::app::with_demo(
        ApiService::builder(fautil::app::DEMO_APP_NAME)
            .settings(common::test_settings())
            .configure_logging(false),
    )
    .build()
    .await
    .unwrap();
    let app: common::TestApp = common::spawn_service(service).await;
    let client: reqwest::Client = reqwest::Client::new();

    let json: Value = client.get(app.url("/hello")).send().await.unwrap().json().await.unwrap();
    assert_eq!(json, serde_json::json!({ "message": "Hello, World!" }));

    client.get(app.url("/hello/ada")).send().await.unwrap();
    let json: Value = client.get(app.url("/hello/grace")).send().await.unwrap().json().await.unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["message"], "Hello, grace!");
    assert_eq!(json["data"]["count"], 2);

    let greetings: Arc<fautil::app::GreetingService> =
        app.service.injector().get::<fautil::app::GreetingService>().unwrap();
    assert_eq!(greetings.served(), 2);
}

#[tokio::test]
async fn timed_out_stop_leaves_service_in_error() {
    let app: common::TestApp = common::spawn_app().await;
    app.service.lifecycle().on_shutdown("stuck.queue", ComponentType::Queue, |_| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok::<(), anyhow::Error>(())
    });
    app.service
        .shutdown_manager()
        .update_config(|config| config.timeout = Duration::from_millis(200));

    assert!(!app.service.stop().await);
    assert_eq!(app.service.services().status(), ServiceStatus::Error);
}
