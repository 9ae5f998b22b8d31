//! tests/global_errors/408.rs
//! Ensures that requests running past the 1s test timeout result in a 408.

#[path = "../common/mod.rs"]
mod common;

use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
async fn returns_408_when_request_times_out() {
    let app: common::TestApp = common::spawn_app().await;

    // The handler sleeps 3s; the client waits long enough to see the server's answer.
    let resp_result: Result<Result<reqwest::Response, reqwest::Error>, tokio::time::error::Elapsed> = timeout(
        Duration::from_secs(5),
        reqwest::Client::new().get(app.url("/test/slow")).send(),
    )
    .await;

    assert!(resp_result.is_ok(), "Client timed out waiting for server.");
    let resp: reqwest::Response = resp_result.unwrap().expect("Request failed unexpectedly.");

    assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], "REQUEST_TIMEOUT");
    assert!(json["error"]["request_id"].is_string());
}
