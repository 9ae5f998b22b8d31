//! tests/global_errors/413.rs
//! Ensures that a payload above the 1KiB test limit triggers 413.

#[path = "../common/mod.rs"]
mod common;

use reqwest::StatusCode;
use serde_json::Value;

#[tokio::test]
async fn returns_413_when_payload_exceeds_global_limit() {
    let app: common::TestApp = common::spawn_app().await;

    let oversized_payload: String = format!("{{\"blob\":\"{}\"}}", "X".repeat(2048));

    let resp: reqwest::Response = reqwest::Client::new()
        .post(app.url("/test/echo"))
        .header("content-type", "application/json")
        .body(oversized_payload)
        .send()
        .await
        .expect("Failed to send large request.");

    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn small_payload_is_echoed() {
    let app: common::TestApp = common::spawn_app().await;

    let resp: reqwest::Response = reqwest::Client::new()
        .post(app.url("/test/echo"))
        .json(&serde_json::json!({ "name": "fautil" }))
        .send()
        .await
        .expect("Failed to send request.");

    assert_eq!(resp.status(), StatusCode::OK);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["name"], "fautil");
}
