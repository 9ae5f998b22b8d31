//! tests/global_errors/405.rs
//! Ensures that the framework's plain-text 405 is rewritten into the envelope.

#[path = "../common/mod.rs"]
mod common;

use reqwest::StatusCode;
use serde_json::Value;

#[tokio::test]
async fn returns_405_for_wrong_method() {
    let app: common::TestApp = common::spawn_app().await;

    let resp: reqwest::Response = reqwest::Client::new()
        .delete(app.url("/health"))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(resp.headers().contains_key("allow"));

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "METHOD_NOT_ALLOWED");
}
