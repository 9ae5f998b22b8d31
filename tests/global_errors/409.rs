//! tests/global_errors/409.rs
//! Ensures that an ApiError returned by a handler keeps its status and message.

#[path = "../common/mod.rs"]
mod common;

use reqwest::StatusCode;
use serde_json::Value;

#[tokio::test]
async fn returns_409_from_handler_error() {
    let app: common::TestApp = common::spawn_app().await;

    let resp: reqwest::Response = reqwest::get(app.url("/test/conflict/widget"))
        .await
        .expect("Failed to execute request.");

    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], "CONFLICT");
    assert_eq!(json["error"]["message"], "widget already exists");
    assert_eq!(json["error"]["details"], serde_json::json!([]));
}
