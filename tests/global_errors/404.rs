//! tests/global_errors/404.rs
//! Ensures that hitting an unknown route returns the 404 error envelope.

#[path = "../common/mod.rs"]
mod common;

use reqwest::StatusCode;
use serde_json::Value;

#[tokio::test]
async fn returns_404_for_nonexistent_route() {
    let app: common::TestApp = common::spawn_app().await;

    let resp: reqwest::Response = reqwest::Client::new()
        .get(app.url("/does-not-exist"))
        .header("x-request-id", "req-404")
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.headers()["x-request-id"], "req-404");

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["data"], Value::Null);
    assert_eq!(json["error"]["code"], "NOT_FOUND");
    assert_eq!(json["error"]["message"], "No route for /does-not-exist");
    assert_eq!(json["error"]["request_id"], "req-404");
}
