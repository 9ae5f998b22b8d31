//! tests/global_errors/500.rs
//! Ensures that a panicking handler maps to the 500 envelope and the server keeps serving.

#[path = "../common/mod.rs"]
mod common;

use reqwest::StatusCode;
use serde_json::Value;

#[tokio::test]
async fn returns_500_on_handler_panic() {
    let app: common::TestApp = common::spawn_app().await;
    let client: reqwest::Client = reqwest::Client::new();

    let resp: reqwest::Response = client
        .get(app.url("/test/panic"))
        .send()
        .await
        .expect("Failed to make request.");

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "INTERNAL_SERVER_ERROR");

    let resp: reqwest::Response = client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
