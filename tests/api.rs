//! HTTP API routes driven through the router without a listener.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use batch_anchor::config::ApiConfig;
use batch_anchor::http::{ApiServer, AppState};

mod common;
use common::Harness;

fn router(h: &Harness) -> axum::Router {
    ApiServer::build_router(
        &ApiConfig::default(),
        AppState {
            manager: h.manager(),
            node: common::node_config(),
        },
    )
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_broadcast_message_accepted() {
    let h = Harness::new();
    let response = router(&h)
        .oneshot(post_json(
            "/api/v1/namespaces/ns1/messages/broadcast",
            json!({"data": [{"value": {"a": 1}}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(response.headers().contains_key("x-request-id"));
    let body = body_json(response).await;
    assert_eq!(body["header"]["namespace"], "ns1");
    assert_eq!(body["header"]["author"], "org1");
    assert!(body["header"]["id"].as_str().is_some());
    assert_eq!(h.scheduler.staged().len(), 1);
}

#[tokio::test]
async fn test_broadcast_without_data_is_bad_request() {
    let h = Harness::new();
    let response = router(&h)
        .oneshot(post_json(
            "/api/v1/namespaces/ns1/messages/broadcast",
            json!({"header": {"topics": ["t1"]}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_datatype_missing_version() {
    let h = Harness::new();
    let response = router(&h)
        .oneshot(post_json(
            "/api/v1/namespaces/ns1/datatypes",
            json!({"name": "widget", "value": {"type": "object"}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = router(&h)
        .oneshot(post_json(
            "/api/v1/namespaces/ns1/datatypes",
            json!({"name": "widget", "version": "1", "value": {"type": "object"}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["validator"], "json");
    assert!(body["message"].as_str().is_some());
}

#[tokio::test]
async fn test_upload_blob_created() {
    let h = Harness::new();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/namespaces/ns1/data/blob")
        .header("x-blob-name", "notes.txt")
        .body(Body::from("some notes"))
        .unwrap();

    let response = router(&h).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["blob"]["name"], "notes.txt");
    assert_eq!(body["blob"]["size"], 10);
}

#[tokio::test]
async fn test_unknown_operation_not_found() {
    let h = Harness::new();
    let request = Request::builder()
        .uri(format!("/api/v1/operations/{}", Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();

    let response = router(&h).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_status() {
    let h = Harness::new();
    let request = Request::builder()
        .uri("/api/v1/status")
        .body(Body::empty())
        .unwrap();

    let response = router(&h).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["node"], "node1");
    assert_eq!(body["org"], "org1");
    assert_eq!(body["manager"]["shared_storage"], "scripted-ipfs");
    assert_eq!(body["manager"]["batch_pin"], "recording-pins");
}
