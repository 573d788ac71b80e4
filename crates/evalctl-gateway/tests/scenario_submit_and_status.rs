//! In-process scenario tests for evalctl-gateway. Drives the Axum router
//! directly with `tower::ServiceExt::oneshot` against an in-memory
//! `Harness`, the same pattern the grounding daemon's route tests use.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use evalctl_gateway::{routes, state::AppState};
use evalctl_testkit::Harness;
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

fn make_router() -> (axum::Router, Harness) {
    let harness = Harness::new();
    let state = Arc::new(AppState::new(
        harness.queue.clone(),
        harness.store.clone(),
        harness.index.clone(),
        harness.bus.clone(),
        1_000_000,
        2_000_000,
        1,
        900,
        100 * 1024,
        1_000,
    ));
    (routes::build_router(state), harness)
}

async fn call(
    router: axum::Router,
    req: Request<axum::body::Body>,
) -> (StatusCode, serde_json::Value) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body is not valid JSON")
    };
    (status, json)
}

fn submit_req(body: serde_json::Value) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri("/eval")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn submit_then_list_on_queue_enqueues_and_publishes() {
    let (router, harness) = make_router();
    let body = json!({
        "source_text": "print('hi')",
        "language_tag": "python3",
        "timeout_s": 30,
    });

    let (status, resp) = call(router, submit_req(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["status"], "queued");
    let id: uuid::Uuid = resp["id"].as_str().unwrap().parse().unwrap();

    let claimed = harness.queue.claim("default", 10, "test").await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].eval_id, id);
}

#[tokio::test]
async fn submit_rejects_unsupported_language() {
    let (router, _harness) = make_router();
    let body = json!({
        "source_text": "puts 1",
        "language_tag": "ruby",
        "timeout_s": 10,
    });
    let (status, _resp) = call(router, submit_req(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn submit_rejects_timeout_out_of_range() {
    let (router, _harness) = make_router();
    let body = json!({
        "source_text": "print(1)",
        "language_tag": "python3",
        "timeout_s": 901,
    });
    let (status, _resp) = call(router, submit_req(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn submit_rejects_oversized_source() {
    let (router, _harness) = make_router();
    let body = json!({
        "source_text": "x".repeat(2_000_000),
        "language_tag": "python3",
        "timeout_s": 10,
    });
    let (status, _resp) = call(router, submit_req(body)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn status_for_unknown_id_is_404() {
    let (router, _harness) = make_router();
    let req = Request::builder()
        .method("GET")
        .uri(format!("/eval/{}", uuid::Uuid::new_v4()))
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _resp) = call(router, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn status_reflects_store_once_reactor_has_persisted_it() {
    let (router, harness) = make_router();
    let id = uuid::Uuid::new_v4();
    let req = evalctl_schemas::NewEvaluation {
        language_tag: "python3".to_string(),
        source_text: "print(1)".to_string(),
        timeout_s: 10,
        max_output_bytes: 1024,
        resource_class: None,
    };
    harness.store.insert(id, chrono::Utc::now(), req).await.unwrap();

    let get_req = Request::builder()
        .method("GET")
        .uri(format!("/eval/{id}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, resp) = call(router, get_req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["status"], "queued");
    assert_eq!(resp["id"], id.to_string());
}

#[tokio::test]
async fn kill_on_non_running_evaluation_is_a_noop() {
    let (router, _harness) = make_router();
    let req = Request::builder()
        .method("POST")
        .uri(format!("/eval/{}/kill", uuid::Uuid::new_v4()))
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, resp) = call(router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["killed"], false);
    assert_eq!(resp["reason"], "not_running");
}

#[tokio::test]
async fn list_returns_inserted_rows_newest_first() {
    let (router, harness) = make_router();
    let req = evalctl_schemas::NewEvaluation {
        language_tag: "python3".to_string(),
        source_text: "print(1)".to_string(),
        timeout_s: 10,
        max_output_bytes: 1024,
        resource_class: None,
    };
    harness
        .store
        .insert(uuid::Uuid::new_v4(), chrono::Utc::now(), req.clone())
        .await
        .unwrap();
    harness
        .store
        .insert(uuid::Uuid::new_v4(), chrono::Utc::now(), req)
        .await
        .unwrap();

    let list_req = Request::builder()
        .method("GET")
        .uri("/eval?limit=10&offset=0")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, resp) = call(router, list_req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["items"].as_array().unwrap().len(), 2);
}
