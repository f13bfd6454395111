mod common;

use axum::http::{Method, StatusCode};

use common::app::{spawn_test_server, spawn_test_server_with_limits};
use common::http::{assert_json_error, request, response_json, start_session};

#[tokio::test]
async fn it_health_live_and_ready() {
    let app = spawn_test_server().await;

    let live = request(&app.app, Method::GET, "/health/live", None, &[]).await;
    let (live_status, _, _) = response_json(live).await;
    assert_eq!(live_status, StatusCode::OK);

    let ready = request(&app.app, Method::GET, "/health/ready", None, &[]).await;
    let (ready_status, _, body) = response_json(ready).await;
    assert_eq!(ready_status, StatusCode::OK);
    assert_eq!(body["ready"], true);
    assert_eq!(body["capacity"], 64);
    assert_eq!(body["exportEnabled"], true);
}

#[tokio::test]
async fn it_health_reports_active_sessions() {
    let app = spawn_test_server().await;

    let before = request(&app.app, Method::GET, "/health", None, &[]).await;
    let (status, _, body) = response_json(before).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["activeSessions"], 0);
    assert!(body["uptimeSecs"].is_u64());

    start_session(&app.app, 1_700_000_000.0).await;

    let after = request(&app.app, Method::GET, "/health", None, &[]).await;
    let (_, _, body) = response_json(after).await;
    assert_eq!(body["activeSessions"], 1);
}

#[tokio::test]
async fn it_ready_is_unavailable_when_session_table_is_full() {
    let app = spawn_test_server_with_limits(1, 4).await;
    start_session(&app.app, 0.0).await;

    let ready = request(&app.app, Method::GET, "/health/ready", None, &[]).await;
    let (status, headers, body) = response_json(ready).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn it_unknown_route_is_json_404_with_trace_id() {
    let app = spawn_test_server().await;

    let resp = request(
        &app.app,
        Method::GET,
        "/api/nope",
        None,
        &[("x-request-id", "trace-abc_123".to_string())],
    )
    .await;
    let (status, headers, body) = response_json(resp).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_json_error(&body, "NOT_FOUND");
    assert_eq!(body["traceId"], "trace-abc_123");
    assert_eq!(headers.get("x-request-id").unwrap(), "trace-abc_123");
}
