//! API endpoint integration tests

mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use cadence_gateway::conversation::TurnState;

use common::build_test_router;

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = build_test_router(false, None);

    let (status, json) = send(app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_ready_endpoint() {
    let (app, _) = build_test_router(false, None);

    let (status, json) = send(app, get("/ready")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["checks"]["dispatcher"]["status"], "ok");
    // No transcriber configured in tests
    assert_eq!(json["checks"]["voice"]["status"], "unavailable");
}

#[tokio::test]
async fn sync_action_completes() {
    let (app, _) = build_test_router(false, None);
    let body = json!({"type": "echo", "params": {"x": 1}});

    let (status, json) = send(app, post_json("/v1/actions", &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "completed");
    assert_eq!(json["result"]["params"], json!({"x": 1}));
    assert!(json["action_id"].is_string());
    assert!(json["timestamp"].is_string());
    assert!(json.get("error").is_none());
}

#[tokio::test]
async fn unknown_action_is_rejected() {
    let (app, _) = build_test_router(false, None);
    let body = json!({"type": "nonexistent.tool", "params": {}});

    let (status, json) = send(app, post_json("/v1/actions", &body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "invalid_action");
    assert_eq!(
        json["error"]["message"],
        "Unknown action type: nonexistent.tool"
    );
}

#[tokio::test]
async fn malformed_action_is_bad_request() {
    let (app, _) = build_test_router(false, None);
    let request = Request::builder()
        .method("POST")
        .uri("/v1/actions")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, json) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "bad_request");
}

#[tokio::test]
async fn async_action_is_tracked() {
    let (app, _) = build_test_router(false, None);
    let body = json!({"id": "a-1", "type": "time.now", "async": true});

    let (status, json) = send(app.clone(), post_json("/v1/actions", &body)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["status"], "accepted");
    assert_eq!(json["action_id"], "a-1");
    let job_id = json["job_id"].as_str().unwrap().to_string();

    let mut job = Value::Null;
    for _ in 0..50 {
        let (status, body) = send(app.clone(), get(&format!("/v1/jobs/{job_id}"))).await;
        assert_eq!(status, StatusCode::OK);
        job = body;
        if job["status"] == "succeeded" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    assert_eq!(job["status"], "succeeded");
    assert_eq!(job["id"], job_id.as_str());
    assert_eq!(job["action_id"], "a-1");
    assert!(job["result"]["unix"].is_i64());
    assert_eq!(job["retries"], 0);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let (app, _) = build_test_router(false, None);

    let (status, json) = send(app, get("/v1/jobs/does-not-exist")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "not_found");
}

#[tokio::test]
async fn tools_are_listed_and_described() {
    let (app, _) = build_test_router(false, None);

    let (status, json) = send(app.clone(), get("/v1/tools")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["tools"], json!(["echo", "time.now"]));

    let (status, json) = send(app.clone(), get("/v1/tools?name=echo")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "echo");
    assert_eq!(json["params_schema"]["type"], "object");
    assert!(json["permissions"].is_array());

    let (status, _) = send(app, get("/v1/tools?name=missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn registration_requires_developer_mode() {
    let (app, _) = build_test_router(false, None);

    let (status, json) = send(app, post_json("/v1/tools/register", &json!({"name": "dyn.echo"}))).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"]["code"], "forbidden");
}

#[tokio::test]
async fn registration_requires_api_key_when_configured() {
    let (app, _) = build_test_router(true, Some("test-api-key"));

    let (status, json) = send(app, post_json("/v1/tools/register", &json!({"name": "dyn.echo"}))).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn valid_key_without_developer_mode_is_forbidden() {
    let (app, services) = build_test_router(false, Some("test-api-key"));
    let request = Request::builder()
        .method("POST")
        .uri("/v1/tools/register")
        .header("content-type", "application/json")
        .header("Authorization", "Bearer test-api-key")
        .body(Body::from(json!({"name": "dyn.echo"}).to_string()))
        .unwrap();

    let (status, json) = send(app, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"]["code"], "forbidden");
    assert!(!services.dispatcher.is_valid_action("dyn.echo"));
}

#[tokio::test]
async fn registered_tool_is_dispatchable() {
    let (app, services) = build_test_router(true, Some("test-api-key"));
    let request = Request::builder()
        .method("POST")
        .uri("/v1/tools/register")
        .header("content-type", "application/json")
        .header("Authorization", "Bearer test-api-key")
        .body(Body::from(json!({"name": "dyn.echo", "description": "Dynamic"}).to_string()))
        .unwrap();

    let (status, json) = send(app.clone(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"status": "registered", "name": "dyn.echo"}));
    assert!(services.dispatcher.is_valid_action("dyn.echo"));

    let body = json!({"type": "dyn.echo", "params": {"k": "v"}, "meta": {"user_id": "u"}});
    let (status, json) = send(app, post_json("/v1/actions", &body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"], json!({"params": {"k": "v"}, "meta": {"user_id": "u"}}));
}

#[tokio::test]
async fn plugins_endpoint_lists_none_by_default() {
    let (app, _) = build_test_router(false, None);

    let (status, json) = send(app, get("/v1/plugins")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["plugins"], json!([]));
}

#[tokio::test]
async fn session_state_reflects_machine() {
    let (app, services) = build_test_router(false, None);

    let (status, _) = send(app.clone(), get("/v1/sessions/kitchen/state")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let machine = services.sessions.get_or_create("kitchen").await;
    machine.transition(TurnState::Listening, "test").await;

    let (status, json) = send(app, get("/v1/sessions/kitchen/state")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["session_id"], "kitchen");
    assert_eq!(json["state"], "listening");
    assert_eq!(json["previous_state"], "idle");
    assert_eq!(json["is_listening"], true);
    assert_eq!(json["is_speaking"], false);
}
