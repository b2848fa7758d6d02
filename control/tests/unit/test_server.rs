//! HTTP router tests

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use secrecy::SecretString;
use serde_json::{json, Value};
use tower::ServiceExt;

use stackctl::app::options::ServerOptions;
use stackctl::remote::Orchestrator;
use stackctl::runner::ProcessRunner;
use stackctl::server::serve::router;
use stackctl::server::state::ServerState;
use stackctl::storage::layout::ProjectLayout;

use crate::support::{deploy_body, deploy_body_with, ScriptedTransport};

fn app(transport: &ScriptedTransport, options: ServerOptions) -> Router {
    let runner = Arc::new(ProcessRunner::default());
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(transport.clone()),
        ProjectLayout::new(std::env::temp_dir()),
    ));
    router(Arc::new(ServerState::new(runner, orchestrator)), &options)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health() {
    let transport = ScriptedTransport::new();
    let request = Request::get("/health").body(Body::empty()).unwrap();

    let (status, body) = send(app(&transport, ServerOptions::default()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "stackctl");
}

#[tokio::test]
async fn test_remote_deploy_success() {
    let transport = ScriptedTransport::new();
    let request = post_json("/api/remote-deploy", &deploy_body());

    let (status, body) = send(app(&transport, ServerOptions::default()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["serverInfo"]["deployPath"], "/home/deploy/media-stack");
    assert_eq!(body["steps"][0], json!({ "step": "Connecting to server...", "status": "done" }));
    assert!(body["serverInfo"]["deployedAt"].is_string());
}

#[tokio::test]
async fn test_remote_deploy_rejects_bad_path() {
    let transport = ScriptedTransport::new();
    let request = post_json(
        "/api/remote-deploy",
        &deploy_body_with(json!({ "deployPath": "~/../../etc" })),
    );

    let (status, body) = send(app(&transport, ServerOptions::default()), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert_eq!(transport.connects(), 0);
}

#[tokio::test]
async fn test_remote_deploy_failure_is_reported_in_body() {
    let transport = ScriptedTransport::new();
    transport.respond("docker --version", 127, "", "docker: command not found");
    let request = post_json("/api/remote-deploy", &deploy_body());

    let (status, body) = send(app(&transport, ServerOptions::default()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Docker is not installed on the remote server");
    let last = body["steps"].as_array().unwrap().last().unwrap().clone();
    assert_eq!(last["status"], "error");
}

#[tokio::test]
async fn test_remote_test_unreachable_is_bad_gateway() {
    let transport = ScriptedTransport::new();
    transport.refuse("Connection timed out");
    let request = post_json("/api/remote-deploy/test", &deploy_body());

    let (status, body) = send(app(&transport, ServerOptions::default()), request).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_remote_test_missing_credentials() {
    let transport = ScriptedTransport::new();
    let request = post_json(
        "/api/remote-deploy/test",
        &json!({ "host": "media.example.net", "username": "deploy", "authType": "key" }),
    );

    let (status, body) = send(app(&transport, ServerOptions::default()), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Private key is required for SSH key authentication");
}

#[tokio::test]
async fn test_invalid_service_action() {
    let transport = ScriptedTransport::new();
    let request = post_json("/api/service/destroy", &json!({ "serviceName": "jellyfin" }));

    let (status, body) = send(app(&transport, ServerOptions::default()), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid action");
}

#[tokio::test]
async fn test_api_token_required_when_configured() {
    let transport = ScriptedTransport::new();
    let options = ServerOptions {
        api_token: Some(SecretString::from("s3cret")),
        ..Default::default()
    };

    let request = post_json("/api/remote-deploy", &deploy_body());
    let (status, body) = send(app(&transport, options.clone()), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
    assert_eq!(transport.connects(), 0);

    let mut request = post_json("/api/remote-deploy", &deploy_body());
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer s3cret".parse().unwrap());
    let (status, _) = send(app(&transport, options.clone()), request).await;
    assert_eq!(status, StatusCode::OK);

    let request = Request::get("/api/health").body(Body::empty()).unwrap();
    let (status, _) = send(app(&transport, options), request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_api_token_rejects_near_miss() {
    let transport = ScriptedTransport::new();
    let options = ServerOptions {
        api_token: Some(SecretString::from("s3cret")),
        ..Default::default()
    };

    for presented in ["Bearer s3creT", "Bearer s3cre", "Bearer s3cret ", "s3cret"] {
        let mut request = post_json("/api/remote-deploy", &deploy_body());
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, presented.parse().unwrap());
        let (status, body) = send(app(&transport, options.clone()), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{presented}");
        assert_eq!(body["error"], "Unauthorized");
    }
    assert_eq!(transport.connects(), 0);
}

#[tokio::test]
async fn test_malformed_body_is_json_bad_request() {
    let transport = ScriptedTransport::new();

    let bodies = [
        ("/api/remote-deploy", deploy_body_with(json!({ "host": 123 }))),
        ("/api/remote-deploy/test", deploy_body_with(json!({ "port": -1 }))),
        ("/api/service/start", json!({ "service": "jellyfin" })),
    ];
    for (uri, body) in bodies {
        let (status, response) =
            send(app(&transport, ServerOptions::default()), post_json(uri, &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}: {body}");
        assert!(response["error"].is_string(), "{uri}: {response}");
    }

    let request = Request::builder()
        .method("POST")
        .uri("/api/remote-deploy")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let (status, response) = send(app(&transport, ServerOptions::default()), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response["error"].is_string());
    assert_eq!(transport.connects(), 0);
}

#[tokio::test]
async fn test_cors_allows_configured_origin() {
    let transport = ScriptedTransport::new();
    let request = Request::get("/health")
        .header(header::ORIGIN, "http://localhost:5173")
        .body(Body::empty())
        .unwrap();

    let response = app(&transport, ServerOptions::default())
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://localhost:5173"
    );

    let request = Request::get("/health")
        .header(header::ORIGIN, "http://evil.test")
        .body(Body::empty())
        .unwrap();
    let response = app(&transport, ServerOptions::default())
        .oneshot(request)
        .await
        .unwrap();
    assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}
