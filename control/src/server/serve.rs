//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::app::options::ServerOptions;
use crate::errors::ControlError;
use crate::server::handlers::{
    containers_handler, health_handler, health_snapshot_handler, remote_deploy_handler,
    remote_test_handler, restart_handler, service_handler, update_handler, version_handler,
    ErrorResponse,
};
use crate::server::state::ServerState;

/// Build the application router
pub fn router(state: Arc<ServerState>, options: &ServerOptions) -> Router {
    let mut api = Router::new()
        // Local stack
        .route("/api/containers", get(containers_handler))
        .route("/api/service/{action}", post(service_handler))
        .route("/api/system/update", post(update_handler))
        .route("/api/system/restart", post(restart_handler))
        .route("/api/health-snapshot", get(health_snapshot_handler))
        // Remote deployment
        .route("/api/remote-deploy", post(remote_deploy_handler))
        .route("/api/remote-deploy/test", post(remote_test_handler));

    if let Some(token) = &options.api_token {
        let expected = Arc::new(SecretString::from(format!("Bearer {}", token.expose_secret())));
        api = api.route_layer(middleware::from_fn_with_state(expected, require_token));
    }

    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/api/health", get(health_handler))
        .route("/version", get(version_handler))
        .merge(api)
        // State and middleware
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&options.cors_origins)),
        )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Compare a presented Authorization header against the expected one in constant time
fn token_matches(presented: &[u8], expected: &SecretString) -> bool {
    let expected = expected.expose_secret().as_bytes();
    if presented.len() != expected.len() {
        return false;
    }
    presented.ct_eq(expected).into()
}

async fn require_token(
    State(expected): State<Arc<SecretString>>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .is_some_and(|value| token_matches(value.as_bytes(), &expected));

    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Unauthorized".to_string(),
            }),
        )
            .into_response();
    }

    next.run(request).await
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), ControlError>>, ControlError> {
    let app = router(state, options);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);
    if options.api_token.is_none() {
        warn!("CONTROL_SERVER_TOKEN is not set, API requests are not authenticated");
    }

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ControlError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ControlError::ServerError(e.to_string()))
    });

    Ok(handle)
}
