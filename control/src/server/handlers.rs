//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::{ControlError, ErrorKind};
use crate::remote::{ConnectionRequest, DeployRequest};
use crate::server::state::ServerState;
use crate::stack::{self, ServiceAction};
use crate::utils::version_info;

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Maps a [`ControlError`] to a JSON error response
#[derive(Debug)]
pub struct ApiError(pub ControlError);

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        ApiError(err)
    }
}

impl From<crate::errors::RunError> for ApiError {
    fn from(err: crate::errors::RunError) -> Self {
        ApiError(err.into())
    }
}

/// Malformed request bodies get the same `{error}` shape as validation failures
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(ControlError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Connection => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "stackctl".to_string(),
        version: version.version,
    })
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Generic action response
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

/// Container listing handler
pub async fn containers_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ApiError> {
    let containers = stack::list_containers(&state.runner).await.map_err(|e| {
        error!("Error fetching containers: {}", e.friendly_message());
        ApiError(ControlError::Internal(
            "Failed to fetch container status".to_string(),
        ))
    })?;
    Ok(Json(containers))
}

/// Service action request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub service_name: String,
}

/// Start/stop/restart/up a single service
pub async fn service_handler(
    State(state): State<Arc<ServerState>>,
    Path(action): Path<String>,
    body: Result<Json<ServiceRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let action: ServiceAction = action.parse()?;
    let Json(body) = body?;
    stack::service_action(&state.runner, action, &body.service_name)
        .await
        .inspect_err(|e| {
            error!("Error performing {} on {}: {}", action.as_str(), body.service_name, e)
        })?;

    Ok(Json(ActionResponse {
        success: true,
        message: format!(
            "Service {} {} successfully",
            body.service_name.trim(),
            action.past_tense()
        ),
    }))
}

/// Pull, recreate and prune
pub async fn update_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ApiError> {
    stack::update_stack(&state.runner).await?;
    Ok(Json(ActionResponse {
        success: true,
        message: "System updated successfully".to_string(),
    }))
}

/// Restart the whole stack
pub async fn restart_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ApiError> {
    stack::restart_stack(&state.runner).await?;
    Ok(Json(ActionResponse {
        success: true,
        message: "System restarted successfully".to_string(),
    }))
}

/// Health snapshot derived from container states
pub async fn health_snapshot_handler(State(state): State<Arc<ServerState>>) -> Response {
    match stack::list_containers(&state.runner).await {
        Ok(containers) => Json(stack::health_snapshot(&containers)).into_response(),
        Err(e) => {
            error!("[health-snapshot] Failed to gather docker status: {}", e.friendly_message());
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "healthy": false,
                    "summary": "Unable to fetch container status",
                    "issues": [],
                    "suggestions": [],
                    "containerCount": 0,
                    "runningCount": 0,
                    "error": e.friendly_message(),
                })),
            )
                .into_response()
        }
    }
}

/// Remote deployment handler
pub async fn remote_deploy_handler(
    State(state): State<Arc<ServerState>>,
    request: Result<Json<DeployRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = request?;
    let report = state.orchestrator.deploy(request).await?;
    Ok(Json(report))
}

/// Remote connection test handler
pub async fn remote_test_handler(
    State(state): State<Arc<ServerState>>,
    request: Result<Json<ConnectionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = request?;
    let report = state.orchestrator.test_connection(request).await?;
    let status = if report.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    Ok((status, Json(report)).into_response())
}
