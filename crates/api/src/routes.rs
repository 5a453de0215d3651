//! HTTP route handlers for the API.

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use leetcrew_agents::{RoleSummary, SolveResponse};
use leetcrew_common::{RequestId, SolverError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::AppState;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub agents: Vec<String>,
}

/// Health check endpoint, also served at `/`.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        message: "Multi-Agent LeetCode Solver API is running",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        agents: state.pipeline.agent_names(),
    })
}

#[derive(Debug, Serialize)]
pub struct AgentsResponse {
    pub agents: Vec<RoleSummary>,
}

/// The roles that staff the pipeline, in stage order.
pub async fn agents(State(state): State<Arc<AppState>>) -> Json<AgentsResponse> {
    Json(AgentsResponse {
        agents: state.pipeline.roster(),
    })
}

/// Solve request body. `problem` is optional here so that a missing field is
/// reported like an empty one.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveRequest {
    #[serde(default)]
    pub problem: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}

fn status_for(error: &SolverError) -> StatusCode {
    match error {
        SolverError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        SolverError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Run the solver pipeline for one problem.
pub async fn solve(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<SolveRequest>, JsonRejection>,
) -> Response {
    let (problem, body_request_id) = match payload {
        Ok(Json(request)) => (request.problem.unwrap_or_default(), request.request_id),
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Unreadable solve request body");
            (String::new(), None)
        }
    };

    let header_request_id = headers
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let request_id = RequestId::from_optional(body_request_id.or(header_request_id));

    info!(request_id = %request_id, event = "solve_request_received", "Received solve request");

    let result = state
        .pipeline
        .run_with_timeout(&problem, Some(request_id.clone()), state.run_timeout)
        .await;

    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => status_for(e),
    };
    let body = SolveResponse::from_result(&problem, &result);

    info!(
        request_id = %request_id,
        status = status.as_u16(),
        event = "solve_request_complete",
        "Solve request finished"
    );

    let mut response = (status, Json(body)).into_response();
    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_mapping() {
        assert_eq!(
            status_for(&SolverError::InvalidInput("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&SolverError::Timeout("x".into())),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&SolverError::StageExecution {
                stage: 1,
                role: "r".into(),
                reason: "x".into()
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn solve_request_fields_are_optional() {
        let req: SolveRequest = serde_json::from_str(r#"{"requestId": "abc"}"#).unwrap();
        assert!(req.problem.is_none());
        assert_eq!(req.request_id.as_deref(), Some("abc"));
    }
}
