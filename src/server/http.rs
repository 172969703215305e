//! Inbound HTTP surface
//!
//! A small axum router exposing the routing table:
//!
//! - `GET /healthz` - liveness probe
//! - `GET /tools` - caller-facing definitions of the active tools
//! - `POST /tools/{name}` - invoke a tool
//! - `POST /auth/revoke` - delete stored credentials for an identity
//!
//! Tool invocations carry an optional `identity` alongside the tool
//! arguments; omitting it is only valid in single-identity mode. Failures
//! map onto HTTP statuses: unknown tool is 404, credential problems are
//! 401 or 403, everything else is 500.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::auth::AuthManager;
use crate::error::{AuthError, ToolgateError};
use crate::server::RoutingTable;

/// Shared state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Credential resolution entry point
    pub auth: Arc<AuthManager>,
    /// The instance's immutable routing table
    pub table: Arc<RoutingTable>,
}

/// Body of a `POST /tools/{name}` request.
#[derive(Debug, Deserialize)]
pub struct ToolCallRequest {
    /// Identity to act as; optional only in single-identity mode
    #[serde(default)]
    pub identity: Option<String>,
    /// Tool arguments, passed to the handler unmodified
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Body of a `POST /auth/revoke` request.
#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    /// Identity whose stored credentials should be deleted
    pub identity: String,
}

/// Builds the router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/tools", get(list_tools))
        .route("/tools/:name", post(call_tool))
        .route("/auth/revoke", post(revoke))
        .with_state(state)
}

/// Binds the listener and serves until the process exits.
///
/// # Errors
///
/// Returns error when the port cannot be bound.
pub async fn serve(state: AppState, port: u16) -> crate::error::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port = listener.local_addr()?.port(), "listening for tool calls");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_tools(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "tools": state.table.definitions() }))
}

async fn call_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<ToolCallRequest>,
) -> Response {
    match state
        .table
        .dispatch(&state.auth, request.identity.as_deref(), &name, request.args)
        .await
    {
        Ok(result) => (StatusCode::OK, Json(json!(result))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn revoke(
    State(state): State<AppState>,
    Json(request): Json<RevokeRequest>,
) -> Response {
    match state.auth.revoke(&request.identity) {
        Ok(deleted) => (StatusCode::OK, Json(json!({ "revoked": deleted }))).into_response(),
        Err(e) => error_response(e.into()),
    }
}

/// Maps a dispatch failure onto an HTTP status and a JSON error body.
fn error_response(e: anyhow::Error) -> Response {
    let status = match e.downcast_ref::<ToolgateError>() {
        Some(ToolgateError::UnknownTool(_)) => StatusCode::NOT_FOUND,
        Some(ToolgateError::Auth(auth)) => match auth {
            AuthError::InsufficientScope { .. } => StatusCode::FORBIDDEN,
            AuthError::IdentityAmbiguous { .. } => StatusCode::CONFLICT,
            AuthError::NoCredentials { .. }
            | AuthError::ExpiredCredentials { .. }
            | AuthError::InvalidGrant { .. } => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
        Some(ToolgateError::Provider(_)) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("tool call failed: {e:#}");
    }
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anyhow_of(e: ToolgateError) -> anyhow::Error {
        e.into()
    }

    #[test]
    fn test_unknown_tool_maps_to_404() {
        let resp = error_response(anyhow_of(ToolgateError::UnknownTool("x".to_string())));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_insufficient_scope_maps_to_403() {
        let resp = error_response(anyhow_of(ToolgateError::Auth(AuthError::InsufficientScope {
            identity: "a@x.com".to_string(),
            required: vec!["write".to_string()],
            granted: vec!["read".to_string()],
        })));
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_no_credentials_maps_to_401() {
        let resp = error_response(anyhow_of(ToolgateError::Auth(AuthError::NoCredentials {
            identity: "a@x.com".to_string(),
        })));
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_identity_ambiguous_maps_to_409() {
        let resp = error_response(anyhow_of(ToolgateError::Auth(AuthError::IdentityAmbiguous {
            count: 2,
        })));
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_provider_error_maps_to_502() {
        let resp = error_response(anyhow_of(ToolgateError::Provider("500 from upstream".to_string())));
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_other_errors_map_to_500() {
        let resp = error_response(anyhow::anyhow!("unexpected"));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
