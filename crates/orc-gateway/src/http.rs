//! HTTP transport (SPEC_FULL.md §6): a single `POST /rpc` JSON-RPC endpoint
//! plus `GET /health`, grounded on `agenticlaw-gateway::server::start_gateway`'s
//! axum Router/CORS pattern (simplified: no WebSocket, no chat console).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::rpc::{dispatch, to_response};
use crate::state::AppState;
use orc_core::protocol::RpcRequest;

pub async fn serve(state: Arc<AppState>, bind_host: &str, bind_port: u16) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/rpc", post(rpc_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state);

    let bind_addr: SocketAddr = format!("{bind_host}:{bind_port}").parse()?;
    info!("orchestratord gateway listening on {bind_addr}");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

async fn rpc_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RpcRequest>,
) -> impl IntoResponse {
    if !state.auth.verify(bearer_token(&headers)) {
        return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({ "error": "unauthorized" })))
            .into_response();
    }

    let result = dispatch(&req.method, req.params, &state).await;
    Json(to_response(req.id, result)).into_response()
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "instances": state.registry.active_count(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_strips_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Bearer secret123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("secret123"));
    }

    #[test]
    fn bearer_token_none_when_header_missing() {
        let headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn bearer_token_none_when_scheme_is_not_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Basic dXNlcjpwYXNz".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }
}
