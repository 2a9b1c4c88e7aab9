//! Kiosk-facing HTTP boundary
//!
//! Thin axum layer over the dispenser: scan-and-redirect for the kiosk QR,
//! token status for the scratch page, redemption for the barista's verify
//! QR, and a health probe. Static assets, QR rendering, and dashboards live
//! outside this service.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::dispenser::{AllocationOutcome, Dispenser};
use crate::error::DispenserError;
use crate::store::RedeemOutcome;

/// Shared handler state
pub struct AppState {
    pub dispenser: Dispenser,
    pub server: ServerConfig,
}

/// Build the service router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/scan", get(scan))
        .route("/api/token/:token", get(token_status))
        .route("/api/token/:token/redeem", post(redeem))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until shutdown
pub async fn run(state: Arc<AppState>) -> std::io::Result<()> {
    let addr = format!("{}:{}", state.server.host, state.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "kiosk endpoint listening");

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

impl IntoResponse for DispenserError {
    fn into_response(self) -> Response {
        let status = match &self {
            DispenserError::Storage { .. } | DispenserError::Configuration { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            DispenserError::InvalidTokenId(_) | DispenserError::InvalidBatch { .. } => {
                StatusCode::BAD_REQUEST
            }
        };

        // Storage details stay in the logs, not on the wire
        let body = if status.is_server_error() {
            error!(error = %self, "request failed");
            json!({ "ok": false, "error": "server_error" })
        } else {
            json!({ "ok": false, "error": self.to_string() })
        };

        (status, Json(body)).into_response()
    }
}

/// Caller identity for the daily scan limit: first X-Forwarded-For hop when
/// deployed behind a proxy, else the peer address
fn client_identity(headers: &HeaderMap, addr: &SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|first| first.trim().to_string())
        .filter(|first| !first.is_empty())
        .unwrap_or_else(|| addr.ip().to_string())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn scan(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let identity = client_identity(&headers, &addr);

    match state.dispenser.allocate(&identity).await {
        Ok(AllocationOutcome::Allocated(token)) => {
            let target = format!("{}?token={}", state.server.redirect_path, token);
            Redirect::temporary(&target).into_response()
        }
        Ok(AllocationOutcome::Exhausted) => (
            StatusCode::GONE,
            "No tokens available. Please try again later.",
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn token_status(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Response {
    match state.dispenser.token_status(&token).await {
        Ok(status) => Json(status).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn redeem(State(state): State<Arc<AppState>>, Path(token): Path<String>) -> Response {
    match state.dispenser.redeem_token(&token).await {
        Ok(RedeemOutcome::Redeemed {
            outcome,
            redeemed_at,
        }) => Json(json!({
            "ok": true,
            "result": outcome.as_str(),
            "redeemedAt": redeemed_at,
        }))
        .into_response(),
        Ok(RedeemOutcome::AlreadyRedeemed { redeemed_at }) => (
            StatusCode::CONFLICT,
            Json(json!({
                "ok": false,
                "error": "already_redeemed",
                "redeemedAt": redeemed_at,
            })),
        )
            .into_response(),
        Ok(RedeemOutcome::NotFound) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "ok": false, "error": "not_found" })),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
