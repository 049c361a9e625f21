//! Liveness endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::domain::Network;

/// One enabled network.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkHealth {
    /// Network name.
    pub network: Network,
    /// Anchor account serving it.
    pub anchor_address: String,
}

/// Liveness report.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `healthy` when the process answers.
    pub status: &'static str,
    /// Server time.
    pub timestamp: DateTime<Utc>,
    /// Crate version.
    pub version: &'static str,
    /// Enabled networks and their anchors.
    pub networks: Vec<NetworkHealth>,
    /// Connected live-feed clients.
    pub feed_subscribers: usize,
}

/// `GET /health`
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Reports version, enabled networks with their anchor accounts, and live-feed client count. Does not contact the ledger.",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let networks = state
        .networks
        .networks()
        .into_iter()
        .filter_map(|network| {
            let ctx = state.networks.get(network).ok()?;
            Some(NetworkHealth {
                network,
                anchor_address: ctx.address().to_string(),
            })
        })
        .collect();
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
        networks,
        feed_subscribers: state.event_bus.receiver_count(),
    })
}

/// Routes mounted outside `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}
