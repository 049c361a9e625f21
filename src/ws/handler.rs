//! `GET /ws` upgrade.

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;

use super::connection::run_connection;
use crate::app_state::AppState;

/// Upgrades to the live event feed.
///
/// The receiver is taken before the upgrade completes so no event
/// published during the handshake is missed.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let event_rx = state.event_bus.subscribe();
    let connection_id = uuid::Uuid::new_v4();
    tracing::info!(
        %connection_id,
        subscribers = state.event_bus.receiver_count(),
        "live feed client connected"
    );
    ws.on_upgrade(move |socket| run_connection(socket, event_rx, connection_id))
}
