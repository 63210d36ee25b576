use crate::api::AppState;
use crate::api::schemas::chat::ChatParams;
use crate::error::AppError;
use axum::{
    extract::{Query, State, ws::WebSocketUpgrade},
    http::Extensions,
    response::{IntoResponse, Response},
};
use tower_http::request_id::RequestId;

/// Upgrades `/chat` to a WebSocket session. A `token` query parameter binds
/// the connection to the user it was issued for.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ChatParams>,
    extensions: Extensions,
    State(state): State<AppState>,
) -> Response {
    let request_id = extensions
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .map_or_else(|| "unknown".to_string(), ToString::to_string);

    let identity = match params.token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => match state.auth_service.verify_token(token) {
            Ok(username) => Some(username),
            Err(e) => {
                tracing::warn!(error = %e, "WebSocket handshake failed: invalid token");
                return AppError::Unauthorized.into_response();
            }
        },
        None if state.config.chat.require_token => {
            tracing::warn!("WebSocket handshake failed: token required");
            return AppError::Unauthorized.into_response();
        }
        None => None,
    };

    let gateway = state.gateway_service.clone();
    let shutdown_rx = state.shutdown_rx.clone();
    ws.on_upgrade(move |socket| async move {
        gateway.handle_socket(socket, identity, request_id, shutdown_rx).await;
    })
}
