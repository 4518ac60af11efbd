mod handler;
mod session;

pub use handler::handle_client_message;
pub use session::Session;

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use lumen_core::AppState;
use serde::Deserialize;

pub fn gateway_router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

#[derive(Debug, Default, Deserialize)]
struct ConnectParams {
    token: Option<String>,
}

/// Anonymous sockets are allowed; a `token` that does not resolve to a
/// session is refused before the upgrade.
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    let user = match params.token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => match state.sessions.get_session_by_token(token) {
            Some(user) => Some(user),
            None => return (StatusCode::UNAUTHORIZED, "invalid or expired token").into_response(),
        },
        None => None,
    };
    ws.on_upgrade(move |socket| handler::handle_connection(socket, state, user))
}
