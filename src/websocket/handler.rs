use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use std::sync::Arc;

use super::connection::{handle_lobby_socket, handle_room_socket};
use super::AppState;

fn cookie_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Upgrade handler for `/ws/rooms/{code}/`. Authentication and admission
/// happen on the upgraded socket so rejections can carry application close
/// codes.
pub async fn room_socket_handler(
    ws: WebSocketUpgrade,
    Path(code): Path<String>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let cookie = cookie_header(&headers);
    ws.on_upgrade(move |socket| handle_room_socket(socket, state, code, cookie))
}

/// Upgrade handler for `/ws/lobby/`.
pub async fn lobby_socket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let cookie = cookie_header(&headers);
    ws.on_upgrade(move |socket| handle_lobby_socket(socket, state, cookie))
}
