//! WebSocket endpoints: per-room game sockets and the lobby feed.

mod connection;
mod handler;
mod routes;

pub use handler::{lobby_socket_handler, room_socket_handler};
pub use routes::create_router;

use std::sync::Arc;

use crate::config::Config;
use crate::engine::RoomEngine;

/// Shared state handed to every socket handler.
pub struct AppState {
    pub engine: Arc<RoomEngine>,
    pub config: Arc<Config>,
}
