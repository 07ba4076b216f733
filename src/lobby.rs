//! Lobby snapshots: the room listing shipped to `/ws/lobby/` sockets.
//!
//! The engine pushes a fresh snapshot through the reserved broadcast group
//! whenever presence or room visibility changes; the lobby endpoint also
//! sends one directly to each socket on connect.

use crate::db::PersistenceGateway;
use crate::protocol::ServerMessage;

/// Build the `rooms_list` envelope from the current room table. Storage
/// failures degrade to an empty listing rather than an error frame.
pub async fn snapshot_message(gateway: &dyn PersistenceGateway) -> ServerMessage {
    let rooms = gateway.rooms_snapshot().await.unwrap_or_default();
    ServerMessage::RoomsList { rooms }
}
