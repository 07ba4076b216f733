//! Wire protocol for room and lobby sockets.
//!
//! Every frame is a flat JSON record with a `type` discriminator
//! (`{"type": "chat", "message": "..."}`). Unknown inbound types fail to
//! parse and are dropped by the connection loop.

pub mod close_codes;
pub mod messages;
pub mod room_codes;
pub mod types;

pub use messages::{ClientMessage, GameStatePayload, ServerMessage};

pub use types::{GameStatus, LobbyRoom, PublicUser, RoundEndReason, Scores, UserId};

pub use room_codes::normalize_room_code;
