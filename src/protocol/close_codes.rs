//! WebSocket close codes used by the room and lobby endpoints.
//!
//! The 44xx range mirrors HTTP semantics; 4003 is the legacy code carried by
//! the in-group disconnect command sent when a player is voted out.

/// No usable bearer token in the handshake.
pub const UNAUTHENTICATED: u16 = 4401;

/// Banned/deleted user, incomplete profile, stale session, or not a member.
/// Also used when a player removes themselves via `leave`.
pub const FORBIDDEN: u16 = 4403;

/// Unknown or inactive room code.
pub const ROOM_NOT_FOUND: u16 = 4404;

/// Room was closed by an administrator.
pub const ADMIN_CLOSED: u16 = 4500;

/// Carried by the `disconnect_user` group command after a kick vote passes.
pub const VOTED_OUT: u16 = 4003;
