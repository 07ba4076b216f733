use serde::{Deserialize, Serialize};

use super::types::{GameStatus, LobbyRoom, PublicUser, RoundEndReason, Scores, UserId};

fn default_true() -> bool {
    true
}

/// Frames accepted from room-socket clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Stroke data relayed verbatim to the room. Only honored from the drawer.
    Draw { payload: serde_json::Value },
    /// Chat text; doubles as a guess while a round is running.
    Chat {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },
    /// Wipe the canvas. Only honored from the drawer.
    Clear,
    /// Begin a game from the waiting or finished state.
    StartGame,
    /// Open a kick vote against another player.
    KickRequest { target_id: UserId },
    /// Cast a ballot in the vote currently open against `target_id`.
    KickVote {
        target_id: UserId,
        #[serde(default = "default_true")]
        approve: bool,
    },
    /// Leave the room for good (distinct from a socket drop, which gets grace).
    Leave,
    /// Heartbeat; answered with `pong`.
    Ping,
}

/// Snapshot of a room's game sent to a freshly admitted socket.
///
/// The word-related fields are present only while a round is running; the
/// plaintext word never rides on this envelope (the drawer gets a separate
/// `round_secret`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStatePayload {
    pub status: GameStatus,
    pub round: u32,
    pub max_rounds: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drawer_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub masked_word: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds_left: Option<u64>,
    pub scores: Scores,
}

/// Frames sent to room and lobby clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Active member roster, in join order.
    Presence { members: Vec<PublicUser> },
    /// Current game snapshot for a newly admitted socket.
    GameState(GameStatePayload),
    /// A round began.
    RoundStart {
        round: u32,
        max_rounds: u32,
        drawer_id: UserId,
        masked_word: String,
        duration: u64,
        scores: Scores,
    },
    /// Plaintext word, delivered to the drawer only.
    RoundSecret { word: String },
    /// One-second countdown tick.
    Timer { seconds_left: u64 },
    /// Masked word after a scheduled letter reveal.
    Hint { masked_word: String },
    /// Stroke data from the drawer.
    Draw {
        payload: serde_json::Value,
        user: PublicUser,
    },
    /// Canvas wipe. `user` is absent for the automatic wipe at round start.
    Clear {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<PublicUser>,
    },
    /// Chat line. `user` is absent and `system` true for server notices.
    Chat {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<PublicUser>,
        system: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },
    /// Sender-only rejection: the drawer may not chat mid-round.
    ChatBlocked {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },
    /// Sender-only rejection: rate limit penalty in effect.
    ChatCooldown {
        seconds: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },
    /// Someone guessed the word.
    GuessCorrect {
        user: PublicUser,
        points: i64,
        scores: Scores,
    },
    /// Round finished; scores are the post-round totals.
    RoundEnd {
        word: String,
        scores: Scores,
        next_round_in: u64,
        reason: RoundEndReason,
    },
    /// Round halted because the room dropped below two players.
    RoundPaused { message: String },
    /// All rounds played.
    GameOver { scores: Scores },
    /// A kick vote opened.
    KickRequest {
        target_id: UserId,
        requester_id: UserId,
        votes: u32,
        required: u32,
    },
    /// Tally changed on the open kick vote.
    KickUpdate {
        target_id: UserId,
        votes: u32,
        required: u32,
        responded: u32,
        eligible: u32,
    },
    /// The open kick vote ended without a kick.
    KickCancel { target_id: UserId, reason: String },
    /// Target-only notice that the vote passed; the close follows.
    Kicked { reason: String },
    /// Room closed by an administrator; socket closes with 4500.
    AdminClose { message: String },
    /// Free-form server notice.
    System { message: String },
    /// Chat and canvas replay for a newly admitted socket.
    History {
        chat: Vec<serde_json::Value>,
        draw: Vec<serde_json::Value>,
    },
    /// Heartbeat reply.
    Pong,
    /// Operator feedback for a recoverable application error.
    Error { message: String },
    /// Lobby room listing, newest room first.
    RoomsList { rooms: Vec<LobbyRoom> },
}
