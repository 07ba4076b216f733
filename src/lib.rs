#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::too_many_lines
)]

//! # Sketch Party Server
//!
//! Real-time multiplayer drawing-and-guessing rooms over WebSockets.
//!
//! One player draws a secret word while everyone else races to guess it in
//! chat. The server mediates every state transition: drawer rotation, word
//! masking, scoring, hint reveals, kick votes, disconnect grace, and the
//! distributed locking that lets several instances share authority over a
//! room through a common key-value store.

/// Cookie bearer-token verification
pub mod auth;

/// Server configuration and environment variables
pub mod config;

/// Room and member rows behind the persistence gateway
pub mod db;

/// Broadcast fabric: named groups with per-connection queues
pub mod fabric;

/// The room engine: rounds, chat, moderation, presence
pub mod engine;

/// Typed key-value store operations
pub mod kv;

/// Lobby room-list snapshots
pub mod lobby;

/// Structured logging configuration
pub mod logging;

/// WebSocket message protocol definitions
pub mod protocol;

/// Game state serialization, locking, and timer ownership
pub mod state;

/// WebSocket endpoints and connection handling
pub mod websocket;

/// The drawing dictionary and word masking
pub mod words;
