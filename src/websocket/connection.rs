use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth;
use crate::fabric::{GroupEvent, LOBBY_GROUP};
use crate::lobby;
use crate::protocol::{
    close_codes, normalize_room_code, ClientMessage, ServerMessage, UserId,
};

use super::AppState;

/// Queue depth per socket. Full queues shed group events rather than block
/// the fabric.
const DELIVERY_QUEUE_CAPACITY: usize = 64;

async fn close_with(socket: &mut WebSocket, code: u16, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: reason.to_string().into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

async fn send_envelope(
    sink: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).map_err(axum::Error::new)?;
    sink.send(Message::Text(text.into())).await
}

async fn close_sink(sink: &mut SplitSink<WebSocket, Message>, code: u16, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: reason.to_string().into(),
    };
    let _ = sink.send(Message::Close(Some(frame))).await;
}

/// Admission and lifetime of one room socket.
pub(super) async fn handle_room_socket(
    mut socket: WebSocket,
    state: Arc<AppState>,
    raw_code: String,
    cookie: Option<String>,
) {
    let auth_cfg = &state.config.auth;
    let identity = match auth::identity_from_cookie_header(
        cookie.as_deref(),
        &auth_cfg.access_cookie,
        &auth_cfg.token_secret,
    ) {
        Ok(identity) => identity,
        Err(err) => {
            tracing::debug!(%err, "room socket rejected: unauthenticated");
            close_with(&mut socket, close_codes::UNAUTHENTICATED, "unauthenticated").await;
            return;
        }
    };

    let engine = Arc::clone(&state.engine);
    let gateway = Arc::clone(engine.gateway());

    let Some(code) = normalize_room_code(&raw_code) else {
        close_with(&mut socket, close_codes::ROOM_NOT_FOUND, "room not found").await;
        return;
    };
    let Some(room) = gateway.get_active_room(&code).await.ok().flatten() else {
        close_with(&mut socket, close_codes::ROOM_NOT_FOUND, "room not found").await;
        return;
    };

    let user_id = identity.user_id;
    if !gateway.is_user_allowed(user_id).await.unwrap_or(false) {
        close_with(&mut socket, close_codes::FORBIDDEN, "forbidden").await;
        return;
    }
    let session_ok = gateway
        .active_session_id(user_id)
        .await
        .ok()
        .flatten()
        .is_some_and(|active| active == identity.session_id);
    if !session_ok {
        close_with(&mut socket, close_codes::FORBIDDEN, "stale session").await;
        return;
    }
    if !gateway.is_member_active(room.id, user_id).await.unwrap_or(false) {
        close_with(&mut socket, close_codes::FORBIDDEN, "not a member").await;
        return;
    }
    let Some(user) = gateway.get_public_user(user_id).await.ok().flatten() else {
        close_with(&mut socket, close_codes::FORBIDDEN, "forbidden").await;
        return;
    };

    let conn = Uuid::new_v4();
    let (tx, rx) = mpsc::channel::<GroupEvent>(DELIVERY_QUEUE_CAPACITY);

    if let Err(err) = engine.admit(&room, &user, conn, tx.clone()).await {
        tracing::warn!(%code, user_id, %err, "admission aborted");
        close_with(&mut socket, close_codes::ROOM_NOT_FOUND, "room busy").await;
        return;
    }

    // Snapshot + replay go to this socket only, ahead of any group traffic
    // the send loop drains afterwards.
    for payload in engine.welcome_payloads(&code, user_id).await {
        let _ = tx.send(GroupEvent::message(payload)).await;
    }

    engine.maybe_start_game(&room).await;

    let (sink, stream) = socket.split();

    let send_task = tokio::spawn(run_send_loop(sink, rx, user_id));

    let recv_engine = Arc::clone(&engine);
    let recv_room = room.clone();
    let recv_user = user.clone();
    let recv_task = tokio::spawn(async move {
        run_receive_loop(stream, recv_engine, recv_room, recv_user).await;
    });

    // Either side finishing tears the connection down.
    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    engine.handle_disconnect(&room, user_id, conn).await;
    tracing::info!(%code, user_id, %conn, "room socket closed");
}

/// Drain the delivery queue onto the wire, obeying targeted events and
/// disconnect commands.
async fn run_send_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<GroupEvent>,
    user_id: UserId,
) {
    while let Some(event) = rx.recv().await {
        match event {
            GroupEvent::Message(message) => {
                if send_envelope(&mut sink, &message).await.is_err() {
                    break;
                }
                if matches!(*message, ServerMessage::AdminClose { .. }) {
                    close_sink(&mut sink, close_codes::ADMIN_CLOSED, "room closed").await;
                    break;
                }
            }
            GroupEvent::ToUser {
                user_id: target,
                message,
            } => {
                if target == user_id && send_envelope(&mut sink, &message).await.is_err() {
                    break;
                }
            }
            GroupEvent::DisconnectUser {
                user_id: target,
                close_code,
            } => {
                if target == user_id {
                    close_sink(&mut sink, close_code, "disconnected").await;
                    break;
                }
            }
        }
    }
}

/// Parse inbound frames and feed them to the engine. Malformed or unknown
/// frames are dropped.
async fn run_receive_loop(
    mut stream: SplitStream<WebSocket>,
    engine: Arc<crate::engine::RoomEngine>,
    room: crate::db::Room,
    user: crate::protocol::PublicUser,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => engine.handle_message(&room, &user, message).await,
                Err(err) => {
                    tracing::debug!(user_id = user.id, %err, "dropping unparseable frame");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(user_id = user.id, %err, "socket read error");
                break;
            }
        }
    }
}

/// Admission and lifetime of one lobby socket: authenticate, join the
/// snapshot group, answer pings.
pub(super) async fn handle_lobby_socket(
    mut socket: WebSocket,
    state: Arc<AppState>,
    cookie: Option<String>,
) {
    let auth_cfg = &state.config.auth;
    if auth::identity_from_cookie_header(
        cookie.as_deref(),
        &auth_cfg.access_cookie,
        &auth_cfg.token_secret,
    )
    .is_err()
    {
        close_with(&mut socket, close_codes::UNAUTHENTICATED, "unauthenticated").await;
        return;
    }

    let engine = Arc::clone(&state.engine);
    let fabric = Arc::clone(engine.fabric());
    let conn = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<GroupEvent>(DELIVERY_QUEUE_CAPACITY);
    fabric.join_group(LOBBY_GROUP, conn, tx.clone());

    // First snapshot straight away; updates arrive via the group.
    let snapshot = lobby::snapshot_message(engine.gateway().as_ref()).await;
    let _ = tx.send(GroupEvent::message(snapshot)).await;

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(GroupEvent::Message(message)) => {
                        if send_envelope(&mut sink, &message).await.is_err() {
                            break;
                        }
                    }
                    Some(_) => {}
                    None => break,
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if matches!(
                            serde_json::from_str::<ClientMessage>(&text),
                            Ok(ClientMessage::Ping)
                        ) {
                            let _ = tx.send(GroupEvent::message(ServerMessage::Pong)).await;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    fabric.leave_group(LOBBY_GROUP, conn);
}
