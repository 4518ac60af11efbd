use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use lumen_core::{connections, AppState};
use lumen_models::gateway::ClientMessage;
use lumen_models::user::UserSnapshot;
use tokio::sync::mpsc;
use tokio::time::Duration;
use uuid::Uuid;

use crate::session::Session;

const PING_INTERVAL: Duration = Duration::from_secs(20);
const CLOSE_GOING_AWAY: u16 = 1001;

pub(crate) async fn handle_connection(socket: WebSocket, state: AppState, user: Option<UserSnapshot>) {
    let connection_id = Uuid::new_v4();
    let (tx, mut outbound) = mpsc::unbounded_channel();
    state
        .connections
        .register(connection_id, tx, user.as_ref().map(|u| u.id));
    if let Some(user) = &user {
        state.presence.touch(user.id);
    }

    let mut session = Session::new(connection_id, user, state.config.chat_messages_per_minute);
    tracing::debug!(
        connection_id = %connection_id,
        user_id = ?session.user_id(),
        "socket opened"
    );

    let (mut sender, mut receiver) = socket.split();
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ping_interval.tick().await; // skip immediate first tick
    let shutdown = state.shutdown.clone();

    let reason = loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(frame) => handle_client_message(&state, &mut session, frame).await,
                            Err(e) => tracing::debug!(
                                connection_id = %connection_id,
                                "dropping unparseable frame: {e}"
                            ),
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::debug!(connection_id = %connection_id, "dropping binary frame");
                    }
                    Some(Ok(Message::Close(_))) => break "client closed",
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %connection_id, "websocket receive error: {e}");
                        break "receive error";
                    }
                    None => break "stream ended",
                }
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    break "outbound queue closed";
                };
                if sender.send(Message::Text(String::from(&*frame).into())).await.is_err() {
                    break "send error";
                }
            }
            _ = ping_interval.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break "ping send error";
                }
            }
            () = shutdown.notified() => {
                let _ = sender
                    .send(Message::Close(Some(CloseFrame {
                        code: CLOSE_GOING_AWAY,
                        reason: "server shutting down".into(),
                    })))
                    .await;
                break "server shutdown";
            }
        }
    };

    connections::disconnect(&state, &connection_id).await;
    tracing::debug!(connection_id = %connection_id, reason, "socket closed");
}

/// Apply one client frame. Frames that make no sense in the socket's current
/// state are dropped; the socket stays open.
pub async fn handle_client_message(state: &AppState, session: &mut Session, frame: ClientMessage) {
    let connection_id = session.connection_id;
    let kind = frame.kind();
    match frame {
        ClientMessage::JoinStream { stream_id, user_id } => {
            // An authenticated socket never speaks for someone else.
            let Some(user_id) = session.user_id().or(user_id) else {
                tracing::debug!(connection_id = %connection_id, kind, "join without a user dropped");
                return;
            };
            if let Err(e) = connections::join_stream(state, &connection_id, user_id, stream_id).await {
                tracing::debug!(connection_id = %connection_id, stream_id, "join refused: {e}");
            }
        }
        ClientMessage::LeaveStream => {
            connections::leave_stream(state, &connection_id).await;
        }
        ClientMessage::ChatMessage { text, .. } => {
            if !session.allow_chat() {
                tracing::debug!(connection_id = %connection_id, "chat rate limited (silent drop)");
                return;
            }
            if let Some(user_id) = session.user_id() {
                state.presence.touch(user_id);
            }
            if let Err(e) = connections::chat_message(state, &connection_id, &text).await {
                tracing::debug!(connection_id = %connection_id, kind, "chat dropped: {e}");
            }
        }
    }
}
