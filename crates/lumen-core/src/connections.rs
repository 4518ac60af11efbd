//! Registry of open sockets and the stream fan-out built on top of it.
//!
//! Each socket task owns the receiving half of an unbounded queue; the
//! registry keeps the sending half. A stream index (`stream_id -> set of
//! connections`) is kept in step with membership so fan-out only walks the
//! room. Every send happens under the registry lock, which gives all
//! broadcasts one global order.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use lumen_models::gateway::ServerMessage;
use lumen_models::stream::ChatMessage;
use lumen_models::user::UserSnapshot;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::CoreError;
use crate::AppState;

pub type ConnectionId = Uuid;

/// Serialized frame queued for a socket.
pub type Frame = Arc<str>;
pub type FrameSender = mpsc::UnboundedSender<Frame>;
pub type FrameReceiver = mpsc::UnboundedReceiver<Frame>;

struct Connection {
    tx: FrameSender,
    /// Session-verified owner; the only id that reaches the user index.
    user_id: Option<i64>,
    /// Who the socket speaks as inside its stream. Anonymous sockets get
    /// this from `join_stream` and nothing else.
    viewer_id: Option<i64>,
    stream_id: Option<i64>,
}

impl Connection {
    fn speaker(&self) -> Option<i64> {
        self.user_id.or(self.viewer_id)
    }
}

impl Connection {
    fn deliver(&self, id: &ConnectionId, frame: &Frame) -> bool {
        if self.tx.is_closed() {
            return false;
        }
        match self.tx.send(frame.clone()) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!(connection_id = %id, "send to closed socket skipped");
                false
            }
        }
    }
}

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, Connection>,
    streams: HashMap<i64, HashSet<ConnectionId>>,
    users: HashMap<i64, HashSet<ConnectionId>>,
}

impl Inner {
    fn count(&self, stream_id: i64) -> usize {
        self.streams.get(&stream_id).map_or(0, HashSet::len)
    }

    fn detach_stream(&mut self, id: &ConnectionId) -> Option<i64> {
        let stream_id = self.connections.get_mut(id)?.stream_id.take()?;
        if let Some(members) = self.streams.get_mut(&stream_id) {
            members.remove(id);
            if members.is_empty() {
                self.streams.remove(&stream_id);
            }
        }
        Some(stream_id)
    }

    fn detach_user(&mut self, id: &ConnectionId, user_id: i64) {
        if let Some(conns) = self.users.get_mut(&user_id) {
            conns.remove(id);
            if conns.is_empty() {
                self.users.remove(&user_id);
            }
        }
    }

    fn fan_out<'a>(&self, ids: impl Iterator<Item = &'a ConnectionId>, frame: &Frame) -> usize {
        ids.filter(|id| {
            self.connections
                .get(*id)
                .is_some_and(|conn| conn.deliver(id, frame))
        })
        .count()
    }
}

/// Result of moving a connection into a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Joined {
    pub stream_id: i64,
    /// The stream the connection was in before, if it was a different one.
    pub left: Option<i64>,
}

/// What a closed connection leaves behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    pub user_id: Option<i64>,
    pub stream_id: Option<i64>,
    /// True when this was the user's last open socket.
    pub last_for_user: bool,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<Inner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn register(&self, id: ConnectionId, tx: FrameSender, user_id: Option<i64>) {
        let mut inner = self.lock();
        if let Some(user_id) = user_id {
            inner.users.entry(user_id).or_default().insert(id);
        }
        inner.connections.insert(
            id,
            Connection {
                tx,
                user_id,
                viewer_id: None,
                stream_id: None,
            },
        );
    }

    /// Remove a connection entirely.
    pub fn unregister(&self, id: &ConnectionId) -> Option<Departure> {
        let mut inner = self.lock();
        let stream_id = inner.detach_stream(id);
        let conn = inner.connections.remove(id)?;
        let mut last_for_user = false;
        if let Some(user_id) = conn.user_id {
            inner.detach_user(id, user_id);
            last_for_user = !inner.users.contains_key(&user_id);
        }
        Some(Departure {
            user_id: conn.user_id,
            stream_id,
            last_for_user,
        })
    }

    /// Put the connection in `stream_id`, leaving any previous stream.
    /// `user_id` only names the stream viewer on a socket without a session;
    /// it never enters the user index.
    pub fn join(&self, id: &ConnectionId, user_id: i64, stream_id: i64) -> Option<Joined> {
        let mut inner = self.lock();
        let current = inner.connections.get(id)?;
        if current.stream_id == Some(stream_id) {
            return Some(Joined {
                stream_id,
                left: None,
            });
        }

        let left = inner.detach_stream(id);
        if let Some(conn) = inner.connections.get_mut(id) {
            if conn.user_id.is_none() {
                conn.viewer_id = Some(user_id);
            }
            conn.stream_id = Some(stream_id);
        }
        inner.streams.entry(stream_id).or_default().insert(*id);
        Some(Joined { stream_id, left })
    }

    /// Clear stream membership. Returns the stream that was left.
    pub fn leave(&self, id: &ConnectionId) -> Option<i64> {
        self.lock().detach_stream(id)
    }

    /// Drop every membership of a stream, returning how many were removed.
    pub fn evict_stream(&self, stream_id: i64) -> usize {
        let mut inner = self.lock();
        let members = inner.streams.remove(&stream_id).unwrap_or_default();
        for id in &members {
            if let Some(conn) = inner.connections.get_mut(id) {
                conn.stream_id = None;
            }
        }
        members.len()
    }

    /// `(speaker, stream_id)` of the connection: the session user, or the
    /// viewer id an anonymous socket joined with.
    pub fn membership(&self, id: &ConnectionId) -> Option<(Option<i64>, Option<i64>)> {
        self.lock()
            .connections
            .get(id)
            .map(|c| (c.speaker(), c.stream_id))
    }

    pub fn stream_viewer_count(&self, stream_id: i64) -> usize {
        self.lock().count(stream_id)
    }

    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    pub fn user_connection_count(&self, user_id: i64) -> usize {
        self.lock().users.get(&user_id).map_or(0, HashSet::len)
    }

    /// Serialize once and deliver to every open socket in the stream.
    pub fn broadcast_to_stream(&self, stream_id: i64, message: &ServerMessage) -> usize {
        let Some(frame) = encode(message) else {
            return 0;
        };
        let inner = self.lock();
        match inner.streams.get(&stream_id) {
            Some(members) => inner.fan_out(members.iter(), &frame),
            None => 0,
        }
    }

    /// Deliver to every open socket owned by the user.
    pub fn broadcast_to_user(&self, user_id: i64, message: &ServerMessage) -> usize {
        let Some(frame) = encode(message) else {
            return 0;
        };
        let inner = self.lock();
        match inner.users.get(&user_id) {
            Some(conns) => inner.fan_out(conns.iter(), &frame),
            None => 0,
        }
    }

    pub fn send_to(&self, id: &ConnectionId, message: &ServerMessage) -> bool {
        let Some(frame) = encode(message) else {
            return false;
        };
        self.lock()
            .connections
            .get(id)
            .is_some_and(|conn| conn.deliver(id, &frame))
    }

    /// Broadcast the stream's current viewer count, computed under the same
    /// lock as the send. Returns the count.
    pub fn broadcast_viewer_count(&self, stream_id: i64) -> usize {
        let inner = self.lock();
        let count = inner.count(stream_id);
        let message = ServerMessage::ViewerCountUpdate { stream_id, count };
        if let (Some(frame), Some(members)) = (encode(&message), inner.streams.get(&stream_id)) {
            inner.fan_out(members.iter(), &frame);
        }
        count
    }
}

fn encode(message: &ServerMessage) -> Option<Frame> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            tracing::error!(kind = message.kind(), "failed to serialize frame: {e}");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Stream membership with persistence
// ---------------------------------------------------------------------------

async fn publish_viewer_count(state: &AppState, stream_id: i64) {
    let count = state.connections.stream_viewer_count(stream_id);
    if let Err(e) = lumen_db::streams::set_viewer_count(&state.db, stream_id, count as i64).await {
        tracing::warn!(stream_id, "failed to persist viewer count: {e}");
    }
    state.connections.broadcast_viewer_count(stream_id);
}

/// Move a connection into a live stream and announce the new counts.
/// Unknown or ended streams get a `stream_error` frame instead.
pub async fn join_stream(
    state: &AppState,
    connection_id: &ConnectionId,
    user_id: i64,
    stream_id: i64,
) -> Result<usize, CoreError> {
    let live = lumen_db::streams::get_stream(&state.db, stream_id)
        .await?
        .is_some_and(|s| s.is_live);
    if !live {
        state.connections.send_to(
            connection_id,
            &ServerMessage::StreamError {
                stream_id,
                message: "stream not found or no longer live".into(),
            },
        );
        return Err(CoreError::NotFound);
    }

    let joined = state
        .connections
        .join(connection_id, user_id, stream_id)
        .ok_or(CoreError::NotFound)?;
    tracing::debug!(connection_id = %connection_id, user_id, stream_id, "joined stream");

    if let Some(previous) = joined.left {
        publish_viewer_count(state, previous).await;
    }
    publish_viewer_count(state, stream_id).await;
    Ok(state.connections.stream_viewer_count(stream_id))
}

pub async fn leave_stream(state: &AppState, connection_id: &ConnectionId) -> Option<i64> {
    let stream_id = state.connections.leave(connection_id)?;
    tracing::debug!(connection_id = %connection_id, stream_id, "left stream");
    publish_viewer_count(state, stream_id).await;
    Some(stream_id)
}

/// Socket closed: drop the connection, update its stream, and take the user
/// offline if this was their last socket.
pub async fn disconnect(state: &AppState, connection_id: &ConnectionId) -> Option<Departure> {
    let departure = state.connections.unregister(connection_id)?;
    if let Some(stream_id) = departure.stream_id {
        publish_viewer_count(state, stream_id).await;
    }
    if let (Some(user_id), true) = (departure.user_id, departure.last_for_user) {
        if let Err(e) = state.presence.mark_user_offline(user_id).await {
            tracing::warn!(user_id, "failed to mark user offline: {e}");
        }
    }
    Some(departure)
}

/// Persist a chat line for the connection's stream and fan it out.
pub async fn chat_message(
    state: &AppState,
    connection_id: &ConnectionId,
    text: &str,
) -> Result<ChatMessage, CoreError> {
    let (user_id, stream_id) = match state.connections.membership(connection_id) {
        Some((Some(user_id), Some(stream_id))) => (user_id, stream_id),
        Some(_) => return Err(CoreError::BadRequest("join a stream first".into())),
        None => return Err(CoreError::NotFound),
    };

    let text = text.trim();
    if text.is_empty() || text.chars().count() > state.config.max_message_len {
        return Err(CoreError::BadRequest(format!(
            "chat messages must be between 1 and {} characters",
            state.config.max_message_len
        )));
    }

    let user: UserSnapshot = lumen_db::users::get_user_by_id(&state.db, user_id)
        .await?
        .ok_or(CoreError::NotFound)?
        .snapshot();

    let row =
        lumen_db::streams::create_chat_message(&state.db, state.next_id(), stream_id, user_id, text)
            .await?;
    let message: ChatMessage = row.into();

    state.connections.broadcast_to_stream(
        stream_id,
        &ServerMessage::ChatMessage {
            message: message.clone(),
            user,
        },
    );
    Ok(message)
}
