//! Frames exchanged over the `/ws` socket.
//!
//! Both directions are closed unions discriminated by `type`, so anything the
//! handlers see has already been validated at the boundary. Field names are
//! camelCase on the wire.

use serde::{Deserialize, Serialize};

use crate::message::{DirectMessage, MessageRequest};
use crate::stream::{ChatMessage, GiftEvent};
use crate::user::UserSnapshot;

// Frame type names, shared with logging.
pub const JOIN_STREAM: &str = "join_stream";
pub const LEAVE_STREAM: &str = "leave_stream";
pub const CHAT_MESSAGE: &str = "chat_message";
pub const VIEWER_COUNT_UPDATE: &str = "viewer_count_update";
pub const GIFT_SENT: &str = "gift_sent";
pub const STREAM_ENDED: &str = "stream_ended";
pub const STREAM_ERROR: &str = "stream_error";
pub const DIRECT_MESSAGE: &str = "direct_message";
pub const MESSAGE_REQUEST: &str = "message_request";

/// Client -> server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    JoinStream {
        #[serde(with = "crate::id")]
        stream_id: i64,
        /// Ignored when the socket authenticated with a session token.
        #[serde(default, with = "crate::id::option")]
        user_id: Option<i64>,
    },
    LeaveStream,
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        text: String,
        #[serde(default)]
        user: Option<UserSnapshot>,
    },
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::JoinStream { .. } => JOIN_STREAM,
            ClientMessage::LeaveStream => LEAVE_STREAM,
            ClientMessage::ChatMessage { .. } => CHAT_MESSAGE,
        }
    }
}

/// Server -> client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    ViewerCountUpdate {
        #[serde(with = "crate::id")]
        stream_id: i64,
        count: usize,
    },
    ChatMessage {
        message: ChatMessage,
        user: UserSnapshot,
    },
    GiftSent {
        gift: GiftEvent,
        sender: UserSnapshot,
    },
    #[serde(rename_all = "camelCase")]
    StreamEnded {
        #[serde(with = "crate::id")]
        stream_id: i64,
    },
    #[serde(rename_all = "camelCase")]
    StreamError {
        #[serde(with = "crate::id")]
        stream_id: i64,
        message: String,
    },
    DirectMessage {
        message: DirectMessage,
    },
    MessageRequest {
        request: MessageRequest,
    },
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::ViewerCountUpdate { .. } => VIEWER_COUNT_UPDATE,
            ServerMessage::ChatMessage { .. } => CHAT_MESSAGE,
            ServerMessage::GiftSent { .. } => GIFT_SENT,
            ServerMessage::StreamEnded { .. } => STREAM_ENDED,
            ServerMessage::StreamError { .. } => STREAM_ERROR,
            ServerMessage::DirectMessage { .. } => DIRECT_MESSAGE,
            ServerMessage::MessageRequest { .. } => MESSAGE_REQUEST,
        }
    }
}
