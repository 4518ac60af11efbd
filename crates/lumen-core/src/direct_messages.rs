//! Direct messages between users.
//!
//! A first message to someone you have no conversation with becomes a
//! pending message request. Once the receiver accepts, the request's
//! initial message opens the conversation and later sends are delivered
//! directly. Blocks in either direction stop everything.

use chrono::Utc;
use lumen_db::direct_messages::NewDirectMessage;
use lumen_db::DbConn;
use lumen_models::gateway::ServerMessage;
use lumen_models::message::{
    ConversationSummary, DirectMessage, MessageRequest, MessageType, RequestAction, RequestStatus,
};

use crate::error::CoreError;
use crate::AppState;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Delivered into an open conversation.
    Delivered(DirectMessage),
    /// No conversation yet; the receiver must accept first.
    RequestCreated(MessageRequest),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestResponse {
    pub request: MessageRequest,
    /// The conversation opened by an accept.
    pub conversation_id: Option<i64>,
    /// The initial message materialized by an accept.
    pub message: Option<DirectMessage>,
}

fn validate_content(state: &AppState, content: &str) -> Result<(), CoreError> {
    let len = content.chars().count();
    if content.trim().is_empty() || len > state.config.max_message_len {
        return Err(CoreError::BadRequest(format!(
            "Content must be between 1 and {} characters",
            state.config.max_message_len
        )));
    }
    Ok(())
}

async fn ensure_user_exists(state: &AppState, user_id: i64) -> Result<(), CoreError> {
    lumen_db::users::get_user_by_id(&state.db, user_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    Ok(())
}

/// Fails if either side has blocked the other. The recipient's block wins.
pub async fn check_blocks(state: &AppState, sender_id: i64, recipient_id: i64) -> Result<(), CoreError> {
    if lumen_db::blocks::is_blocked(&state.db, recipient_id, sender_id).await? {
        return Err(CoreError::BlockedByUser);
    }
    if lumen_db::blocks::is_blocked(&state.db, sender_id, recipient_id).await? {
        return Err(CoreError::UserBlocked);
    }
    Ok(())
}

/// Insert one message into the pair's conversation, creating it if needed.
/// Runs on the caller's transaction.
async fn insert_message_on(
    conn: &mut DbConn,
    state: &AppState,
    sender_id: i64,
    recipient_id: i64,
    content: &str,
    message_type: MessageType,
) -> Result<DirectMessage, CoreError> {
    let now = Utc::now();
    let conversation =
        lumen_db::conversations::get_or_create_on(conn, state.next_id(), sender_id, recipient_id)
            .await?;
    let seq = lumen_db::conversations::advance_on(conn, conversation.id, content, now).await?;
    let row = lumen_db::direct_messages::insert_on(
        conn,
        &NewDirectMessage {
            id: state.next_id(),
            conversation_id: conversation.id,
            seq,
            sender_id,
            recipient_id,
            content,
            message_type,
            created_at: now,
        },
    )
    .await?;
    Ok(row.into())
}

pub async fn send_message(
    state: &AppState,
    sender_id: i64,
    recipient_id: i64,
    content: &str,
    message_type: MessageType,
) -> Result<SendOutcome, CoreError> {
    if sender_id == recipient_id {
        return Err(CoreError::BadRequest("Cannot message yourself".into()));
    }
    validate_content(state, content)?;
    ensure_user_exists(state, recipient_id).await?;
    check_blocks(state, sender_id, recipient_id).await?;

    let open = lumen_db::conversations::find_between(&state.db, sender_id, recipient_id)
        .await?
        .is_some()
        || lumen_db::message_requests::accepted_between(&state.db, sender_id, recipient_id).await?;

    if open {
        let mut tx = state.db.begin().await.map_err(lumen_db::DbError::from)?;
        let message =
            insert_message_on(&mut tx, state, sender_id, recipient_id, content, message_type)
                .await?;
        tx.commit().await.map_err(lumen_db::DbError::from)?;

        state.connections.broadcast_to_user(
            recipient_id,
            &ServerMessage::DirectMessage {
                message: message.clone(),
            },
        );
        return Ok(SendOutcome::Delivered(message));
    }

    if let Some(previous) =
        lumen_db::message_requests::latest_between(&state.db, sender_id, recipient_id).await?
    {
        match previous.status() {
            Some(RequestStatus::Pending) => return Err(CoreError::RequestAlreadyPending),
            Some(RequestStatus::Rejected) => {
                let answered = previous.responded_at.unwrap_or(previous.created_at);
                if Utc::now() < answered + state.config.request_cooldown {
                    return Err(CoreError::RequestRejected);
                }
            }
            _ => {}
        }
    }

    let row = lumen_db::message_requests::create_request(
        &state.db,
        state.next_id(),
        sender_id,
        recipient_id,
        content,
        message_type,
    )
    .await
    .map_err(|e| {
        if e.is_unique_violation() {
            CoreError::RequestAlreadyPending
        } else {
            CoreError::Database(e)
        }
    })?;
    let request = row.to_model();
    tracing::debug!(sender_id, recipient_id, request_id = request.id, "message request created");

    state.connections.broadcast_to_user(
        recipient_id,
        &ServerMessage::MessageRequest {
            request: request.clone(),
        },
    );
    Ok(SendOutcome::RequestCreated(request))
}

/// Accept, reject or block a pending request. Only its receiver may answer.
pub async fn respond_to_request(
    state: &AppState,
    request_id: i64,
    responder_id: i64,
    action: RequestAction,
) -> Result<RequestResponse, CoreError> {
    let existing = lumen_db::message_requests::get_request(&state.db, request_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    if existing.receiver_id != responder_id {
        return Err(CoreError::Forbidden);
    }
    if existing.status() != Some(RequestStatus::Pending) {
        return Err(CoreError::Conflict("Request has already been answered".into()));
    }

    let mut tx = state.db.begin().await.map_err(lumen_db::DbError::from)?;
    let resolved = lumen_db::message_requests::resolve_on(
        &mut tx,
        request_id,
        action.resulting_status(),
        Utc::now(),
    )
    .await?
    .ok_or_else(|| CoreError::Conflict("Request has already been answered".into()))?;

    let mut message = None;
    match action {
        RequestAction::Accept => {
            message = Some(
                insert_message_on(
                    &mut tx,
                    state,
                    resolved.sender_id,
                    resolved.receiver_id,
                    &resolved.initial_message,
                    resolved.message_type(),
                )
                .await?,
            );
        }
        RequestAction::Block => {
            lumen_db::blocks::create_block_on(&mut tx, responder_id, resolved.sender_id).await?;
            lumen_db::message_requests::block_pending_between_on(
                &mut tx,
                responder_id,
                resolved.sender_id,
            )
            .await?;
        }
        RequestAction::Reject => {}
    }
    tx.commit().await.map_err(lumen_db::DbError::from)?;

    let request = resolved.to_model();
    tracing::debug!(request_id, status = request.status.as_str(), "message request answered");

    if action == RequestAction::Accept {
        state.connections.broadcast_to_user(
            resolved.sender_id,
            &ServerMessage::MessageRequest {
                request: request.clone(),
            },
        );
    }

    Ok(RequestResponse {
        conversation_id: message.as_ref().map(|m| m.conversation_id),
        request,
        message,
    })
}

/// Messages between `me` and `other`, oldest first. Marks everything
/// `other` sent me as read.
pub async fn get_thread(
    state: &AppState,
    me: i64,
    other: i64,
    before_seq: Option<i64>,
    limit: Option<i64>,
) -> Result<Vec<DirectMessage>, CoreError> {
    let Some(conversation) = lumen_db::conversations::find_between(&state.db, me, other).await?
    else {
        return Ok(Vec::new());
    };
    lumen_db::direct_messages::mark_read(&state.db, me, other).await?;

    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let rows =
        lumen_db::direct_messages::get_page(&state.db, conversation.id, before_seq, limit).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn mark_thread_read(state: &AppState, me: i64, other: i64) -> Result<u64, CoreError> {
    Ok(lumen_db::direct_messages::mark_read(&state.db, me, other).await?)
}

pub async fn list_conversations(
    state: &AppState,
    me: i64,
) -> Result<Vec<ConversationSummary>, CoreError> {
    let rows = lumen_db::conversations::list_for_user(&state.db, me).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn list_incoming_requests(
    state: &AppState,
    me: i64,
) -> Result<Vec<MessageRequest>, CoreError> {
    let rows = lumen_db::message_requests::list_incoming_pending(&state.db, me).await?;
    Ok(rows.iter().map(|r| r.to_model()).collect())
}

pub async fn list_outgoing_requests(
    state: &AppState,
    me: i64,
) -> Result<Vec<MessageRequest>, CoreError> {
    let rows = lumen_db::message_requests::list_outgoing(&state.db, me).await?;
    Ok(rows.iter().map(|r| r.to_model()).collect())
}

/// Block `target`, also closing any pending request between the two.
pub async fn block_user(state: &AppState, me: i64, target: i64) -> Result<(), CoreError> {
    if me == target {
        return Err(CoreError::BadRequest("Cannot block yourself".into()));
    }
    ensure_user_exists(state, target).await?;

    let mut tx = state.db.begin().await.map_err(lumen_db::DbError::from)?;
    lumen_db::blocks::create_block_on(&mut tx, me, target).await?;
    lumen_db::message_requests::block_pending_between_on(&mut tx, me, target).await?;
    tx.commit().await.map_err(lumen_db::DbError::from)?;

    tracing::debug!(blocker_id = me, blocked_id = target, "user blocked");
    Ok(())
}

/// Returns false if there was no block to remove.
pub async fn unblock_user(state: &AppState, me: i64, target: i64) -> Result<bool, CoreError> {
    Ok(lumen_db::blocks::delete_block(&state.db, me, target).await?)
}

/// Users `me` has blocked, oldest block first.
pub async fn list_blocked(
    state: &AppState,
    me: i64,
) -> Result<Vec<lumen_models::user::UserSnapshot>, CoreError> {
    let rows = lumen_db::blocks::list_blocked(&state.db, me).await?;
    let mut users = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(user) = lumen_db::users::get_user_by_id(&state.db, row.blocked_id).await? {
            users.push(user.snapshot());
        }
    }
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    async fn pair() -> AppState {
        let state = test_support::state().await;
        test_support::user(&state, 1, "alice").await;
        test_support::user(&state, 2, "bob").await;
        state
    }

    async fn request_id(state: &AppState, from: i64, to: i64, text: &str) -> i64 {
        match send_message(state, from, to, text, MessageType::Text).await.unwrap() {
            SendOutcome::RequestCreated(request) => request.id,
            other => panic!("expected a request, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_message_creates_a_request_once() {
        let state = pair().await;
        let id = request_id(&state, 1, 2, "hi bob").await;
        assert!(id > 0);

        let again = send_message(&state, 1, 2, "hello?", MessageType::Text).await;
        assert!(matches!(again, Err(CoreError::RequestAlreadyPending)));

        let incoming = list_incoming_requests(&state, 2).await.unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].initial_message, "hi bob");
        assert!(lumen_db::conversations::find_between(&state.db, 1, 2)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn accept_opens_exactly_one_conversation() {
        let state = pair().await;
        let id = request_id(&state, 1, 2, "hi bob").await;

        let response = respond_to_request(&state, id, 2, RequestAction::Accept)
            .await
            .unwrap();
        assert_eq!(response.request.status, RequestStatus::Accepted);
        let first = response.message.unwrap();
        assert_eq!(first.content, "hi bob");
        assert_eq!(first.sender_id, 1);
        assert_eq!(first.seq, 1);

        let convos = list_conversations(&state, 1).await.unwrap();
        assert_eq!(convos.len(), 1);
        assert_eq!(convos[0].other_user.id, 2);
        assert_eq!(convos[0].last_message.as_deref(), Some("hi bob"));

        let thread = get_thread(&state, 2, 1, None, None).await.unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].content, "hi bob");

        // Both directions now deliver directly, with increasing seq.
        let reply = send_message(&state, 2, 1, "hey alice", MessageType::Text)
            .await
            .unwrap();
        let SendOutcome::Delivered(reply) = reply else {
            panic!("reply should be delivered");
        };
        assert_eq!(reply.seq, 2);
        assert_eq!(reply.conversation_id, first.conversation_id);

        let convos = list_conversations(&state, 2).await.unwrap();
        assert_eq!(convos.len(), 1);
        assert_eq!(convos[0].last_message.as_deref(), Some("hey alice"));
        assert!(convos[0].last_message_at.is_some());
    }

    #[tokio::test]
    async fn only_the_receiver_answers_and_only_once() {
        let state = pair().await;
        test_support::user(&state, 3, "carol").await;
        let id = request_id(&state, 1, 2, "hi").await;

        assert!(matches!(
            respond_to_request(&state, id, 3, RequestAction::Accept).await,
            Err(CoreError::Forbidden)
        ));
        assert!(matches!(
            respond_to_request(&state, id, 1, RequestAction::Accept).await,
            Err(CoreError::Forbidden)
        ));
        respond_to_request(&state, id, 2, RequestAction::Reject)
            .await
            .unwrap();
        assert!(matches!(
            respond_to_request(&state, id, 2, RequestAction::Accept).await,
            Err(CoreError::Conflict(_))
        ));
        assert!(matches!(
            respond_to_request(&state, 999, 2, RequestAction::Accept).await,
            Err(CoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn rejected_sender_waits_for_the_cooldown() {
        let mut state = pair().await;
        let id = request_id(&state, 1, 2, "hi").await;
        respond_to_request(&state, id, 2, RequestAction::Reject)
            .await
            .unwrap();

        assert!(matches!(
            send_message(&state, 1, 2, "please?", MessageType::Text).await,
            Err(CoreError::RequestRejected)
        ));

        state.config.request_cooldown = chrono::Duration::zero();
        let retry = request_id(&state, 1, 2, "one more try").await;
        assert_ne!(retry, id);
    }

    #[tokio::test]
    async fn blocks_are_enforced_both_ways_until_unblocked() {
        let state = pair().await;
        block_user(&state, 2, 1).await.unwrap();

        assert!(matches!(
            send_message(&state, 1, 2, "hi", MessageType::Text).await,
            Err(CoreError::BlockedByUser)
        ));
        assert!(matches!(
            send_message(&state, 2, 1, "hi", MessageType::Text).await,
            Err(CoreError::UserBlocked)
        ));

        assert!(unblock_user(&state, 2, 1).await.unwrap());
        let outcome = send_message(&state, 1, 2, "hi", MessageType::Text)
            .await
            .unwrap();
        assert!(matches!(outcome, SendOutcome::RequestCreated(_)));
    }

    #[tokio::test]
    async fn block_action_closes_requests_in_both_directions() {
        let state = pair().await;
        let from_alice = request_id(&state, 1, 2, "hi").await;
        request_id(&state, 2, 1, "hi yourself").await;

        respond_to_request(&state, from_alice, 2, RequestAction::Block)
            .await
            .unwrap();
        assert!(list_incoming_requests(&state, 1).await.unwrap().is_empty());
        assert!(list_incoming_requests(&state, 2).await.unwrap().is_empty());
        assert!(lumen_db::blocks::is_blocked(&state.db, 2, 1).await.unwrap());

        let outgoing = list_outgoing_requests(&state, 2).await.unwrap();
        assert_eq!(outgoing[0].status, RequestStatus::Blocked);
    }

    #[tokio::test]
    async fn reverse_pending_request_is_not_an_accept() {
        let state = pair().await;
        request_id(&state, 1, 2, "hi").await;
        let reverse = send_message(&state, 2, 1, "hi back", MessageType::Text)
            .await
            .unwrap();
        assert!(matches!(reverse, SendOutcome::RequestCreated(_)));
        assert!(list_conversations(&state, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_receipts_are_idempotent() {
        let state = pair().await;
        let id = request_id(&state, 1, 2, "one").await;
        respond_to_request(&state, id, 2, RequestAction::Accept)
            .await
            .unwrap();
        send_message(&state, 1, 2, "two", MessageType::Text).await.unwrap();

        let convos = list_conversations(&state, 2).await.unwrap();
        assert_eq!(convos[0].unread_count, 2);

        assert_eq!(mark_thread_read(&state, 2, 1).await.unwrap(), 2);
        assert_eq!(mark_thread_read(&state, 2, 1).await.unwrap(), 0);
        let thread = get_thread(&state, 2, 1, None, None).await.unwrap();
        assert!(thread.iter().all(|m| m.is_read));
    }

    #[tokio::test]
    async fn input_validation() {
        let state = pair().await;
        assert!(matches!(
            send_message(&state, 1, 1, "me", MessageType::Text).await,
            Err(CoreError::BadRequest(_))
        ));
        assert!(matches!(
            send_message(&state, 1, 2, "   ", MessageType::Text).await,
            Err(CoreError::BadRequest(_))
        ));
        let long = "x".repeat(2001);
        assert!(matches!(
            send_message(&state, 1, 2, &long, MessageType::Text).await,
            Err(CoreError::BadRequest(_))
        ));
        assert!(matches!(
            send_message(&state, 1, 404, "hi", MessageType::Text).await,
            Err(CoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn blocked_list_follows_block_and_unblock() {
        let state = pair().await;
        assert!(list_blocked(&state, 1).await.unwrap().is_empty());

        block_user(&state, 1, 2).await.unwrap();
        block_user(&state, 1, 2).await.unwrap();
        let blocked = list_blocked(&state, 1).await.unwrap();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].username, "bob");
        assert!(list_blocked(&state, 2).await.unwrap().is_empty());

        assert!(unblock_user(&state, 1, 2).await.unwrap());
        assert!(list_blocked(&state, 1).await.unwrap().is_empty());
    }
}
