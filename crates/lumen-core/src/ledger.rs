use chrono::Utc;
use lumen_db::ledger::{GiftTransferRow, KIND_GIFT_RECEIVED, KIND_GIFT_SENT};
use lumen_models::gateway::ServerMessage;
use lumen_models::stream::{GiftEvent, PointTransaction};

use crate::error::CoreError;
use crate::AppState;

const DEFAULT_HISTORY_LIMIT: i64 = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct GiftReceipt {
    pub gift: GiftEvent,
    pub sender_balance: i64,
}

pub async fn balance(state: &AppState, user_id: i64) -> Result<i64, CoreError> {
    lumen_db::ledger::balance(&state.db, user_id)
        .await?
        .ok_or(CoreError::NotFound)
}

/// Most recent ledger entries first. `limit` is clamped to 1..=100.
pub async fn history(
    state: &AppState,
    user_id: i64,
    limit: Option<i64>,
) -> Result<Vec<PointTransaction>, CoreError> {
    let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, 100);
    let rows = lumen_db::ledger::list_transactions(&state.db, user_id, limit).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Move a gift's cost from sender to recipient. The debit, the credit and
/// both ledger rows commit together or not at all. When the gift is sent
/// into a stream, its viewers receive `gift_sent`.
pub async fn send_gift(
    state: &AppState,
    sender_id: i64,
    recipient_id: i64,
    gift_id: i64,
    stream_id: Option<i64>,
) -> Result<GiftReceipt, CoreError> {
    if sender_id == recipient_id {
        return Err(CoreError::BadRequest("Cannot send a gift to yourself".into()));
    }
    let gift = lumen_db::ledger::get_gift(&state.db, gift_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    lumen_db::users::get_user_by_id(&state.db, recipient_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    if let Some(stream_id) = stream_id {
        let live = lumen_db::streams::get_stream(&state.db, stream_id)
            .await?
            .ok_or(CoreError::NotFound)?
            .is_live;
        if !live {
            return Err(CoreError::Conflict("Stream has ended".into()));
        }
    }

    let transfer = GiftTransferRow {
        id: state.next_id(),
        gift_id: gift.id,
        sender_id,
        recipient_id,
        stream_id,
        cost: gift.cost,
        created_at: Utc::now(),
    };

    let mut tx = state.db.begin().await.map_err(lumen_db::DbError::from)?;
    let Some(sender_balance) = lumen_db::ledger::debit_on(&mut tx, sender_id, gift.cost).await?
    else {
        // Dropping the transaction rolls it back.
        return Err(CoreError::InsufficientPoints);
    };
    lumen_db::ledger::credit_on(&mut tx, recipient_id, gift.cost).await?;
    lumen_db::ledger::insert_transfer_on(&mut tx, &transfer).await?;
    lumen_db::ledger::record_on(&mut tx, sender_id, -gift.cost, KIND_GIFT_SENT, Some(transfer.id))
        .await?;
    lumen_db::ledger::record_on(
        &mut tx,
        recipient_id,
        gift.cost,
        KIND_GIFT_RECEIVED,
        Some(transfer.id),
    )
    .await?;
    tx.commit().await.map_err(lumen_db::DbError::from)?;

    tracing::info!(
        transfer_id = transfer.id,
        sender_id,
        recipient_id,
        cost = gift.cost,
        "gift sent"
    );

    let event = GiftEvent {
        transfer_id: transfer.id,
        gift_id: gift.id,
        name: gift.name,
        cost: gift.cost,
        recipient_id,
        stream_id,
    };

    if let Some(stream_id) = stream_id {
        match lumen_db::users::get_user_by_id(&state.db, sender_id).await {
            Ok(Some(sender)) => {
                state.connections.broadcast_to_stream(
                    stream_id,
                    &ServerMessage::GiftSent {
                        gift: event.clone(),
                        sender: sender.snapshot(),
                    },
                );
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(stream_id, "gift broadcast skipped: {e}"),
        }
    }

    Ok(GiftReceipt {
        gift: event,
        sender_balance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn insufficient_balance_moves_nothing() {
        let state = test_support::state().await;
        test_support::user(&state, 1, "fan").await;
        test_support::user(&state, 2, "host").await;
        lumen_db::ledger::grant(&state.db, 1, 5).await.unwrap();

        // "heart" costs 10.
        let err = send_gift(&state, 1, 2, 2, None).await.unwrap_err();
        assert!(matches!(err, CoreError::InsufficientPoints));
        assert_eq!(balance(&state, 1).await.unwrap(), 5);
        assert_eq!(balance(&state, 2).await.unwrap(), 0);
        assert!(history(&state, 2, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn gift_into_stream_is_broadcast() {
        let state = test_support::state().await;
        test_support::user(&state, 1, "fan").await;
        test_support::user(&state, 2, "host").await;
        lumen_db::ledger::grant(&state.db, 1, 100).await.unwrap();
        lumen_db::streams::create_stream(&state.db, 42, 2, "live")
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let viewer = uuid::Uuid::new_v4();
        state.connections.register(viewer, tx, Some(2));
        state.connections.join(&viewer, 2, 42).unwrap();

        let receipt = send_gift(&state, 1, 2, 3, Some(42)).await.unwrap();
        assert_eq!(receipt.sender_balance, 50);
        assert_eq!(balance(&state, 2).await.unwrap(), 50);

        let frame: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["type"], "gift_sent");
        assert_eq!(frame["gift"]["name"], "star");
        assert_eq!(frame["sender"]["points"], 50);

        let sent = history(&state, 1, Some(1)).await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].amount, -50);
        assert_eq!(sent[0].kind, KIND_GIFT_SENT);
        assert_eq!(sent[0].reference_id, Some(receipt.gift.transfer_id));
    }

    #[tokio::test]
    async fn unknown_gift_or_recipient() {
        let state = test_support::state().await;
        test_support::user(&state, 1, "fan").await;
        assert!(matches!(
            send_gift(&state, 1, 2, 1, None).await,
            Err(CoreError::NotFound)
        ));
        assert!(matches!(
            send_gift(&state, 1, 1, 1, None).await,
            Err(CoreError::BadRequest(_))
        ));
        test_support::user(&state, 2, "host").await;
        assert!(matches!(
            send_gift(&state, 1, 2, 999, None).await,
            Err(CoreError::NotFound)
        ));
    }
}
