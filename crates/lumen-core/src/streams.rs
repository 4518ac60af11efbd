use chrono::Utc;
use lumen_models::gateway::ServerMessage;
use lumen_models::stream::Stream;

use crate::error::CoreError;
use crate::AppState;

const MAX_TITLE_LEN: usize = 100;

/// Create a stream owned by `owner_id`. Streams are live from creation.
pub async fn create_stream(state: &AppState, owner_id: i64, title: &str) -> Result<Stream, CoreError> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
        return Err(CoreError::BadRequest(format!(
            "Title must be between 1 and {MAX_TITLE_LEN} characters"
        )));
    }
    let row = lumen_db::streams::create_stream(&state.db, state.next_id(), owner_id, title).await?;
    tracing::info!(stream_id = row.id, owner_id, "stream started");
    Ok(row.into())
}

pub async fn get_stream(state: &AppState, stream_id: i64) -> Result<Stream, CoreError> {
    lumen_db::streams::get_stream(&state.db, stream_id)
        .await?
        .map(Into::into)
        .ok_or(CoreError::NotFound)
}

/// End a live stream, tell its viewers, and drop their memberships.
pub async fn end_stream(state: &AppState, owner_id: i64, stream_id: i64) -> Result<Stream, CoreError> {
    let existing = lumen_db::streams::get_stream(&state.db, stream_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    if existing.owner_id != owner_id {
        return Err(CoreError::Forbidden);
    }
    let ended = lumen_db::streams::end_stream(&state.db, stream_id, Utc::now())
        .await?
        .ok_or_else(|| CoreError::Conflict("Stream has already ended".into()))?;

    let notified = state
        .connections
        .broadcast_to_stream(stream_id, &ServerMessage::StreamEnded { stream_id });
    state.connections.evict_stream(stream_id);
    tracing::info!(stream_id, notified, "stream ended");
    Ok(ended.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn only_the_owner_ends_a_stream() {
        let state = test_support::state().await;
        test_support::user(&state, 1, "host").await;
        test_support::user(&state, 2, "viewer").await;
        let stream = create_stream(&state, 1, "  first stream ").await.unwrap();
        assert_eq!(stream.title, "first stream");
        assert!(stream.is_live);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let viewer = uuid::Uuid::new_v4();
        state.connections.register(viewer, tx, Some(2));
        state.connections.join(&viewer, 2, stream.id).unwrap();

        assert!(matches!(
            end_stream(&state, 2, stream.id).await,
            Err(CoreError::Forbidden)
        ));
        let ended = end_stream(&state, 1, stream.id).await.unwrap();
        assert!(!ended.is_live);
        assert_eq!(state.connections.stream_viewer_count(stream.id), 0);

        let frame: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["type"], "stream_ended");

        assert!(matches!(
            end_stream(&state, 1, stream.id).await,
            Err(CoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn titles_are_validated() {
        let state = test_support::state().await;
        test_support::user(&state, 1, "host").await;
        assert!(matches!(
            create_stream(&state, 1, "   ").await,
            Err(CoreError::BadRequest(_))
        ));
        assert!(matches!(
            get_stream(&state, 12345).await,
            Err(CoreError::NotFound)
        ));
    }
}
