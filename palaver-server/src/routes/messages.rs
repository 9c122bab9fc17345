//! Message snapshot endpoint backing the client's reconcile poll.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use shared::models::{MessageKind, MessageRow, Timestamp};
use sqlx::PgPool;
use tracing::instrument;

use crate::app_state::AppState;
use crate::http::error::{ApiError, AppResult};
use crate::http::problem::ProblemDetails;

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesQuery {
    conversation: Option<String>,
}

/// Database shape of a message row. Kept separate from the wire model
/// so unknown kind values degrade instead of failing the whole page.
#[derive(sqlx::FromRow)]
struct MessageRecord {
    id: i64,
    kind: String,
    sender: Option<String>,
    recipient: Option<String>,
    text: Option<String>,
    media_url: Option<String>,
    reply_to_mid: Option<String>,
    mid: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<MessageRecord> for MessageRow {
    fn from(record: MessageRecord) -> Self {
        Self {
            id: record.id,
            kind: MessageKind::try_from(record.kind.as_str()).unwrap_or(MessageKind::Text),
            sender: record.sender,
            recipient: record.recipient,
            text: record.text,
            media_url: record.media_url,
            reply_to_mid: record.reply_to_mid,
            mid: record.mid,
            created_at: Timestamp::from(record.created_at),
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/messages",
    params(
        ("conversation" = Option<String>, Query, description = "Conversation token to scope the snapshot to")
    ),
    responses(
        (status = 200, description = "Messages ordered by creation time ascending", body = [MessageRow]),
        (status = 503, description = "Database unavailable", body = ProblemDetails)
    ),
    tag = "Messages"
)]
#[instrument(skip(state))]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessagesQuery>,
) -> AppResult<Json<Vec<MessageRow>>> {
    let pool = require_pool(&state)?;

    let records = sqlx::query_as::<_, MessageRecord>(
        "SELECT id, kind, sender, recipient, text, media_url, reply_to_mid, mid, created_at \
         FROM messages \
         WHERE ($1::text IS NULL OR sender = $1 OR recipient = $1) \
         ORDER BY created_at ASC, id ASC",
    )
    .bind(query.conversation.as_deref())
    .fetch_all(pool)
    .await?;

    Ok(Json(records.into_iter().map(MessageRow::from).collect()))
}

fn require_pool(state: &AppState) -> Result<&PgPool, ApiError> {
    state
        .pool
        .as_ref()
        .ok_or_else(|| ApiError::database_unavailable("no database connection"))
}

pub fn message_routes() -> Router<Arc<AppState>> {
    Router::new().route("/messages", get(list_messages))
}
