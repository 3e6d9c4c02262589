// Write paths that persist a notification and push it to live sockets

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use crate::{auth::ADMIN_ROLE, error::AppError, notify::NotificationDraft, state::AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ShareDocumentRequest {
    recipient_id: String,
    /// Display name shown in the notification message. Falls back to the
    /// caller's user id when the client does not send one.
    #[serde(default)]
    sender_name: Option<String>,
}

pub(crate) async fn share_document_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(doc_id): Path<String>,
    Json(payload): Json<ShareDocumentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let claims = state.token_verifier.authenticate(&headers)?;
    let recipient = non_empty(&payload.recipient_id, "recipientId")?;
    let sender_name = payload
        .sender_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(&claims.sub);

    let draft = NotificationDraft::document_shared(&doc_id, sender_name);
    let record = state.notifications.deliver(recipient, draft).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CommentDocumentRequest {
    recipient_id: String,
    excerpt: String,
}

pub(crate) async fn comment_document_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(doc_id): Path<String>,
    Json(payload): Json<CommentDocumentRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.token_verifier.authenticate(&headers)?;
    let recipient = non_empty(&payload.recipient_id, "recipientId")?;

    let draft = NotificationDraft::comment_submitted(&doc_id, &payload.excerpt);
    let record = state.notifications.deliver(recipient, draft).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PublishArticleRequest {
    recipient_ids: Vec<String>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Serialize)]
struct PublishArticleResponse {
    notified: usize,
}

/// Fans an article-published notification out to every recipient. Each
/// recipient gets its own durable row; one failed insert aborts the rest.
pub(crate) async fn publish_article_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(article_id): Path<String>,
    Json(payload): Json<PublishArticleRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.token_verifier.authenticate(&headers)?;
    if payload.recipient_ids.is_empty() {
        return Err(AppError::bad_request("recipientIds must not be empty"));
    }

    let article_title = payload.title.as_deref().unwrap_or("Un nouvel article est disponible.");
    let mut notified = 0usize;
    for recipient in &payload.recipient_ids {
        if recipient.trim().is_empty() {
            continue;
        }
        let draft = NotificationDraft::article_published(&article_id, article_title);
        state.notifications.deliver(recipient, draft).await?;
        notified += 1;
    }

    Ok((StatusCode::CREATED, Json(PublishArticleResponse { notified })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AdminMessageRequest {
    recipient_id: String,
    title: String,
    message: String,
}

pub(crate) async fn admin_message_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<AdminMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let claims = state.token_verifier.authenticate(&headers)?;
    if claims.role != ADMIN_ROLE {
        return Err(AppError::admin_required());
    }
    let recipient = non_empty(&payload.recipient_id, "recipientId")?;
    if payload.title.trim().is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }

    let draft = NotificationDraft::admin_message(&payload.title, &payload.message);
    let record = state.notifications.deliver(recipient, draft).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

fn non_empty<'a>(value: &'a str, field: &str) -> Result<&'a str, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request(format!("{field} must not be empty")));
    }
    Ok(trimmed)
}
