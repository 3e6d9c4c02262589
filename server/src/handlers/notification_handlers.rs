// Notification inbox endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
};
use cartable_core::notification::{NotificationFilter, NotificationPage, NotificationRecord};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, state::AppState};

const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize)]
pub(crate) struct ListNotificationsQuery {
    unread: Option<bool>,
    kind: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListNotificationsResponse {
    notifications: Vec<NotificationRecord>,
    unread_count: i64,
}

pub(crate) async fn list_notifications_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListNotificationsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let claims = state.token_verifier.authenticate(&headers)?;

    let filter = NotificationFilter {
        unread_only: params.unread.unwrap_or(false),
        kind: params.kind.filter(|k| !k.trim().is_empty()),
    };
    let defaults = NotificationPage::default();
    let page = NotificationPage {
        limit: params
            .limit
            .unwrap_or(defaults.limit)
            .clamp(1, MAX_PAGE_SIZE),
        offset: params.offset.unwrap_or(defaults.offset).max(0),
    };

    let notifications = state
        .notification_store
        .list_for_user(&claims.sub, &filter, page)
        .await
        .map_err(AppError::from_anyhow)?;
    let unread_count = state
        .notification_store
        .count_unread(&claims.sub)
        .await
        .map_err(AppError::from_anyhow)?;

    Ok(Json(ListNotificationsResponse {
        notifications,
        unread_count,
    }))
}

pub(crate) async fn mark_read_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(notification_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let claims = state.token_verifier.authenticate(&headers)?;

    let record = state
        .notification_store
        .mark_read(&notification_id, &claims.sub)
        .await
        .map_err(AppError::from_anyhow)?
        .ok_or_else(|| AppError::notification_not_found(&notification_id))?;

    Ok(Json(record))
}

#[derive(Debug, Serialize)]
struct MarkAllReadResponse {
    updated: u64,
}

pub(crate) async fn mark_all_read_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let claims = state.token_verifier.authenticate(&headers)?;

    let updated = state
        .notification_store
        .mark_all_read(&claims.sub)
        .await
        .map_err(AppError::from_anyhow)?;

    Ok(Json(MarkAllReadResponse { updated }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bearer_headers, setup_state};
    use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};
    use serde_json::{Value as JsonValue, json};

    async fn body_json(response: axum::response::Response) -> JsonValue {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("parse body")
    }

    #[tokio::test]
    async fn list_returns_rows_and_unread_count() {
        let (_tmp, _db, state) = setup_state().await;
        for n in 0..3 {
            state
                .notification_store
                .create("alice", &format!("titre {n}"), "msg", "document", json!({}))
                .await
                .expect("create notification");
        }

        let response = list_notifications_handler(
            State(state),
            bearer_headers("alice", "student"),
            Query(ListNotificationsQuery {
                unread: None,
                kind: None,
                limit: Some(2),
                offset: None,
            }),
        )
        .await
        .expect("list")
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["notifications"].as_array().unwrap().len(), 2);
        assert_eq!(body["unreadCount"], 3);
    }

    #[tokio::test]
    async fn list_rejects_missing_token() {
        let (_tmp, _db, state) = setup_state().await;

        let result = list_notifications_handler(
            State(state),
            axum::http::HeaderMap::new(),
            Query(ListNotificationsQuery {
                unread: None,
                kind: None,
                limit: None,
                offset: None,
            }),
        )
        .await;

        let error = result.err().expect("unauthorized");
        assert_eq!(error.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn mark_read_unknown_id_is_not_found() {
        let (_tmp, _db, state) = setup_state().await;

        let result = mark_read_handler(
            State(state),
            bearer_headers("alice", "student"),
            Path("missing".to_string()),
        )
        .await;

        let error = result.err().expect("not found");
        assert_eq!(error.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn mark_read_is_scoped_to_the_caller() {
        let (_tmp, _db, state) = setup_state().await;
        let record = state
            .notification_store
            .create("alice", "titre", "msg", "comment", JsonValue::Null)
            .await
            .expect("create notification");

        let result = mark_read_handler(
            State(state.clone()),
            bearer_headers("bob", "student"),
            Path(record.id.clone()),
        )
        .await;
        assert!(result.is_err());

        let response = mark_read_handler(
            State(state),
            bearer_headers("alice", "student"),
            Path(record.id),
        )
        .await
        .expect("mark read")
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["read"], true);
    }

    #[tokio::test]
    async fn mark_all_read_reports_update_count() {
        let (_tmp, _db, state) = setup_state().await;
        for n in 0..2 {
            state
                .notification_store
                .create("alice", &format!("t{n}"), "m", "article", JsonValue::Null)
                .await
                .expect("create notification");
        }

        let response = mark_all_read_handler(State(state.clone()), bearer_headers("alice", "student"))
            .await
            .expect("mark all")
            .into_response();
        let body = body_json(response).await;
        assert_eq!(body["updated"], 2);

        let unread = state
            .notification_store
            .count_unread("alice")
            .await
            .expect("count");
        assert_eq!(unread, 0);
    }
}
