use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Durable notification row. The push path copies its content fields onto the
/// wire but never mutates the row; the read flag changes only through an
/// explicit owner action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: JsonValue,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    pub unread_only: bool,
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct NotificationPage {
    pub limit: i64,
    pub offset: i64,
}

impl Default for NotificationPage {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
        }
    }
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(
        &self,
        user_id: &str,
        title: &str,
        message: &str,
        kind: &str,
        data: JsonValue,
    ) -> Result<NotificationRecord>;
    async fn list_for_user(
        &self,
        user_id: &str,
        filter: &NotificationFilter,
        page: NotificationPage,
    ) -> Result<Vec<NotificationRecord>>;
    async fn count_unread(&self, user_id: &str) -> Result<i64>;
    /// Owner-only mutation: returns `None` when the row does not exist or
    /// belongs to a different user.
    async fn mark_read(&self, notification_id: &str, user_id: &str)
    -> Result<Option<NotificationRecord>>;
    async fn mark_all_read(&self, user_id: &str) -> Result<u64>;
}
