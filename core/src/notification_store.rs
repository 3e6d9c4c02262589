use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

use crate::{
    db::Database,
    notification::{NotificationFilter, NotificationPage, NotificationRecord, NotificationStore},
};

#[derive(Clone)]
pub struct SqliteNotificationStore {
    pool: Arc<Pool<Sqlite>>,
}

impl SqliteNotificationStore {
    pub fn new(database: &Database) -> Self {
        Self {
            pool: Arc::new(database.pool().clone()),
        }
    }

    fn deserialize_data(raw: &str) -> JsonValue {
        serde_json::from_str(raw).unwrap_or(JsonValue::Null)
    }

    fn serialize_data(data: &JsonValue) -> Result<String> {
        Ok(serde_json::to_string(data)?)
    }

    fn map_row(row: sqlx::sqlite::SqliteRow) -> NotificationRecord {
        NotificationRecord {
            id: row.get("id"),
            user_id: row.get("user_id"),
            title: row.get("title"),
            message: row.get("message"),
            kind: row.get("kind"),
            data: Self::deserialize_data(row.get("data")),
            read: row.get::<i64, _>("read") != 0,
            created_at: DateTime::<Utc>::from_timestamp(row.get("created_at"), 0)
                .unwrap_or_else(Utc::now),
            read_at: row
                .get::<Option<i64>, _>("read_at")
                .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
        }
    }

    async fn fetch(&self, notification_id: &str, user_id: &str) -> Result<Option<NotificationRecord>> {
        let row = sqlx::query(
            "SELECT id, user_id, title, message, kind, data, read, created_at, read_at
             FROM notifications
             WHERE id = ? AND user_id = ?",
        )
        .bind(notification_id)
        .bind(user_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(Self::map_row))
    }
}

#[async_trait]
impl NotificationStore for SqliteNotificationStore {
    async fn create(
        &self,
        user_id: &str,
        title: &str,
        message: &str,
        kind: &str,
        data: JsonValue,
    ) -> Result<NotificationRecord> {
        let record = NotificationRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_owned(),
            title: title.to_owned(),
            message: message.to_owned(),
            kind: kind.to_owned(),
            data,
            read: false,
            created_at: Utc::now(),
            read_at: None,
        };

        let payload = Self::serialize_data(&record.data)?;

        sqlx::query(
            "INSERT INTO notifications (id, user_id, title, message, kind, data, read, created_at, read_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?, NULL)",
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.title)
        .bind(&record.message)
        .bind(&record.kind)
        .bind(payload)
        .bind(record.created_at.timestamp())
        .execute(&*self.pool)
        .await?;

        Ok(record)
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        filter: &NotificationFilter,
        page: NotificationPage,
    ) -> Result<Vec<NotificationRecord>> {
        let mut sql = String::from(
            "SELECT id, user_id, title, message, kind, data, read, created_at, read_at
             FROM notifications
             WHERE user_id = ?",
        );

        if filter.unread_only {
            sql.push_str(" AND read = 0");
        }
        if filter.kind.is_some() {
            sql.push_str(" AND kind = ?");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql).bind(user_id);
        if let Some(kind) = filter.kind.as_deref() {
            query = query.bind(kind);
        }
        let rows = query
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&*self.pool)
            .await?;

        Ok(rows.into_iter().map(Self::map_row).collect())
    }

    async fn count_unread(&self, user_id: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = ? AND read = 0")
                .bind(user_id)
                .fetch_one(&*self.pool)
                .await?;

        Ok(count)
    }

    async fn mark_read(
        &self,
        notification_id: &str,
        user_id: &str,
    ) -> Result<Option<NotificationRecord>> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            "UPDATE notifications SET read = 1, read_at = ?
             WHERE id = ? AND user_id = ? AND read = 0",
        )
        .bind(now)
        .bind(notification_id)
        .bind(user_id)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Either absent, foreign, or already read; the caller can tell
            // the last case apart from the returned row.
            return self.fetch(notification_id, user_id).await;
        }

        self.fetch(notification_id, user_id).await
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            "UPDATE notifications
             SET read = 1, read_at = ?
             WHERE user_id = ? AND read = 0",
        )
        .bind(now)
        .bind(user_id)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup_store() -> (TempDir, SqliteNotificationStore) {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let mut config = AppConfig::default();
        config.database_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .into_owned();

        let database = Database::connect(&config).await.expect("connect database");
        database.run_migrations().await.expect("apply migrations");

        (temp_dir, SqliteNotificationStore::new(&database))
    }

    #[tokio::test]
    async fn create_then_list_returns_unread_row() {
        let (_temp_dir, store) = setup_store().await;

        let created = store
            .create(
                "user-a",
                "Nouveau document partagé",
                "Un document a été partagé avec vous.",
                "document",
                json!({ "documentId": "doc-1" }),
            )
            .await
            .expect("create notification");

        assert!(!created.read);
        assert!(created.read_at.is_none());

        let listed = store
            .list_for_user(
                "user-a",
                &NotificationFilter::default(),
                NotificationPage::default(),
            )
            .await
            .expect("list notifications");

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
        assert_eq!(listed[0].data["documentId"], "doc-1");
        assert_eq!(store.count_unread("user-a").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_filters_by_kind_and_unread() {
        let (_temp_dir, store) = setup_store().await;

        store
            .create("user-b", "Nouveau commentaire", "msg", "comment", JsonValue::Null)
            .await
            .unwrap();
        let article = store
            .create("user-b", "Nouvel article publié", "msg", "article", JsonValue::Null)
            .await
            .unwrap();
        store.mark_read(&article.id, "user-b").await.unwrap();

        let comments = store
            .list_for_user(
                "user-b",
                &NotificationFilter {
                    unread_only: false,
                    kind: Some("comment".into()),
                },
                NotificationPage::default(),
            )
            .await
            .unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].kind, "comment");

        let unread = store
            .list_for_user(
                "user-b",
                &NotificationFilter {
                    unread_only: true,
                    kind: None,
                },
                NotificationPage::default(),
            )
            .await
            .unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].kind, "comment");
    }

    #[tokio::test]
    async fn mark_read_is_owner_only() {
        let (_temp_dir, store) = setup_store().await;

        let record = store
            .create("owner", "title", "msg", "admin", JsonValue::Null)
            .await
            .unwrap();

        let foreign = store.mark_read(&record.id, "intruder").await.unwrap();
        assert!(foreign.is_none());
        assert_eq!(store.count_unread("owner").await.unwrap(), 1);

        let owned = store
            .mark_read(&record.id, "owner")
            .await
            .unwrap()
            .expect("row visible to owner");
        assert!(owned.read);
        assert!(owned.read_at.is_some());
        assert_eq!(store.count_unread("owner").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn mark_all_read_reports_updated_count() {
        let (_temp_dir, store) = setup_store().await;

        for idx in 0..3 {
            store
                .create("user-c", &format!("title-{idx}"), "msg", "comment", JsonValue::Null)
                .await
                .unwrap();
        }

        assert_eq!(store.mark_all_read("user-c").await.unwrap(), 3);
        assert_eq!(store.mark_all_read("user-c").await.unwrap(), 0);
        assert_eq!(store.count_unread("user-c").await.unwrap(), 0);
    }
}
