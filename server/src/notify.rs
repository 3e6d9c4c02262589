// Notification dispatch: durable persistence first, then best-effort push
// to every live connection of the recipient.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use cartable_core::notification::{NotificationRecord, NotificationStore};

use crate::{
    error::AppError,
    socket::{registry::RoomRegistry, rooms::ChannelName},
    state::SocketMetrics,
};

/// Wire payload of the `notification` push event. Carries the durable row
/// id so clients can reconcile without a full re-fetch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPush {
    pub id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: JsonValue,
}

impl From<&NotificationRecord> for NotificationPush {
    fn from(record: &NotificationRecord) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            message: record.message.clone(),
            kind: record.kind.clone(),
            data: record.data.clone(),
        }
    }
}

/// At-most-once push fan-out over the recipient's personal channel. No
/// outbox, no retry: zero live connections is a silent no-op.
#[derive(Clone)]
pub struct Notifier {
    registry: Arc<RoomRegistry>,
    metrics: Arc<SocketMetrics>,
}

impl Notifier {
    pub fn new(registry: Arc<RoomRegistry>, metrics: Arc<SocketMetrics>) -> Self {
        Self { registry, metrics }
    }

    pub fn notify(&self, user_id: &str, push: &NotificationPush) -> usize {
        let payload = match serde_json::to_value(push) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(user_id, error = %err, "failed to serialize notification push");
                return 0;
            }
        };

        let delivered =
            self.registry
                .multicast(&ChannelName::user(user_id), "notification", &payload);
        self.metrics.add_pushes_delivered(delivered);
        debug!(user_id, delivered, kind = %push.kind, "notification pushed");
        delivered
    }
}

/// A notification about to be persisted and pushed.
pub struct NotificationDraft {
    pub title: String,
    pub message: String,
    pub kind: String,
    pub data: JsonValue,
}

impl NotificationDraft {
    pub fn document_shared(document_id: &str, sender_name: &str) -> Self {
        Self {
            title: "Nouveau document partagé".to_string(),
            message: format!("{sender_name} a partagé un document avec vous."),
            kind: "document".to_string(),
            data: serde_json::json!({ "documentId": document_id }),
        }
    }

    pub fn comment_submitted(document_id: &str, excerpt: &str) -> Self {
        Self {
            title: "Nouveau commentaire".to_string(),
            message: excerpt.to_string(),
            kind: "comment".to_string(),
            data: serde_json::json!({ "documentId": document_id }),
        }
    }

    pub fn article_published(article_id: &str, article_title: &str) -> Self {
        Self {
            title: "Nouvel article publié".to_string(),
            message: article_title.to_string(),
            kind: "article".to_string(),
            data: serde_json::json!({ "articleId": article_id }),
        }
    }

    pub fn admin_message(title: &str, message: &str) -> Self {
        Self {
            title: title.to_string(),
            message: message.to_string(),
            kind: "admin".to_string(),
            data: JsonValue::Null,
        }
    }
}

/// Persist-then-push glue. A storage failure propagates and suppresses the
/// push; a push failure never rolls back the row.
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    notifier: Notifier,
}

impl NotificationService {
    pub fn new(store: Arc<dyn NotificationStore>, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    pub async fn deliver(
        &self,
        user_id: &str,
        draft: NotificationDraft,
    ) -> Result<NotificationRecord, AppError> {
        let record = self
            .store
            .create(
                user_id,
                &draft.title,
                &draft.message,
                &draft.kind,
                draft.data,
            )
            .await
            .map_err(AppError::from_anyhow)?;

        self.notifier.notify(user_id, &NotificationPush::from(&record));

        Ok(record)
    }
}
