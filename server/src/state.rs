use std::env;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use serde::Serialize;

use cartable_core::{config::AppConfig, db::Database, notification::NotificationStore,
    notification_store::SqliteNotificationStore};

use crate::{
    auth::{TokenVerifier, resolve_auth_secret},
    notify::{NotificationService, Notifier},
    socket::registry::RoomRegistry,
};

#[derive(Clone)]
pub struct AppState {
    pub notification_store: Arc<dyn NotificationStore>,
    pub notifications: Arc<NotificationService>,
    pub registry: Arc<RoomRegistry>,
    pub token_verifier: TokenVerifier,
    pub metadata: ServerMetadata,
    pub socket_metrics: Arc<SocketMetrics>,
}

pub fn build_state(database: &Database, app_config: &AppConfig) -> AppState {
    let secret = resolve_auth_secret(app_config.auth_secret.as_deref());
    let notification_store: Arc<dyn NotificationStore> =
        Arc::new(SqliteNotificationStore::new(database));
    let registry = Arc::new(RoomRegistry::new());
    let socket_metrics = Arc::new(SocketMetrics::default());
    let notifier = Notifier::new(registry.clone(), socket_metrics.clone());
    let notifications = Arc::new(NotificationService::new(
        notification_store.clone(),
        notifier,
    ));

    AppState {
        notification_store,
        notifications,
        registry,
        token_verifier: TokenVerifier::new(&secret),
        metadata: ServerMetadata::load(),
        socket_metrics,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerMetadata {
    pub version: String,
    pub message: String,
    #[serde(rename = "type")]
    pub deployment_type: String,
}

impl ServerMetadata {
    pub fn load() -> Self {
        let version = env::var("CARTABLE_VERSION")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        let deployment_type = env::var("CARTABLE_DEPLOYMENT_TYPE")
            .unwrap_or_else(|_| "selfhosted".to_string());

        let message = env::var("CARTABLE_SERVER_MESSAGE")
            .unwrap_or_else(|_| format!("Cartable {version} Server"));

        Self {
            version,
            message,
            deployment_type,
        }
    }
}

#[derive(Default)]
pub struct SocketMetrics {
    connections: AtomicUsize,
    pushes_delivered: AtomicUsize,
    chat_messages: AtomicUsize,
}

impl SocketMetrics {
    pub fn inc_connections(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_connections(&self) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn add_pushes_delivered(&self, count: usize) {
        self.pushes_delivered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_chat_messages(&self) {
        self.chat_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn open_connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn total_pushes_delivered(&self) -> usize {
        self.pushes_delivered.load(Ordering::Relaxed)
    }

    pub fn total_chat_messages(&self) -> usize {
        self.chat_messages.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_metadata_serializes_with_expected_fields() {
        let metadata = ServerMetadata {
            version: "0.4.2".into(),
            message: "Cartable 0.4.2 Server".into(),
            deployment_type: "selfhosted".into(),
        };

        let json = serde_json::to_value(&metadata).expect("metadata serializes");
        assert_eq!(json["version"], "0.4.2");
        assert_eq!(json["message"], "Cartable 0.4.2 Server");
        assert_eq!(json["type"], "selfhosted");
    }

    #[test]
    fn socket_metrics_counters_accumulate() {
        let metrics = SocketMetrics::default();
        metrics.inc_connections();
        metrics.inc_connections();
        metrics.dec_connections();
        metrics.add_pushes_delivered(3);
        metrics.inc_chat_messages();

        assert_eq!(metrics.open_connections(), 1);
        assert_eq!(metrics.total_pushes_delivered(), 3);
        assert_eq!(metrics.total_chat_messages(), 1);
    }
}
