#![allow(dead_code)]

use axum::http::{HeaderMap, HeaderValue, header::AUTHORIZATION};
use cartable_core::{config::AppConfig, db::Database};
use tempfile::TempDir;

use crate::{
    auth::TokenIssuer,
    state::{AppState, build_state},
};

pub(crate) async fn setup_state() -> (TempDir, Database, AppState) {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let mut config = AppConfig::default();
    let db_path = temp_dir.path().join("test.db");
    config.database_path = db_path.to_string_lossy().into_owned();
    config.auth_secret = Some("test-secret".to_string());

    let database = Database::connect(&config).await.expect("connect database");
    database.run_migrations().await.expect("apply migrations");

    let state = build_state(&database, &config);
    (temp_dir, database, state)
}

pub(crate) fn bearer_headers(user_id: &str, role: &str) -> HeaderMap {
    let issuer = TokenIssuer::new(b"test-secret");
    let token = issuer.issue(user_id, role, 3600).expect("issue token");

    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(&format!("Bearer {token}")).expect("header value");
    headers.insert(AUTHORIZATION, value);
    headers
}
