use std::{str, sync::Arc};

use axum::http::header::AUTHORIZATION;
use serde_json::Value as JsonValue;
use socketioxide::SocketIo;
use socketioxide::adapter::Adapter;
use socketioxide::handler::{ConnectMiddleware, Value};
use socketioxide::layer::SocketIoLayer;
use tracing::{error, info, warn};

use crate::{
    error::AppError,
    socket::types::SocketUserContext,
    state::AppState,
};

pub(crate) fn build_socket(state: AppState) -> (SocketIoLayer, SocketIo) {
    SocketIo::builder().with_state(state).build_layer()
}

/// Validates the bearer token exactly once at connection establishment.
/// A rejected handshake never reaches the registry: no partial or
/// anonymous connection exists.
#[derive(Clone)]
pub(crate) struct SocketAuthMiddleware {
    state: AppState,
}

impl SocketAuthMiddleware {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    fn format_error(error: AppError) -> String {
        let (status, payload) = error.into_payload();
        match serde_json::to_string(&serde_json::json!({
            "status": status.as_u16(),
            "code": payload.code,
            "type": payload.error_type,
            "name": payload.name,
            "message": payload.message,
        })) {
            Ok(serialized) => serialized,
            Err(err) => {
                error!(?err, "failed to serialize socket auth error");
                payload.message
            }
        }
    }
}

impl<A> ConnectMiddleware<A, ()> for SocketAuthMiddleware
where
    A: Adapter + 'static,
{
    fn call<'a>(
        &'a self,
        socket: Arc<socketioxide::socket::Socket<A>>,
        auth: &'a Option<Value>,
    ) -> impl futures_util::Future<
        Output = Result<(), Box<dyn std::fmt::Display + std::marker::Send + 'static>>,
    > + std::marker::Send {
        let state = self.state.clone();

        Box::pin(async move {
            let parts = socket.req_parts();
            let header_token = parts
                .headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(normalize_bearer);
            let query = parts.uri.query();

            let token = parse_handshake_token(auth.as_ref(), query).or(header_token);

            let Some(token) = token else {
                warn!("socket handshake refused: no token supplied");
                let formatted =
                    Self::format_error(AppError::unauthorized("missing bearer token"));
                return Err(Box::new(formatted) as Box<dyn std::fmt::Display + Send>);
            };

            let claims = match state.token_verifier.verify(&token) {
                Ok(claims) => claims,
                Err(err) => {
                    warn!(error = %err, "socket handshake refused");
                    let formatted = Self::format_error(err);
                    return Err(Box::new(formatted) as Box<dyn std::fmt::Display + Send>);
                }
            };

            let socket_ref = socketioxide::extract::SocketRef::from(socket.clone());
            socket_ref.extensions.insert(state.clone());
            socket_ref
                .extensions
                .insert(SocketUserContext::new(&claims));

            info!(
                socket_id = %socket_ref.id,
                user_id = %claims.sub,
                role = %claims.role,
                "socket authenticated"
            );

            state.socket_metrics.inc_connections();

            Ok(())
        })
    }
}

/// Pulls a token out of the handshake auth payload or the query string.
/// The auth payload may be a JSON object (`{ "token": ... }`), a bare
/// string, or absent; the query string uses `token=<jwt>`.
fn parse_handshake_token(auth: Option<&Value>, query: Option<&str>) -> Option<String> {
    if let Some(value) = auth {
        let text = if let Some(as_str) = value.as_str() {
            Some(as_str.to_string())
        } else {
            value
                .as_bytes()
                .and_then(|bytes| str::from_utf8(bytes.as_ref()).ok())
                .map(|text| text.to_string())
        };

        if let Some(text) = text {
            if let Some(token) = ingest_auth_text(&text) {
                return Some(token);
            }
        }
    }

    query.and_then(token_from_pairs)
}

fn ingest_auth_text(payload: &str) -> Option<String> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(json) = serde_json::from_str::<JsonValue>(trimmed) {
        return match json {
            JsonValue::Object(map) => map
                .iter()
                .find(|(key, _)| {
                    key.eq_ignore_ascii_case("token") || key.eq_ignore_ascii_case("authorization")
                })
                .and_then(|(_, v)| v.as_str())
                .and_then(|s| normalize_bearer(s).or_else(|| non_empty(s))),
            JsonValue::String(s) => normalize_bearer(&s).or_else(|| non_empty(&s)),
            _ => None,
        };
    }

    if trimmed.contains('=') {
        return token_from_pairs(trimmed);
    }

    normalize_bearer(trimmed).or_else(|| non_empty(trimmed))
}

fn token_from_pairs(input: &str) -> Option<String> {
    for pair in input.split('&') {
        let mut iter = pair.splitn(2, '=');
        let key = iter.next().unwrap_or_default();
        let value = iter.next().unwrap_or_default();
        if key.eq_ignore_ascii_case("token") {
            if let Some(token) = normalize_bearer(value).or_else(|| non_empty(value)) {
                return Some(token);
            }
        }
    }
    None
}

fn normalize_bearer(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.len() > 7 && trimmed[0..7].eq_ignore_ascii_case("bearer ") {
        non_empty(&trimmed[7..])
    } else {
        None
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
