use std::fmt;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::{
    auth::Claims,
    error::{AppError, UserFriendlyPayload},
};

/// Identity bound to a socket at handshake time; immutable for the
/// connection lifetime.
#[derive(Clone)]
pub struct SocketUserContext {
    pub user_id: String,
    pub role: String,
}

impl SocketUserContext {
    pub fn new(claims: &Claims) -> Self {
        Self {
            user_id: claims.sub.clone(),
            role: claims.role.clone(),
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum SocketAck<T> {
    Data { data: T },
    Error { error: SocketAckError },
}

impl<T> SocketAck<T> {
    pub fn ok(data: T) -> Self {
        SocketAck::Data { data }
    }

    pub fn from_error(error: AppError) -> Self {
        SocketAck::Error {
            error: SocketAckError::from_app_error(error),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SocketAckError {
    pub status: u16,
    pub code: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl SocketAckError {
    pub fn from_app_error(error: AppError) -> Self {
        let (status, payload) = error.into_payload();
        Self::from_payload(payload, status.as_u16())
    }

    fn from_payload(payload: UserFriendlyPayload, status: u16) -> Self {
        Self {
            status,
            code: payload.code,
            error_type: payload.error_type,
            name: payload.name,
            message: payload.message,
            data: payload.data,
        }
    }
}

impl fmt::Display for SocketAckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
