// Bearer token verification shared by the REST surface and the socket handshake.

use axum::http::{HeaderMap, header::AUTHORIZATION};
use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::Error as JwtError,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AppError;

pub(crate) const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
}

impl TokenVerifier {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| AppError::unauthorized(format!("invalid token: {err}")))
    }

    pub(crate) fn authenticate(&self, headers: &HeaderMap) -> Result<Claims, AppError> {
        let token = extract_bearer_token(headers)
            .ok_or_else(|| AppError::unauthorized("missing bearer token"))?;
        self.verify(&token)
    }
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
}

impl TokenIssuer {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
        }
    }

    pub fn issue(&self, user_id: &str, role: &str, ttl_seconds: i64) -> Result<String, JwtError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            role: role.to_string(),
            iat: now,
            exp: now + ttl_seconds,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
    }
}

/// Resolves the signing secret from configuration. Without a configured
/// secret a transient random one is generated, which invalidates all
/// tokens across restarts.
pub fn resolve_auth_secret(configured: Option<&str>) -> Vec<u8> {
    match configured {
        Some(secret) if !secret.trim().is_empty() => secret.trim().as_bytes().to_vec(),
        _ => {
            warn!(
                "no auth secret configured; generated a transient secret, \
                 tokens will not survive a restart"
            );
            let secret: [u8; 32] = rand::rng().random();
            secret.to_vec()
        }
    }
}

pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    if trimmed.len() > 7 && trimmed[0..7].eq_ignore_ascii_case("bearer ") {
        let token = trimmed[7..].trim();
        if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        }
    } else {
        None
    }
}
