//! Session credentials handed out by `verify-qr`.
//!
//! HS256 JWTs carrying the badge holder's id, role and event. The QR token
//! proves identity once; the session token is what the app sends afterwards.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::badge::Subject;
use crate::errors::AppError;
use crate::models::Role;
use crate::AppState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Attendee or booth id.
    pub sub: Uuid,
    pub role: Role,
    pub event_id: Uuid,
    pub iat: i64,
    pub exp: i64,
}

pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX).min(i64::MAX / 1000)),
        }
    }

    pub fn issue(&self, subject: &Subject) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: subject.entity_id,
            role: subject.role,
            event_id: subject.event_id,
            iat: now.timestamp(),
            exp: now
                .checked_add_signed(self.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
                .timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok(token)
    }

    pub fn decode(&self, token: &str) -> Result<SessionClaims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 30;
        decode::<SessionClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("session token rejected: {}", e);
                AppError::Unauthorized
            })
    }
}

/// Extractor for routes that require a badge-holder session.
pub struct AuthSession(pub SessionClaims);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(AppError::Unauthorized)?;

        state.sessions.decode(token).map(AuthSession)
    }
}
