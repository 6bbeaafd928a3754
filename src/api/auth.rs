use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::ApiJson;
use crate::badge::{load_subject, Verification};
use crate::errors::AppError;
use crate::models::{ApiResponse, Profile, Role};
use crate::session::{AuthSession, SessionClaims};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct VerifyQrRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SessionGrant {
    pub token: String,
    #[serde(rename = "type")]
    pub role: Role,
    pub data: Profile,
}

/// Exchange a scanned badge for a session token.
pub async fn verify_qr(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<VerifyQrRequest>,
) -> Result<Json<ApiResponse<SessionGrant>>, AppError> {
    let subject = match state.verifier.verify(&payload.token).await? {
        Verification::Valid(subject) => subject,
        Verification::Invalid(reason) => {
            tracing::info!(reason = ?reason, "verify-qr rejected");
            return Err(AppError::InvalidToken(reason.to_string()));
        }
    };

    let session = state.sessions.issue(&subject)?;
    tracing::info!(role = %subject.role, entity_id = %subject.entity_id, "session opened");

    let welcome = format!("welcome, {}", subject.label());
    Ok(Json(ApiResponse::with_message(
        SessionGrant {
            token: session,
            role: subject.role,
            data: subject.profile,
        },
        welcome,
    )))
}

#[derive(Debug, Serialize)]
pub struct Me {
    pub session: SessionClaims,
    pub profile: Profile,
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    AuthSession(claims): AuthSession,
) -> Result<Json<ApiResponse<Me>>, AppError> {
    // A session outlives deactivation only until the next lookup.
    let subject = load_subject(state.store.as_ref(), claims.role, claims.sub)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(Json(ApiResponse::ok(Me {
        session: claims,
        profile: subject.profile,
    })))
}
