use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{is_admin, parse_id};
use crate::badge::archive::{self, ArchiveEntry};
use crate::badge::render;
use crate::badge::verifier::VerificationPayload;
use crate::errors::AppError;
use crate::models::{ApiResponse, Role};
use crate::AppState;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeFormat {
    #[default]
    Image,
    Json,
}

#[derive(Debug, Default, Deserialize)]
pub struct BadgeParams {
    pub size: Option<u32>,
    #[serde(default)]
    pub format: BadgeFormat,
}

#[derive(Debug, Serialize)]
pub struct BadgeJson {
    pub token: String,
    /// `data:image/png;base64,...`
    pub image: String,
    pub size: u32,
}

#[derive(Debug, Serialize)]
pub struct Reissued {
    pub token: String,
    #[serde(rename = "type")]
    pub role: Role,
    pub entity_id: Uuid,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// GET /api/qrcode/attendee/:id
pub async fn attendee_badge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<BadgeParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    badge(&state, Role::Attendee, &id, params, &headers).await
}

/// GET /api/qrcode/booth/:id
pub async fn booth_badge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<BadgeParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    badge(&state, Role::Booth, &id, params, &headers).await
}

async fn badge(
    state: &AppState,
    role: Role,
    raw_id: &str,
    params: BadgeParams,
    headers: &HeaderMap,
) -> Result<Response, AppError> {
    let entity_id = parse_id(raw_id, role.as_str())?;
    authorize_badge_access(state, role, entity_id, headers)?;

    let token = state.issuer.current_or_issue(role, entity_id).await?;
    let size = render::clamp_size(params.size, state.config.qr_default_size);
    let png = render_blocking(token.value.clone(), size).await?;

    match params.format {
        BadgeFormat::Image => Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response()),
        BadgeFormat::Json => Ok(Json(ApiResponse::ok(BadgeJson {
            token: token.value,
            image: render::to_data_url(&png),
            size,
        }))
        .into_response()),
    }
}

/// Badge images are handed out to the organizer or to the badge holder's own session.
fn authorize_badge_access(
    state: &AppState,
    role: Role,
    entity_id: Uuid,
    headers: &HeaderMap,
) -> Result<(), AppError> {
    if is_admin(state, headers) {
        return Ok(());
    }

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(AppError::Unauthorized)?;

    let claims = state.sessions.decode(bearer)?;
    if claims.role == role && claims.sub == entity_id {
        Ok(())
    } else {
        tracing::warn!(
            session_sub = %claims.sub,
            requested = %entity_id,
            "badge request for another entity"
        );
        Err(AppError::Unauthorized)
    }
}

async fn render_blocking(value: String, size: u32) -> Result<Vec<u8>, AppError> {
    let png = tokio::task::spawn_blocking(move || render::render_png(&value, size))
        .await
        .context("badge render task failed")??;
    Ok(png)
}

/// GET /api/qrcode/verify/:token
pub async fn verify_badge(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<ApiResponse<VerificationPayload>>, AppError> {
    let verification = state.verifier.verify(&token).await?;
    Ok(Json(ApiResponse::ok(verification.into_payload())))
}

/// POST /api/qrcode/attendee/:id/reissue
pub async fn reissue_attendee_badge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Reissued>>, AppError> {
    reissue(&state, Role::Attendee, &id).await
}

/// POST /api/qrcode/booth/:id/reissue
pub async fn reissue_booth_badge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Reissued>>, AppError> {
    reissue(&state, Role::Booth, &id).await
}

async fn reissue(
    state: &AppState,
    role: Role,
    raw_id: &str,
) -> Result<Json<ApiResponse<Reissued>>, AppError> {
    let entity_id = parse_id(raw_id, role.as_str())?;
    let token = state.issuer.issue(role, entity_id).await?;
    Ok(Json(ApiResponse::with_message(
        Reissued {
            token: token.value,
            role,
            entity_id,
            expires_at: token.expires_at,
        },
        "previous badge is no longer valid",
    )))
}

/// GET /api/qrcode/events/:id/attendees.zip
pub async fn export_attendee_badges(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    export(&state, Role::Attendee, &id).await
}

/// GET /api/qrcode/events/:id/booths.zip
pub async fn export_booth_badges(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    export(&state, Role::Booth, &id).await
}

async fn export(state: &AppState, role: Role, raw_event_id: &str) -> Result<Response, AppError> {
    let event_id = parse_id(raw_event_id, "event")?;
    let zip = build_archive(state, role, event_id).await?;

    let disposition = format!("attachment; filename=\"{}-{}s.zip\"", event_id, role.as_str());
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        zip,
    )
        .into_response())
}

/// ZIP of badge PNGs for every active attendee or booth of the event.
pub async fn build_archive(
    state: &AppState,
    role: Role,
    event_id: Uuid,
) -> Result<Vec<u8>, AppError> {
    let event = state
        .store
        .get_event(event_id)
        .await?
        .ok_or_else(|| AppError::not_found("event"))?;

    let entries = export_entries(state, role, event_id).await?;
    let count = entries.len();
    let size = state.config.qr_default_size;

    let zip = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<u8>> {
        let mut files = Vec::with_capacity(entries.len());
        for (file_name, value) in entries {
            files.push(ArchiveEntry {
                file_name,
                bytes: render::render_png(&value, size)?,
            });
        }
        archive::build_zip(&files)
    })
    .await
    .context("badge export task failed")??;

    tracing::info!(event = %event.name, role = %role, count, "exported badge archive");
    Ok(zip)
}

/// `(file name, token value)` for every active entity of the event, issuing tokens as needed.
async fn export_entries(
    state: &AppState,
    role: Role,
    event_id: Uuid,
) -> Result<Vec<(String, String)>, AppError> {
    let subjects: Vec<(Uuid, String)> = match role {
        Role::Attendee => state
            .store
            .list_attendees(event_id)
            .await?
            .into_iter()
            .map(|a| (a.id, a.name))
            .collect(),
        Role::Booth => state
            .store
            .list_booths(event_id)
            .await?
            .into_iter()
            .map(|b| (b.id, b.booth_number))
            .collect(),
    };

    let mut entries = Vec::with_capacity(subjects.len());
    for (id, label) in subjects {
        let token = state.issuer.current_or_issue(role, id).await?;
        entries.push((archive::entry_name(role.as_str(), &label, &id), token.value));
    }
    Ok(entries)
}
