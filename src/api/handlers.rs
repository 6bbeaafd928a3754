use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use super::{parse_id, ApiJson};
use crate::errors::AppError;
use crate::models::event::{NewAttendee, NewBooth, NewEvent};
use crate::models::{ApiResponse, Attendee, Booth, Event, Role};
use crate::AppState;

// -- Response types --

#[derive(Serialize)]
pub struct Registered<T> {
    #[serde(flatten)]
    pub entity: T,
    pub qr_token: String,
}

#[derive(Serialize)]
pub struct Deactivated {
    pub id: Uuid,
    pub tokens_revoked: u64,
}

fn require_text(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", field)));
    }
    Ok(())
}

async fn require_event(state: &AppState, event_id: Uuid) -> Result<Event, AppError> {
    state
        .store
        .get_event(event_id)
        .await?
        .ok_or_else(|| AppError::not_found("event"))
}

// -- Events --

pub async fn create_event(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<NewEvent>,
) -> Result<(StatusCode, Json<ApiResponse<Event>>), AppError> {
    require_text(&payload.name, "name")?;
    if let (Some(start), Some(end)) = (payload.starts_at, payload.ends_at) {
        if end < start {
            return Err(AppError::BadRequest("ends_at must not be before starts_at".into()));
        }
    }

    let event = state.store.create_event(&payload).await?;
    tracing::info!(event_id = %event.id, name = %event.name, "event created");
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(event))))
}

pub async fn list_events(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<Event>>>, AppError> {
    let events = state.store.list_events().await?;
    Ok(Json(ApiResponse::ok(events)))
}

pub async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Event>>, AppError> {
    let id = parse_id(&id, "event")?;
    let event = require_event(&state, id).await?;
    Ok(Json(ApiResponse::ok(event)))
}

// -- Attendees --

/// Registers the attendee and issues their first badge token.
pub async fn create_attendee(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
    ApiJson(mut payload): ApiJson<NewAttendee>,
) -> Result<(StatusCode, Json<ApiResponse<Registered<Attendee>>>), AppError> {
    let event_id = parse_id(&event_id, "event")?;
    require_event(&state, event_id).await?;
    require_text(&payload.name, "name")?;
    payload.event_id = event_id;

    let attendee = state.store.create_attendee(&payload).await?;
    let token = state.issuer.issue(Role::Attendee, attendee.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(Registered {
            entity: attendee,
            qr_token: token.value,
        })),
    ))
}

pub async fn list_attendees(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Attendee>>>, AppError> {
    let event_id = parse_id(&event_id, "event")?;
    require_event(&state, event_id).await?;
    let attendees = state.store.list_attendees(event_id).await?;
    Ok(Json(ApiResponse::ok(attendees)))
}

pub async fn get_attendee(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Attendee>>, AppError> {
    let id = parse_id(&id, "attendee")?;
    let attendee = state
        .store
        .get_attendee(id)
        .await?
        .ok_or_else(|| AppError::not_found("attendee"))?;
    Ok(Json(ApiResponse::ok(attendee)))
}

/// Deactivates the attendee and revokes their badge. Scan history is kept.
pub async fn delete_attendee(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Deactivated>>, AppError> {
    let id = parse_id(&id, "attendee")?;
    if !state.store.deactivate_attendee(id).await? {
        return Err(AppError::not_found("attendee"));
    }
    let tokens_revoked = state.issuer.revoke(Role::Attendee, id).await?;
    tracing::info!(attendee_id = %id, "attendee deactivated");
    Ok(Json(ApiResponse::ok(Deactivated { id, tokens_revoked })))
}

// -- Booths --

pub async fn create_booth(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
    ApiJson(mut payload): ApiJson<NewBooth>,
) -> Result<(StatusCode, Json<ApiResponse<Registered<Booth>>>), AppError> {
    let event_id = parse_id(&event_id, "event")?;
    require_event(&state, event_id).await?;
    require_text(&payload.booth_number, "booth_number")?;
    require_text(&payload.company_name, "company_name")?;
    payload.event_id = event_id;
    payload.booth_number = payload.booth_number.trim().to_string();

    let booth = state.store.create_booth(&payload).await?.ok_or_else(|| {
        AppError::Conflict(format!(
            "booth number '{}' is already taken in this event",
            payload.booth_number
        ))
    })?;
    let token = state.issuer.issue(Role::Booth, booth.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(Registered {
            entity: booth,
            qr_token: token.value,
        })),
    ))
}

pub async fn list_booths(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Booth>>>, AppError> {
    let event_id = parse_id(&event_id, "event")?;
    require_event(&state, event_id).await?;
    let booths = state.store.list_booths(event_id).await?;
    Ok(Json(ApiResponse::ok(booths)))
}

pub async fn get_booth(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Booth>>, AppError> {
    let id = parse_id(&id, "booth")?;
    let booth = state
        .store
        .get_booth(id)
        .await?
        .ok_or_else(|| AppError::not_found("booth"))?;
    Ok(Json(ApiResponse::ok(booth)))
}

pub async fn delete_booth(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Deactivated>>, AppError> {
    let id = parse_id(&id, "booth")?;
    if !state.store.deactivate_booth(id).await? {
        return Err(AppError::not_found("booth"));
    }
    let tokens_revoked = state.issuer.revoke(Role::Booth, id).await?;
    tracing::info!(booth_id = %id, "booth deactivated");
    Ok(Json(ApiResponse::ok(Deactivated { id, tokens_revoked })))
}
