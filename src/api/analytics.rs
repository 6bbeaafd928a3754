use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::parse_id;
use crate::errors::AppError;
use crate::models::analytics::{AttendanceRank, BoothPopularity, EventSummary, VolumeStat};
use crate::models::ApiResponse;
use crate::report;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CompareParams {
    /// Comma-separated event ids.
    pub event_ids: String,
}

/// GET /api/reports/events/:id/summary
pub async fn get_event_summary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<EventSummary>>, AppError> {
    let event_id = parse_id(&id, "event")?;
    let summary = report::event_summary(state.store.as_ref(), event_id).await?;
    Ok(Json(ApiResponse::ok(summary)))
}

/// GET /api/reports/events/:id/attendees/ranking: most active attendees first
pub async fn get_attendance_ranking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<LimitParams>,
) -> Result<Json<ApiResponse<Vec<AttendanceRank>>>, AppError> {
    let event_id = parse_id(&id, "event")?;
    require_event(&state, event_id).await?;
    let ranking = state
        .store
        .attendance_ranking(event_id, report::ranking_limit(params.limit))
        .await?;
    Ok(Json(ApiResponse::ok(ranking)))
}

/// GET /api/reports/events/:id/booths/popularity: most visited booths first
pub async fn get_booth_popularity(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<LimitParams>,
) -> Result<Json<ApiResponse<Vec<BoothPopularity>>>, AppError> {
    let event_id = parse_id(&id, "event")?;
    require_event(&state, event_id).await?;
    let popularity = state
        .store
        .booth_popularity(event_id, report::ranking_limit(params.limit))
        .await?;
    Ok(Json(ApiResponse::ok(popularity)))
}

/// GET /api/reports/events/:id/volume: scans bucketed by hour
pub async fn get_scan_volume(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Vec<VolumeStat>>>, AppError> {
    let event_id = parse_id(&id, "event")?;
    require_event(&state, event_id).await?;
    let volume = state.store.scan_volume(event_id).await?;
    Ok(Json(ApiResponse::ok(volume)))
}

/// GET /api/reports/compare?event_ids=a,b,c
pub async fn compare_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CompareParams>,
) -> Result<Json<ApiResponse<Vec<EventSummary>>>, AppError> {
    let ids = params
        .event_ids
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_id(s, "event"))
        .collect::<Result<Vec<_>, _>>()?;

    let summaries = report::compare_events(state.store.as_ref(), &ids).await?;
    Ok(Json(ApiResponse::ok(summaries)))
}

async fn require_event(state: &AppState, event_id: uuid::Uuid) -> Result<(), AppError> {
    state
        .store
        .get_event(event_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::not_found("event"))
}
