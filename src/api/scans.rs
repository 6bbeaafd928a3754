use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::{parse_id, ApiJson};
use crate::errors::AppError;
use crate::models::scan::ScanFilter;
use crate::models::{ApiResponse, ScanRecord, ScanResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub attendee_token: String,
    pub booth_token: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NotesUpdate {
    pub notes: Option<String>,
}

/// POST /api/scans/scan
///
/// Holding both badge values is the credential; no session is required.
pub async fn record_scan(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ScanRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ScanResult>>), AppError> {
    let result = state
        .recorder
        .record(&req.attendee_token, &req.booth_token, req.notes.as_deref())
        .await?;

    let status = if result.is_first_visit {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let message = result.message.clone();
    Ok((status, Json(ApiResponse::with_message(result, message))))
}

/// GET /api/scans
pub async fn list_scans(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ScanFilter>,
) -> Result<Json<ApiResponse<Vec<ScanRecord>>>, AppError> {
    let scans = state.recorder.list(&filter).await?;
    Ok(Json(ApiResponse::ok(scans)))
}

/// PATCH /api/scans/:id/notes
pub async fn update_scan_notes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<NotesUpdate>,
) -> Result<Json<ApiResponse<ScanRecord>>, AppError> {
    let id = parse_id(&id, "scan")?;
    let scan = state.recorder.update_notes(id, body.notes.as_deref()).await?;
    Ok(Json(ApiResponse::ok(scan)))
}

/// DELETE /api/scans/:id
pub async fn delete_scan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let id = parse_id(&id, "scan")?;
    state.recorder.delete(id).await?;
    Ok(Json(ApiResponse {
        success: true,
        data: None,
        message: Some("scan deleted".into()),
    }))
}
