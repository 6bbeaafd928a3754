use std::sync::Arc;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use subtle::ConstantTimeEq;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::ApiResponse;
use crate::AppState;

pub mod analytics;
pub mod auth;
pub mod handlers;
pub mod qrcode;
pub mod scans;

/// The whole HTTP surface: health probes, `/api`, and the response-wide layers.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .nest("/api", router(state.clone()))
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.dashboard_origin))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(middleware::from_fn(security_headers_middleware))
}

/// Route table. All paths are relative; `app()` mounts this under `/api`.
pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public = Router::new()
        .route("/auth/verify-qr", post(auth::verify_qr))
        .route("/auth/me", get(auth::me))
        .route("/qrcode/attendee/:id", get(qrcode::attendee_badge))
        .route("/qrcode/booth/:id", get(qrcode::booth_badge))
        .route("/qrcode/verify/:token", get(qrcode::verify_badge))
        .route("/scans/scan", post(scans::record_scan));

    let admin = Router::new()
        .route(
            "/events",
            get(handlers::list_events).post(handlers::create_event),
        )
        .route("/events/:id", get(handlers::get_event))
        .route(
            "/events/:id/attendees",
            get(handlers::list_attendees).post(handlers::create_attendee),
        )
        .route(
            "/events/:id/booths",
            get(handlers::list_booths).post(handlers::create_booth),
        )
        .route(
            "/attendees/:id",
            get(handlers::get_attendee).delete(handlers::delete_attendee),
        )
        .route(
            "/booths/:id",
            get(handlers::get_booth).delete(handlers::delete_booth),
        )
        .route(
            "/qrcode/attendee/:id/reissue",
            post(qrcode::reissue_attendee_badge),
        )
        .route("/qrcode/booth/:id/reissue", post(qrcode::reissue_booth_badge))
        .route(
            "/qrcode/events/:id/attendees.zip",
            get(qrcode::export_attendee_badges),
        )
        .route(
            "/qrcode/events/:id/booths.zip",
            get(qrcode::export_booth_badges),
        )
        .route("/scans", get(scans::list_scans))
        .route("/scans/:id", delete(scans::delete_scan))
        .route("/scans/:id/notes", patch(scans::update_scan_notes))
        .route(
            "/reports/events/:id/summary",
            get(analytics::get_event_summary),
        )
        .route(
            "/reports/events/:id/attendees/ranking",
            get(analytics::get_attendance_ranking),
        )
        .route(
            "/reports/events/:id/booths/popularity",
            get(analytics::get_booth_popularity),
        )
        .route("/reports/events/:id/volume", get(analytics::get_scan_volume))
        .route("/reports/compare", get(analytics::compare_events))
        .layer(middleware::from_fn_with_state(state, admin_auth));

    public.merge(admin).fallback(fallback_404)
}

async fn fallback_404() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::failure("no such endpoint")),
    )
        .into_response()
}

/// JSON body extractor whose rejections use the `{success: false, message}` envelope.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e: JsonRejection| AppError::BadRequest(e.body_text()))?;
        Ok(ApiJson(value))
    }
}

pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| {
        tracing::warn!("invalid {} id: {}", what, raw);
        AppError::BadRequest(format!("invalid {} id", what))
    })
}

pub(crate) fn provided_admin_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| t.trim())
        })
}

pub(crate) fn is_admin(state: &AppState, headers: &HeaderMap) -> bool {
    provided_admin_key(headers)
        .map(|k| bool::from(k.as_bytes().ct_eq(state.config.admin_key.as_bytes())))
        .unwrap_or(false)
}

/// Middleware: validates `X-Admin-Key` (or a Bearer admin key) against the configured key.
async fn admin_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if is_admin(&state, req.headers()) {
        return Ok(next.run(req).await);
    }

    match provided_admin_key(req.headers()) {
        Some(k) => {
            // Never log the full key.
            let masked = if k.len() > 8 {
                format!("{}…{}", &k[..4], &k[k.len() - 4..])
            } else {
                "****".to_string()
            };
            tracing::warn!("admin API: invalid key (provided: '{}')", masked);
        }
        None => tracing::warn!("admin API: missing X-Admin-Key header"),
    }
    Err(AppError::Unauthorized)
}

fn cors_layer(dashboard_origin: &str) -> CorsLayer {
    let dashboard_origin = dashboard_origin.to_string();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            origin_str == dashboard_origin
                || origin_str.starts_with("http://localhost:")
                || origin_str.starts_with("http://127.0.0.1:")
        }))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("authorization"),
            HeaderName::from_static("x-admin-key"),
            HeaderName::from_static("x-request-id"),
        ])
        .allow_credentials(true)
}

/// Middleware: injects a unique X-Request-Id into every response.
async fn request_id_middleware(req: Request, next: Next) -> Response {
    let req_id = Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    // Badge images and session tokens must not be cached by shared proxies.
    headers.insert("cache-control", HeaderValue::from_static("no-store"));
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));
    headers.remove("server");

    resp
}
