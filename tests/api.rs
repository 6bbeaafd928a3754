//! HTTP-level tests: drive the full router with `tower::ServiceExt::oneshot`
//! against the in-memory store.
//!
//! These pin the wire contract the scanner app and the organizer dashboard
//! depend on: envelope shapes, status codes, admin key enforcement, and the
//! badge/scan/report endpoints end to end.

use std::io::Cursor;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use expopass::config::Config;
use expopass::store::memory::MemoryStore;
use expopass::store::ExpoStore;
use expopass::{api, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

const ADMIN_KEY: &str = "test-admin-key-0123456789";

fn app() -> Router {
    let store: Arc<dyn ExpoStore> = Arc::new(MemoryStore::new());
    let config = Config {
        admin_key: ADMIN_KEY.into(),
        session_secret: "test-session-secret".into(),
        ..Config::default()
    };
    api::app(Arc::new(AppState::new(store, config)))
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or_else(|e| {
            panic!(
                "body is not JSON ({}): {}",
                e,
                String::from_utf8_lossy(&self.body)
            )
        })
    }
}

async fn send(app: &Router, req: Request<Body>) -> Reply {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    Reply {
        status,
        headers,
        body,
    }
}

fn request(method: Method, uri: &str, body: Option<Value>) -> axum::http::request::Builder {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(_) => builder.header(header::CONTENT_TYPE, "application/json"),
        None => builder,
    }
}

async fn public(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Reply {
    let req = request(method, uri, body.clone())
        .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
        .unwrap();
    send(app, req).await
}

async fn admin(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Reply {
    let req = request(method, uri, body.clone())
        .header("x-admin-key", ADMIN_KEY)
        .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
        .unwrap();
    send(app, req).await
}

async fn bearer(app: &Router, uri: &str, token: &str) -> Reply {
    let req = Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    send(app, req).await
}

/// Event with registered attendees and booths. Returns ids and badge tokens.
struct Floor {
    event_id: String,
    attendees: Vec<(String, String)>,
    booths: Vec<(String, String)>,
}

async fn floor(app: &Router, attendees: &[&str], booths: &[&str]) -> Floor {
    let ev = admin(app, Method::POST, "/api/events", Some(json!({"name": "Spring Expo"}))).await;
    assert_eq!(ev.status, StatusCode::CREATED);
    let event_id = ev.json()["data"]["id"].as_str().unwrap().to_string();

    let mut floor = Floor {
        event_id,
        attendees: Vec::new(),
        booths: Vec::new(),
    };

    for name in attendees {
        let r = admin(
            app,
            Method::POST,
            &format!("/api/events/{}/attendees", floor.event_id),
            Some(json!({"name": name, "company": "Acme"})),
        )
        .await;
        assert_eq!(r.status, StatusCode::CREATED);
        let data = &r.json()["data"];
        floor.attendees.push((
            data["id"].as_str().unwrap().to_string(),
            data["qr_token"].as_str().unwrap().to_string(),
        ));
    }

    for number in booths {
        let r = admin(
            app,
            Method::POST,
            &format!("/api/events/{}/booths", floor.event_id),
            Some(json!({"booth_number": number, "company_name": "Globex"})),
        )
        .await;
        assert_eq!(r.status, StatusCode::CREATED);
        let data = &r.json()["data"];
        floor.booths.push((
            data["id"].as_str().unwrap().to_string(),
            data["qr_token"].as_str().unwrap().to_string(),
        ));
    }

    floor
}

async fn scan(app: &Router, attendee_token: &str, booth_token: &str) -> Reply {
    public(
        app,
        Method::POST,
        "/api/scans/scan",
        Some(json!({"attendee_token": attendee_token, "booth_token": booth_token})),
    )
    .await
}

mod envelope_tests {
    use super::*;

    #[tokio::test]
    async fn test_healthz() {
        let app = app();
        let r = public(&app, Method::GET, "/healthz", None).await;
        assert_eq!(r.status, StatusCode::OK);
        assert_eq!(r.body, b"ok");
    }

    #[tokio::test]
    async fn test_unknown_route_uses_failure_envelope() {
        let app = app();
        let r = public(&app, Method::GET, "/api/nope", None).await;
        assert_eq!(r.status, StatusCode::NOT_FOUND);
        assert_eq!(r.json()["success"], false);
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let app = app();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/scans/scan")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let r = send(&app, req).await;
        assert_eq!(r.status, StatusCode::BAD_REQUEST);
        let body = r.json();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_response_headers() {
        let app = app();
        let r = public(&app, Method::GET, "/healthz", None).await;
        assert!(r.headers.contains_key("x-request-id"));
        assert_eq!(r.headers["x-content-type-options"], "nosniff");
        assert_eq!(r.headers["cache-control"], "no-store");
    }

    #[tokio::test]
    async fn test_invalid_path_id_is_bad_request() {
        let app = app();
        let r = admin(&app, Method::GET, "/api/events/not-a-uuid", None).await;
        assert_eq!(r.status, StatusCode::BAD_REQUEST);
        assert_eq!(r.json()["success"], false);
    }
}

mod admin_auth_tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_rejected() {
        let app = app();
        let r = public(&app, Method::GET, "/api/events", None).await;
        assert_eq!(r.status, StatusCode::UNAUTHORIZED);
        let body = r.json();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "unauthorized");
    }

    #[tokio::test]
    async fn test_wrong_key_rejected() {
        let app = app();
        let req = Request::builder()
            .uri("/api/events")
            .header("x-admin-key", "wrong-key-wrong-key")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, req).await.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_bearer_admin_key_accepted() {
        let app = app();
        let r = bearer(&app, "/api/events", ADMIN_KEY).await;
        assert_eq!(r.status, StatusCode::OK);
        let body = r.json();
        assert_eq!(body["success"], true);
        assert!(body["data"].as_array().unwrap().is_empty());
    }
}

mod registration_tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_booth_number_conflicts() {
        let app = app();
        let f = floor(&app, &[], &["A-1"]).await;
        let r = admin(
            &app,
            Method::POST,
            &format!("/api/events/{}/booths", f.event_id),
            Some(json!({"booth_number": "A-1", "company_name": "Initech"})),
        )
        .await;
        assert_eq!(r.status, StatusCode::CONFLICT);
        assert_eq!(r.json()["code"], "conflict");
    }

    #[tokio::test]
    async fn test_attendee_for_unknown_event_not_found() {
        let app = app();
        let r = admin(
            &app,
            Method::POST,
            &format!("/api/events/{}/attendees", uuid::Uuid::new_v4()),
            Some(json!({"name": "Ada"})),
        )
        .await;
        assert_eq!(r.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let app = app();
        let f = floor(&app, &[], &[]).await;
        let r = admin(
            &app,
            Method::POST,
            &format!("/api/events/{}/attendees", f.event_id),
            Some(json!({"name": "   "})),
        )
        .await;
        assert_eq!(r.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_attendee_revokes_badge() {
        let app = app();
        let f = floor(&app, &["Ada"], &[]).await;
        let (id, token) = &f.attendees[0];

        let r = admin(&app, Method::DELETE, &format!("/api/attendees/{}", id), None).await;
        assert_eq!(r.status, StatusCode::OK);
        assert_eq!(r.json()["data"]["tokens_revoked"], 1);

        let r = public(&app, Method::GET, &format!("/api/qrcode/verify/{}", token), None).await;
        assert_eq!(r.json()["data"]["valid"], false);

        let r = admin(&app, Method::GET, &format!("/api/attendees/{}", id), None).await;
        assert_eq!(r.status, StatusCode::NOT_FOUND);

        let r = admin(&app, Method::GET, &format!("/api/events/{}/attendees", f.event_id), None).await;
        assert!(r.json()["data"].as_array().unwrap().is_empty());
    }
}

mod session_tests {
    use super::*;

    async fn login(app: &Router, token: &str) -> Reply {
        public(app, Method::POST, "/api/auth/verify-qr", Some(json!({"token": token}))).await
    }

    #[tokio::test]
    async fn test_verify_qr_returns_session_and_profile() {
        let app = app();
        let f = floor(&app, &["Ada Lovelace"], &[]).await;

        let r = login(&app, &f.attendees[0].1).await;
        assert_eq!(r.status, StatusCode::OK);
        let body = r.json();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["type"], "attendee");
        assert_eq!(body["data"]["data"]["name"], "Ada Lovelace");
        assert_eq!(body["message"], "welcome, Ada Lovelace");
        let session = body["data"]["token"].as_str().unwrap();

        let me = bearer(&app, "/api/auth/me", session).await;
        assert_eq!(me.status, StatusCode::OK);
        let me = me.json();
        assert_eq!(me["data"]["session"]["sub"], f.attendees[0].0.as_str());
        assert_eq!(me["data"]["profile"]["name"], "Ada Lovelace");
    }

    #[tokio::test]
    async fn test_verify_qr_rejects_unknown_token() {
        let app = app();
        let r = login(&app, "xp1_not-a-real-badge").await;
        assert_eq!(r.status, StatusCode::UNAUTHORIZED);
        let body = r.json();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "invalid_token");
    }

    #[tokio::test]
    async fn test_me_requires_session() {
        let app = app();
        let r = public(&app, Method::GET, "/api/auth/me", None).await;
        assert_eq!(r.status, StatusCode::UNAUTHORIZED);
        let r = bearer(&app, "/api/auth/me", "garbage").await;
        assert_eq!(r.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_badge_json_for_own_session_only() {
        let app = app();
        let f = floor(&app, &["Ada", "Grace"], &[]).await;
        let session = login(&app, &f.attendees[0].1).await.json()["data"]["token"]
            .as_str()
            .unwrap()
            .to_string();

        let own = bearer(
            &app,
            &format!("/api/qrcode/attendee/{}?format=json", f.attendees[0].0),
            &session,
        )
        .await;
        assert_eq!(own.status, StatusCode::OK);
        let data = &own.json()["data"];
        assert_eq!(data["token"], f.attendees[0].1.as_str());
        assert_eq!(data["size"], 300);
        assert!(data["image"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));

        let other = bearer(
            &app,
            &format!("/api/qrcode/attendee/{}?format=json", f.attendees[1].0),
            &session,
        )
        .await;
        assert_eq!(other.status, StatusCode::UNAUTHORIZED);

        let anon = public(
            &app,
            Method::GET,
            &format!("/api/qrcode/attendee/{}", f.attendees[0].0),
            None,
        )
        .await;
        assert_eq!(anon.status, StatusCode::UNAUTHORIZED);
    }
}

mod qrcode_tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G'];

    #[tokio::test]
    async fn test_admin_gets_png_badge() {
        let app = app();
        let f = floor(&app, &[], &["B-7"]).await;
        let r = admin(
            &app,
            Method::GET,
            &format!("/api/qrcode/booth/{}?size=128", f.booths[0].0),
            None,
        )
        .await;
        assert_eq!(r.status, StatusCode::OK);
        assert_eq!(r.headers[header::CONTENT_TYPE], "image/png");
        assert!(r.body.starts_with(PNG_MAGIC));
    }

    #[tokio::test]
    async fn test_verify_endpoint_shapes() {
        let app = app();
        let f = floor(&app, &[], &["B-7"]).await;

        let r = public(
            &app,
            Method::GET,
            &format!("/api/qrcode/verify/{}", f.booths[0].1),
            None,
        )
        .await;
        let data = &r.json()["data"];
        assert_eq!(data["valid"], true);
        assert_eq!(data["type"], "booth");
        assert_eq!(data["entity_id"], f.booths[0].0.as_str());
        assert_eq!(data["event_id"], f.event_id.as_str());
        assert_eq!(data["info"]["booth_number"], "B-7");

        let r = public(&app, Method::GET, "/api/qrcode/verify/xp1_bogus", None).await;
        assert_eq!(r.status, StatusCode::OK);
        let data = &r.json()["data"];
        assert_eq!(data["valid"], false);
        assert_eq!(data["reason"], "unknown");
    }

    #[tokio::test]
    async fn test_reissue_invalidates_old_badge() {
        let app = app();
        let f = floor(&app, &["Ada"], &[]).await;
        let (id, old) = &f.attendees[0];

        let r = admin(
            &app,
            Method::POST,
            &format!("/api/qrcode/attendee/{}/reissue", id),
            None,
        )
        .await;
        assert_eq!(r.status, StatusCode::OK);
        let fresh = r.json()["data"]["token"].as_str().unwrap().to_string();
        assert_ne!(&fresh, old);

        let r = public(&app, Method::GET, &format!("/api/qrcode/verify/{}", old), None).await;
        assert_eq!(r.json()["data"]["valid"], false);
        let r = public(&app, Method::GET, &format!("/api/qrcode/verify/{}", fresh), None).await;
        assert_eq!(r.json()["data"]["valid"], true);
    }

    #[tokio::test]
    async fn test_attendee_zip_export() {
        let app = app();
        let f = floor(&app, &["Ada", "Grace", "Linus"], &["A-1"]).await;

        let r = admin(
            &app,
            Method::GET,
            &format!("/api/qrcode/events/{}/attendees.zip", f.event_id),
            None,
        )
        .await;
        assert_eq!(r.status, StatusCode::OK);
        assert_eq!(r.headers[header::CONTENT_TYPE], "application/zip");

        let archive = zip::ZipArchive::new(Cursor::new(r.body)).unwrap();
        assert_eq!(archive.len(), 3);
        assert!(archive.file_names().all(|n| n.starts_with("attendee_")));
    }
}

mod scan_tests {
    use super::*;

    #[tokio::test]
    async fn test_first_visit_then_repeat() {
        let app = app();
        let f = floor(&app, &["Ada"], &["A-1"]).await;

        let first = scan(&app, &f.attendees[0].1, &f.booths[0].1).await;
        assert_eq!(first.status, StatusCode::CREATED);
        let body = first.json();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["is_first_visit"], true);
        assert_eq!(body["data"]["attendee"]["name"], "Ada");
        assert_eq!(body["data"]["booth"]["booth_number"], "A-1");
        assert!(body["message"].is_string());

        let again = scan(&app, &f.attendees[0].1, &f.booths[0].1).await;
        assert_eq!(again.status, StatusCode::OK);
        assert_eq!(again.json()["data"]["is_first_visit"], false);

        let list = admin(&app, Method::GET, "/api/scans", None).await;
        assert_eq!(list.json()["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_two_attendees_is_invalid_pair() {
        let app = app();
        let f = floor(&app, &["Ada", "Grace"], &[]).await;

        let r = scan(&app, &f.attendees[0].1, &f.attendees[1].1).await;
        assert_eq!(r.status, StatusCode::UNPROCESSABLE_ENTITY);
        let body = r.json();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "invalid_pair");

        let list = admin(&app, Method::GET, "/api/scans", None).await;
        assert!(list.json()["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notes_update_and_delete() {
        let app = app();
        let f = floor(&app, &["Ada"], &["A-1"]).await;
        let id = scan(&app, &f.attendees[0].1, &f.booths[0].1).await.json()["data"]["scan"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let r = admin(
            &app,
            Method::PATCH,
            &format!("/api/scans/{}/notes", id),
            Some(json!({"notes": "wants a demo"})),
        )
        .await;
        assert_eq!(r.status, StatusCode::OK);
        assert_eq!(r.json()["data"]["notes"], "wants a demo");

        let r = admin(&app, Method::DELETE, &format!("/api/scans/{}", id), None).await;
        assert_eq!(r.status, StatusCode::OK);
        let r = admin(&app, Method::DELETE, &format!("/api/scans/{}", id), None).await;
        assert_eq!(r.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_filters_by_booth() {
        let app = app();
        let f = floor(&app, &["Ada"], &["A-1", "A-2"]).await;
        scan(&app, &f.attendees[0].1, &f.booths[0].1).await;
        scan(&app, &f.attendees[0].1, &f.booths[1].1).await;

        let r = admin(
            &app,
            Method::GET,
            &format!("/api/scans?booth_id={}", f.booths[1].0),
            None,
        )
        .await;
        let rows = r.json()["data"].as_array().unwrap().clone();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["booth_id"], f.booths[1].0.as_str());
    }
}

mod report_tests {
    use super::*;

    /// Ada visits A-1 and A-2, Grace visits A-2, Linus visits nothing.
    async fn busy_floor(app: &Router) -> Floor {
        let f = floor(app, &["Ada", "Grace", "Linus"], &["A-1", "A-2", "A-3"]).await;
        scan(app, &f.attendees[0].1, &f.booths[0].1).await;
        scan(app, &f.attendees[0].1, &f.booths[1].1).await;
        scan(app, &f.attendees[1].1, &f.booths[1].1).await;
        f
    }

    #[tokio::test]
    async fn test_summary_totals() {
        let app = app();
        let f = busy_floor(&app).await;
        let r = admin(
            &app,
            Method::GET,
            &format!("/api/reports/events/{}/summary", f.event_id),
            None,
        )
        .await;
        let data = &r.json()["data"];
        assert_eq!(data["event_name"], "Spring Expo");
        assert_eq!(data["total_attendees"], 3);
        assert_eq!(data["total_booths"], 3);
        assert_eq!(data["total_scans"], 3);
        assert_eq!(data["unique_visitors"], 2);
        assert_eq!(data["active_booths"], 2);
        assert_eq!(data["engagement_rate"], 0.67);
    }

    #[tokio::test]
    async fn test_popularity_and_ranking_order() {
        let app = app();
        let f = busy_floor(&app).await;

        let r = admin(
            &app,
            Method::GET,
            &format!("/api/reports/events/{}/booths/popularity", f.event_id),
            None,
        )
        .await;
        let booths: Vec<String> = r.json()["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["booth_number"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(booths, ["A-2", "A-1", "A-3"]);

        let r = admin(
            &app,
            Method::GET,
            &format!("/api/reports/events/{}/attendees/ranking?limit=2", f.event_id),
            None,
        )
        .await;
        let ranking = r.json()["data"].as_array().unwrap().clone();
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0]["name"], "Ada");
        assert_eq!(ranking[0]["visit_count"], 2);
        assert_eq!(ranking[1]["name"], "Grace");
    }

    #[tokio::test]
    async fn test_volume_counts_all_scans() {
        let app = app();
        let f = busy_floor(&app).await;
        let r = admin(
            &app,
            Method::GET,
            &format!("/api/reports/events/{}/volume", f.event_id),
            None,
        )
        .await;
        let total: i64 = r.json()["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["count"].as_i64().unwrap())
            .sum();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn test_compare_events() {
        let app = app();
        let busy = busy_floor(&app).await;
        let quiet = floor(&app, &["Ada"], &["Z-1"]).await;

        let r = admin(
            &app,
            Method::GET,
            &format!("/api/reports/compare?event_ids={},{}", busy.event_id, quiet.event_id),
            None,
        )
        .await;
        assert_eq!(r.status, StatusCode::OK);
        let rows = r.json()["data"].as_array().unwrap().clone();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["total_scans"], 3);
        assert_eq!(rows[1]["total_scans"], 0);

        let r = admin(&app, Method::GET, "/api/reports/compare?event_ids=nope", None).await;
        assert_eq!(r.status, StatusCode::BAD_REQUEST);
    }
}
