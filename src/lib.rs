//! ExpoPass: QR badge issuance, verification and visit tracking for exhibitions.
//!
//! The binary in `main.rs` wires these modules to a PostgreSQL store; the
//! integration tests in `tests/` run them against `store::memory::MemoryStore`.

use std::sync::Arc;

use chrono::Duration;

pub mod api;
pub mod badge;
pub mod config;
pub mod errors;
pub mod models;
pub mod report;
pub mod scan;
pub mod session;
pub mod store;

use badge::{Issuer, Verifier};
use scan::{DedupPolicy, ScanRecorder};
use session::SessionKeys;
use store::ExpoStore;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub store: Arc<dyn ExpoStore>,
    pub issuer: Issuer,
    pub verifier: Verifier,
    pub recorder: ScanRecorder,
    pub sessions: SessionKeys,
    pub config: config::Config,
}

impl AppState {
    /// Build the services around one store handle. The caller owns the handle's
    /// lifecycle and should call `store.close()` on shutdown.
    pub fn new(store: Arc<dyn ExpoStore>, config: config::Config) -> Self {
        let token_ttl = config
            .qr_token_ttl_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds);
        let policy = DedupPolicy::new(config.scan_dedup_window_secs, config.scan_dedup_mode);

        let verifier = Verifier::new(store.clone());
        Self {
            issuer: Issuer::new(store.clone(), token_ttl),
            recorder: ScanRecorder::new(store.clone(), verifier.clone(), policy),
            verifier,
            sessions: SessionKeys::new(&config.session_secret, config.session_ttl_secs),
            store,
            config,
        }
    }
}
