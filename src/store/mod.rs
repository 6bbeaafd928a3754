pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::DedupMode;
use crate::models::analytics::{AttendanceRank, BoothPopularity, EventCounts, VolumeStat};
use crate::models::event::{NewAttendee, NewBooth, NewEvent};
use crate::models::scan::{NewScan, ScanFilter, ScanOutcome};
use crate::models::{Attendee, Booth, Event, QrToken, Role, ScanRecord};

/// Persistence seam shared by the issuer, verifier, recorder and the admin API.
/// Implementations: `PgStore` (PostgreSQL) and `MemoryStore` (tests, `serve --memory`).
#[async_trait]
pub trait ExpoStore: Send + Sync {
    // -- Events --

    async fn create_event(&self, event: &NewEvent) -> anyhow::Result<Event>;

    async fn get_event(&self, id: Uuid) -> anyhow::Result<Option<Event>>;

    async fn list_events(&self) -> anyhow::Result<Vec<Event>>;

    // -- Attendees / Booths --

    async fn create_attendee(&self, attendee: &NewAttendee) -> anyhow::Result<Attendee>;

    /// Active attendees only.
    async fn get_attendee(&self, id: Uuid) -> anyhow::Result<Option<Attendee>>;

    async fn list_attendees(&self, event_id: Uuid) -> anyhow::Result<Vec<Attendee>>;

    async fn deactivate_attendee(&self, id: Uuid) -> anyhow::Result<bool>;

    /// Returns `None` when the booth number is already taken within the event.
    async fn create_booth(&self, booth: &NewBooth) -> anyhow::Result<Option<Booth>>;

    /// Active booths only.
    async fn get_booth(&self, id: Uuid) -> anyhow::Result<Option<Booth>>;

    async fn list_booths(&self, event_id: Uuid) -> anyhow::Result<Vec<Booth>>;

    async fn deactivate_booth(&self, id: Uuid) -> anyhow::Result<bool>;

    // -- QR tokens --

    /// Revokes every live token of `(token.role, token.entity_id)` and inserts `token`,
    /// atomically. Returns `false` without changing anything if `token.value` already exists.
    async fn replace_token(&self, token: &QrToken) -> anyhow::Result<bool>;

    /// Returns the entity's live token if it is unexpired at `token.issued_at`;
    /// otherwise behaves like `replace_token` and returns `token` once stored.
    /// `None` means `token.value` already exists and nothing changed.
    async fn live_or_replace_token(&self, token: &QrToken) -> anyhow::Result<Option<QrToken>>;

    /// Live (non-revoked) token by value. Expiry is the caller's concern.
    async fn find_token(&self, value: &str) -> anyhow::Result<Option<QrToken>>;

    async fn revoke_tokens_for(&self, role: Role, entity_id: Uuid) -> anyhow::Result<u64>;

    // -- Scans --

    /// Check-then-insert serialized per `(attendee_id, booth_id)`.
    ///
    /// A scan of the same pair at or after `recent_since` makes this a repeat visit.
    /// `recent_since = None` disables the check.
    async fn record_scan(
        &self,
        scan: &NewScan,
        recent_since: Option<DateTime<Utc>>,
        mode: DedupMode,
    ) -> anyhow::Result<ScanOutcome>;

    /// Newest first.
    async fn list_scans(&self, filter: &ScanFilter) -> anyhow::Result<Vec<ScanRecord>>;

    async fn update_scan_notes(
        &self,
        id: Uuid,
        notes: Option<&str>,
    ) -> anyhow::Result<Option<ScanRecord>>;

    async fn delete_scan(&self, id: Uuid) -> anyhow::Result<bool>;

    // -- Reports --

    async fn event_counts(&self, event_id: Uuid) -> anyhow::Result<EventCounts>;

    /// Ordered by visit count, then distinct booths, then name.
    async fn attendance_ranking(
        &self,
        event_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<AttendanceRank>>;

    /// Ordered by visit count, then distinct visitors, then booth number.
    async fn booth_popularity(
        &self,
        event_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<BoothPopularity>>;

    /// Scan counts bucketed by hour, oldest first.
    async fn scan_volume(&self, event_id: Uuid) -> anyhow::Result<Vec<VolumeStat>>;

    /// Release connections. Called once on shutdown.
    async fn close(&self) {}
}
