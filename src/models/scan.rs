use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::{AttendeeProfile, BoothProfile};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScanRecord {
    pub id: Uuid,
    pub attendee_id: Uuid,
    pub booth_id: Uuid,
    pub event_id: Uuid,
    pub scanned_at: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewScan {
    pub attendee_id: Uuid,
    pub booth_id: Uuid,
    pub event_id: Uuid,
    pub scanned_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// What the store did with a scan request.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub record: ScanRecord,
    /// `false` when the same pair was already recorded inside the dedup window.
    pub is_first_visit: bool,
    /// `false` when a repeat was suppressed and `record` is the earlier row.
    pub inserted: bool,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ScanFilter {
    pub event_id: Option<Uuid>,
    pub attendee_id: Option<Uuid>,
    pub booth_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ScanFilter {
    pub const DEFAULT_LIMIT: i64 = 100;
    pub const MAX_LIMIT: i64 = 1000;

    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// Returned to the scanning device after a successful record call.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub scan: ScanRecord,
    pub attendee: AttendeeProfile,
    pub booth: BoothProfile,
    pub is_first_visit: bool,
    pub message: String,
}
