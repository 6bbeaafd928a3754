use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct VolumeStat {
    pub bucket: DateTime<Utc>,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttendanceRank {
    pub attendee_id: Uuid,
    pub name: String,
    pub company: Option<String>,
    pub visit_count: i64,
    pub unique_booths: i64,
    pub last_visit: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BoothPopularity {
    pub booth_id: Uuid,
    pub booth_number: String,
    pub company_name: String,
    pub visit_count: i64,
    pub unique_visitors: i64,
}

/// Raw per-event counters as produced by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventCounts {
    pub total_attendees: i64,
    pub total_booths: i64,
    pub total_scans: i64,
    pub unique_visitors: i64,
    pub active_booths: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    pub event_id: Uuid,
    pub event_name: String,
    #[serde(flatten)]
    pub counts: EventCounts,
    /// Share of registered attendees with at least one recorded visit.
    pub engagement_rate: f64,
    pub avg_visits_per_visitor: f64,
    pub avg_visits_per_booth: f64,
}
