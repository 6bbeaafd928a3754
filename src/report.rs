//! Organizer-facing aggregates over scans.

use uuid::Uuid;

use crate::errors::AppError;
use crate::models::analytics::{EventCounts, EventSummary};
use crate::models::Event;
use crate::store::ExpoStore;

pub const DEFAULT_RANKING_LIMIT: i64 = 20;
pub const MAX_RANKING_LIMIT: i64 = 500;
pub const MAX_COMPARE_EVENTS: usize = 10;

pub fn ranking_limit(requested: Option<i64>) -> i64 {
    requested
        .unwrap_or(DEFAULT_RANKING_LIMIT)
        .clamp(1, MAX_RANKING_LIMIT)
}

fn ratio(num: i64, den: i64) -> f64 {
    if den <= 0 {
        0.0
    } else {
        // two decimals is plenty for a dashboard
        ((num as f64 / den as f64) * 100.0).round() / 100.0
    }
}

pub fn summarize(event: &Event, counts: EventCounts) -> EventSummary {
    EventSummary {
        event_id: event.id,
        event_name: event.name.clone(),
        engagement_rate: ratio(counts.unique_visitors, counts.total_attendees),
        avg_visits_per_visitor: ratio(counts.total_scans, counts.unique_visitors),
        avg_visits_per_booth: ratio(counts.total_scans, counts.total_booths),
        counts,
    }
}

pub async fn event_summary(store: &dyn ExpoStore, event_id: Uuid) -> Result<EventSummary, AppError> {
    let event = store
        .get_event(event_id)
        .await?
        .ok_or_else(|| AppError::not_found("event"))?;
    let counts = store.event_counts(event_id).await?;
    Ok(summarize(&event, counts))
}

/// Side-by-side summaries, in the order requested. Duplicates are collapsed.
pub async fn compare_events(
    store: &dyn ExpoStore,
    event_ids: &[Uuid],
) -> Result<Vec<EventSummary>, AppError> {
    let mut unique: Vec<Uuid> = Vec::with_capacity(event_ids.len());
    for id in event_ids {
        if !unique.contains(id) {
            unique.push(*id);
        }
    }

    if unique.is_empty() {
        return Err(AppError::BadRequest("at least one event id is required".into()));
    }
    if unique.len() > MAX_COMPARE_EVENTS {
        return Err(AppError::BadRequest(format!(
            "at most {} events can be compared at once",
            MAX_COMPARE_EVENTS
        )));
    }

    let mut summaries = Vec::with_capacity(unique.len());
    for id in unique {
        summaries.push(event_summary(store, id).await?);
    }
    Ok(summaries)
}
