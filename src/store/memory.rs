//! In-process store backed by `DashMap` tables.
//!
//! Tokens and scans sit behind one async mutex each so that the
//! revoke-then-insert and check-then-insert sequences are atomic, matching the
//! transactional guarantees of `PgStore`.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::ExpoStore;
use crate::config::DedupMode;
use crate::models::analytics::{AttendanceRank, BoothPopularity, EventCounts, VolumeStat};
use crate::models::event::{NewAttendee, NewBooth, NewEvent};
use crate::models::scan::{NewScan, ScanFilter, ScanOutcome};
use crate::models::{Attendee, Booth, Event, QrToken, Role, ScanRecord};

#[derive(Default)]
struct TokenTable {
    by_value: HashMap<String, QrToken>,
    live: HashMap<(Role, Uuid), String>,
}

impl TokenTable {
    /// Revoke the live token of the entity and insert `token` in its place.
    fn swap_live(&mut self, token: &QrToken) -> bool {
        if self.by_value.contains_key(&token.value) {
            return false;
        }

        let key = (token.role, token.entity_id);
        if let Some(old) = self.live.remove(&key) {
            if let Some(prev) = self.by_value.get_mut(&old) {
                prev.revoked_at = Some(token.issued_at);
            }
        }

        let mut fresh = token.clone();
        fresh.revoked_at = None;
        self.live.insert(key, fresh.value.clone());
        self.by_value.insert(fresh.value.clone(), fresh);
        true
    }
}

#[derive(Default)]
pub struct MemoryStore {
    events: DashMap<Uuid, Event>,
    attendees: DashMap<Uuid, Attendee>,
    booths: DashMap<Uuid, Booth>,
    tokens: Mutex<TokenTable>,
    scans: Mutex<Vec<ScanRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn event_attendees(&self, event_id: Uuid) -> Vec<Attendee> {
        self.attendees
            .iter()
            .filter(|a| a.event_id == event_id && a.is_active)
            .map(|a| a.value().clone())
            .collect()
    }

    fn event_booths(&self, event_id: Uuid) -> Vec<Booth> {
        self.booths
            .iter()
            .filter(|b| b.event_id == event_id && b.is_active)
            .map(|b| b.value().clone())
            .collect()
    }
}

#[async_trait]
impl ExpoStore for MemoryStore {
    async fn create_event(&self, event: &NewEvent) -> anyhow::Result<Event> {
        let row = Event {
            id: Uuid::new_v4(),
            name: event.name.clone(),
            venue: event.venue.clone(),
            description: event.description.clone(),
            starts_at: event.starts_at,
            ends_at: event.ends_at,
            created_at: Utc::now(),
        };
        self.events.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_event(&self, id: Uuid) -> anyhow::Result<Option<Event>> {
        Ok(self.events.get(&id).map(|e| e.value().clone()))
    }

    async fn list_events(&self) -> anyhow::Result<Vec<Event>> {
        let mut rows: Vec<Event> = self.events.iter().map(|e| e.value().clone()).collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn create_attendee(&self, attendee: &NewAttendee) -> anyhow::Result<Attendee> {
        let row = Attendee {
            id: Uuid::new_v4(),
            event_id: attendee.event_id,
            name: attendee.name.clone(),
            email: attendee.email.clone(),
            company: attendee.company.clone(),
            title: attendee.title.clone(),
            is_active: true,
            created_at: Utc::now(),
        };
        self.attendees.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_attendee(&self, id: Uuid) -> anyhow::Result<Option<Attendee>> {
        Ok(self
            .attendees
            .get(&id)
            .filter(|a| a.is_active)
            .map(|a| a.value().clone()))
    }

    async fn list_attendees(&self, event_id: Uuid) -> anyhow::Result<Vec<Attendee>> {
        let mut rows = self.event_attendees(event_id);
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn deactivate_attendee(&self, id: Uuid) -> anyhow::Result<bool> {
        match self.attendees.get_mut(&id) {
            Some(mut a) if a.is_active => {
                a.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn create_booth(&self, booth: &NewBooth) -> anyhow::Result<Option<Booth>> {
        let taken = self.booths.iter().any(|b| {
            b.event_id == booth.event_id && b.is_active && b.booth_number == booth.booth_number
        });
        if taken {
            return Ok(None);
        }
        let row = Booth {
            id: Uuid::new_v4(),
            event_id: booth.event_id,
            booth_number: booth.booth_number.clone(),
            company_name: booth.company_name.clone(),
            description: booth.description.clone(),
            location: booth.location.clone(),
            is_active: true,
            created_at: Utc::now(),
        };
        self.booths.insert(row.id, row.clone());
        Ok(Some(row))
    }

    async fn get_booth(&self, id: Uuid) -> anyhow::Result<Option<Booth>> {
        Ok(self
            .booths
            .get(&id)
            .filter(|b| b.is_active)
            .map(|b| b.value().clone()))
    }

    async fn list_booths(&self, event_id: Uuid) -> anyhow::Result<Vec<Booth>> {
        let mut rows = self.event_booths(event_id);
        rows.sort_by(|a, b| a.booth_number.cmp(&b.booth_number));
        Ok(rows)
    }

    async fn deactivate_booth(&self, id: Uuid) -> anyhow::Result<bool> {
        match self.booths.get_mut(&id) {
            Some(mut b) if b.is_active => {
                b.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn replace_token(&self, token: &QrToken) -> anyhow::Result<bool> {
        let mut table = self.tokens.lock().await;
        Ok(table.swap_live(token))
    }

    async fn live_or_replace_token(&self, token: &QrToken) -> anyhow::Result<Option<QrToken>> {
        let mut table = self.tokens.lock().await;
        let current = table
            .live
            .get(&(token.role, token.entity_id))
            .and_then(|value| table.by_value.get(value))
            .filter(|t| t.is_live_at(token.issued_at))
            .cloned();
        if current.is_some() {
            return Ok(current);
        }
        Ok(table.swap_live(token).then(|| token.clone()))
    }

    async fn find_token(&self, value: &str) -> anyhow::Result<Option<QrToken>> {
        let table = self.tokens.lock().await;
        Ok(table
            .by_value
            .get(value)
            .filter(|t| t.revoked_at.is_none())
            .cloned())
    }

    async fn revoke_tokens_for(&self, role: Role, entity_id: Uuid) -> anyhow::Result<u64> {
        let mut table = self.tokens.lock().await;
        let Some(value) = table.live.remove(&(role, entity_id)) else {
            return Ok(0);
        };
        if let Some(t) = table.by_value.get_mut(&value) {
            t.revoked_at = Some(Utc::now());
        }
        Ok(1)
    }

    async fn record_scan(
        &self,
        scan: &NewScan,
        recent_since: Option<DateTime<Utc>>,
        mode: DedupMode,
    ) -> anyhow::Result<ScanOutcome> {
        let mut scans = self.scans.lock().await;

        let same_pair = |s: &&ScanRecord| s.attendee_id == scan.attendee_id && s.booth_id == scan.booth_id;

        // A row at the identical instant is the same scan, whatever the mode.
        if let Some(same) = scans
            .iter()
            .filter(same_pair)
            .find(|s| s.scanned_at == scan.scanned_at)
        {
            return Ok(ScanOutcome {
                record: same.clone(),
                is_first_visit: false,
                inserted: false,
            });
        }

        let recent = recent_since.and_then(|since| {
            scans
                .iter()
                .filter(same_pair)
                .filter(|s| s.scanned_at >= since)
                .max_by_key(|s| s.scanned_at)
        });

        let mut is_first_visit = true;
        if let Some(recent) = recent {
            if mode == DedupMode::Suppress {
                return Ok(ScanOutcome {
                    record: recent.clone(),
                    is_first_visit: false,
                    inserted: false,
                });
            }
            is_first_visit = false;
        }

        let record = ScanRecord {
            id: Uuid::new_v4(),
            attendee_id: scan.attendee_id,
            booth_id: scan.booth_id,
            event_id: scan.event_id,
            scanned_at: scan.scanned_at,
            notes: scan.notes.clone(),
        };
        scans.push(record.clone());

        Ok(ScanOutcome {
            record,
            is_first_visit,
            inserted: true,
        })
    }

    async fn list_scans(&self, filter: &ScanFilter) -> anyhow::Result<Vec<ScanRecord>> {
        let scans = self.scans.lock().await;
        let mut rows: Vec<ScanRecord> = scans
            .iter()
            .filter(|s| filter.event_id.map_or(true, |id| s.event_id == id))
            .filter(|s| filter.attendee_id.map_or(true, |id| s.attendee_id == id))
            .filter(|s| filter.booth_id.map_or(true, |id| s.booth_id == id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.scanned_at.cmp(&a.scanned_at));
        Ok(rows
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .collect())
    }

    async fn update_scan_notes(
        &self,
        id: Uuid,
        notes: Option<&str>,
    ) -> anyhow::Result<Option<ScanRecord>> {
        let mut scans = self.scans.lock().await;
        Ok(scans.iter_mut().find(|s| s.id == id).map(|s| {
            s.notes = notes.map(String::from);
            s.clone()
        }))
    }

    async fn delete_scan(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut scans = self.scans.lock().await;
        let before = scans.len();
        scans.retain(|s| s.id != id);
        Ok(scans.len() < before)
    }

    async fn event_counts(&self, event_id: Uuid) -> anyhow::Result<EventCounts> {
        let attendees: HashSet<Uuid> = self.event_attendees(event_id).iter().map(|a| a.id).collect();
        let booths: HashSet<Uuid> = self.event_booths(event_id).iter().map(|b| b.id).collect();

        // Scans involving a deactivated attendee or booth drop out of the totals.
        let scans = self.scans.lock().await;
        let event_scans: Vec<&ScanRecord> = scans
            .iter()
            .filter(|s| s.event_id == event_id)
            .filter(|s| attendees.contains(&s.attendee_id) && booths.contains(&s.booth_id))
            .collect();
        let visitors: HashSet<Uuid> = event_scans.iter().map(|s| s.attendee_id).collect();
        let visited: HashSet<Uuid> = event_scans.iter().map(|s| s.booth_id).collect();

        Ok(EventCounts {
            total_attendees: attendees.len() as i64,
            total_booths: booths.len() as i64,
            total_scans: event_scans.len() as i64,
            unique_visitors: visitors.len() as i64,
            active_booths: visited.len() as i64,
        })
    }

    async fn attendance_ranking(
        &self,
        event_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<AttendanceRank>> {
        let scans = self.scans.lock().await;
        let mut rows: Vec<AttendanceRank> = self
            .event_attendees(event_id)
            .into_iter()
            .map(|a| {
                let visits: Vec<&ScanRecord> =
                    scans.iter().filter(|s| s.attendee_id == a.id).collect();
                let booths: HashSet<Uuid> = visits.iter().map(|s| s.booth_id).collect();
                AttendanceRank {
                    attendee_id: a.id,
                    name: a.name,
                    company: a.company,
                    visit_count: visits.len() as i64,
                    unique_booths: booths.len() as i64,
                    last_visit: visits.iter().map(|s| s.scanned_at).max(),
                }
            })
            .collect();

        rows.sort_by(|a, b| {
            b.visit_count
                .cmp(&a.visit_count)
                .then(b.unique_booths.cmp(&a.unique_booths))
                .then(a.name.cmp(&b.name))
        });
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn booth_popularity(
        &self,
        event_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<BoothPopularity>> {
        let scans = self.scans.lock().await;
        let mut rows: Vec<BoothPopularity> = self
            .event_booths(event_id)
            .into_iter()
            .map(|b| {
                let visits: Vec<&ScanRecord> = scans.iter().filter(|s| s.booth_id == b.id).collect();
                let visitors: HashSet<Uuid> = visits.iter().map(|s| s.attendee_id).collect();
                BoothPopularity {
                    booth_id: b.id,
                    booth_number: b.booth_number,
                    company_name: b.company_name,
                    visit_count: visits.len() as i64,
                    unique_visitors: visitors.len() as i64,
                }
            })
            .collect();

        rows.sort_by(|a, b| {
            b.visit_count
                .cmp(&a.visit_count)
                .then(b.unique_visitors.cmp(&a.unique_visitors))
                .then(a.booth_number.cmp(&b.booth_number))
        });
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn scan_volume(&self, event_id: Uuid) -> anyhow::Result<Vec<VolumeStat>> {
        let scans = self.scans.lock().await;
        let mut buckets: HashMap<DateTime<Utc>, i64> = HashMap::new();
        for s in scans.iter().filter(|s| s.event_id == event_id) {
            let bucket = s.scanned_at.duration_trunc(TimeDelta::hours(1))?;
            *buckets.entry(bucket).or_default() += 1;
        }
        let mut rows: Vec<VolumeStat> = buckets
            .into_iter()
            .map(|(bucket, count)| VolumeStat { bucket, count })
            .collect();
        rows.sort_by_key(|v| v.bucket);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token(value: &str, role: Role, entity_id: Uuid) -> QrToken {
        QrToken {
            value: value.to_string(),
            role,
            entity_id,
            issued_at: Utc::now(),
            expires_at: None,
            revoked_at: None,
        }
    }

    fn scan(attendee_id: Uuid, booth_id: Uuid, at: DateTime<Utc>) -> NewScan {
        NewScan {
            attendee_id,
            booth_id,
            event_id: Uuid::nil(),
            scanned_at: at,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_replace_token_revokes_previous() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        assert!(store.replace_token(&token("a", Role::Attendee, id)).await.unwrap());
        assert!(store.replace_token(&token("b", Role::Attendee, id)).await.unwrap());

        assert!(store.find_token("a").await.unwrap().is_none());
        assert_eq!(store.find_token("b").await.unwrap().unwrap().entity_id, id);
        let current = store
            .live_or_replace_token(&token("c", Role::Attendee, id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.value, "b");
        assert!(store.find_token("c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_live_or_replace_swaps_expired_token() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        let mut lapsed = token("old", Role::Booth, id);
        lapsed.issued_at = Utc::now() - Duration::minutes(10);
        lapsed.expires_at = Some(Utc::now() - Duration::minutes(5));
        assert!(store.replace_token(&lapsed).await.unwrap());

        let placed = store
            .live_or_replace_token(&token("new", Role::Booth, id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(placed.value, "new");
        assert!(store.find_token("old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_token_rejects_duplicate_value() {
        let store = MemoryStore::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        assert!(store.replace_token(&token("same", Role::Booth, first)).await.unwrap());
        assert!(!store.replace_token(&token("same", Role::Attendee, second)).await.unwrap());

        // The failed insert must not have touched the existing mapping.
        let found = store.find_token("same").await.unwrap().unwrap();
        assert_eq!(found.entity_id, first);
        let placed = store
            .live_or_replace_token(&token("other", Role::Attendee, second))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(placed.value, "other");
    }

    #[tokio::test]
    async fn test_same_entity_id_different_roles_are_independent() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store.replace_token(&token("att", Role::Attendee, id)).await.unwrap();
        store.replace_token(&token("bth", Role::Booth, id)).await.unwrap();
        assert!(store.find_token("att").await.unwrap().is_some());
        assert!(store.find_token("bth").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_record_scan_suppresses_within_window() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let t0 = Utc::now();

        let first = store.record_scan(&scan(a, b, t0), None, DedupMode::Suppress).await.unwrap();
        assert!(first.is_first_visit && first.inserted);

        let t1 = t0 + Duration::seconds(30);
        let second = store
            .record_scan(&scan(a, b, t1), Some(t1 - Duration::seconds(300)), DedupMode::Suppress)
            .await
            .unwrap();
        assert!(!second.is_first_visit);
        assert!(!second.inserted);
        assert_eq!(second.record.id, first.record.id);
        assert_eq!(store.list_scans(&ScanFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_record_scan_flag_mode_inserts() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let t0 = Utc::now();
        store.record_scan(&scan(a, b, t0), None, DedupMode::Flag).await.unwrap();

        let t1 = t0 + Duration::seconds(10);
        let second = store
            .record_scan(&scan(a, b, t1), Some(t1 - Duration::seconds(60)), DedupMode::Flag)
            .await
            .unwrap();
        assert!(!second.is_first_visit);
        assert!(second.inserted);
        assert_eq!(store.list_scans(&ScanFilter::default()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_same_instant_never_inserts_twice() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let t0 = Utc::now();

        for (since, mode) in [
            (None, DedupMode::Flag),
            (None, DedupMode::Suppress),
            (Some(t0 - Duration::seconds(60)), DedupMode::Flag),
        ] {
            store.record_scan(&scan(a, b, t0), since, mode).await.unwrap();
        }
        assert_eq!(store.list_scans(&ScanFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_backdated_scan_at_taken_instant_is_not_inserted() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let t0 = Utc::now();
        let window = |at: DateTime<Utc>| Some(at - Duration::seconds(300));

        let first = store.record_scan(&scan(a, b, t0), window(t0), DedupMode::Flag).await.unwrap();
        let t1 = t0 + Duration::seconds(10);
        store.record_scan(&scan(a, b, t1), window(t1), DedupMode::Flag).await.unwrap();

        // The newest row in the window is t1, but t0 is already taken.
        let again = store.record_scan(&scan(a, b, t0), window(t0), DedupMode::Flag).await.unwrap();
        assert!(!again.inserted);
        assert_eq!(again.record.id, first.record.id);
        assert_eq!(store.list_scans(&ScanFilter::default()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_and_delete_scan() {
        let store = MemoryStore::new();
        let out = store
            .record_scan(&scan(Uuid::new_v4(), Uuid::new_v4(), Utc::now()), None, DedupMode::Suppress)
            .await
            .unwrap();

        let updated = store
            .update_scan_notes(out.record.id, Some("asked for pricing"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.notes.as_deref(), Some("asked for pricing"));

        assert!(store.delete_scan(out.record.id).await.unwrap());
        assert!(!store.delete_scan(out.record.id).await.unwrap());
        assert!(store.update_scan_notes(out.record.id, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_booth_number_rejected() {
        let store = MemoryStore::new();
        let event_id = Uuid::new_v4();
        let booth = NewBooth {
            event_id,
            booth_number: "A-12".into(),
            company_name: "Acme".into(),
            description: None,
            location: None,
        };
        let created = store.create_booth(&booth).await.unwrap().unwrap();
        assert!(store.create_booth(&booth).await.unwrap().is_none());

        // Freed once the original is deactivated.
        assert!(store.deactivate_booth(created.id).await.unwrap());
        assert!(store.create_booth(&booth).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_scan_volume_buckets_by_hour() {
        let store = MemoryStore::new();
        let base = Utc::now().duration_trunc(TimeDelta::hours(1)).unwrap();
        let mut s = scan(Uuid::new_v4(), Uuid::new_v4(), base + Duration::minutes(5));
        store.record_scan(&s, None, DedupMode::Flag).await.unwrap();
        s.scanned_at = base + Duration::minutes(50);
        store.record_scan(&s, None, DedupMode::Flag).await.unwrap();
        s.scanned_at = base + Duration::minutes(70);
        store.record_scan(&s, None, DedupMode::Flag).await.unwrap();

        let volume = store.scan_volume(Uuid::nil()).await.unwrap();
        assert_eq!(
            volume,
            vec![
                VolumeStat { bucket: base, count: 2 },
                VolumeStat { bucket: base + Duration::hours(1), count: 1 },
            ]
        );
    }
}
