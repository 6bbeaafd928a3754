use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use uuid::Uuid;

use crate::badge::{Subject, Verification, Verifier};
use crate::config::DedupMode;
use crate::errors::AppError;
use crate::models::scan::{NewScan, ScanFilter};
use crate::models::{Role, ScanRecord, ScanResult};
use crate::store::ExpoStore;

pub const MAX_NOTES_LEN: usize = 1000;

/// How repeat scans of the same pair are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupPolicy {
    pub window: Duration,
    pub mode: DedupMode,
}

impl DedupPolicy {
    pub fn new(window_secs: u64, mode: DedupMode) -> Self {
        Self {
            window: Duration::seconds(
                i64::try_from(window_secs)
                    .unwrap_or(i64::MAX)
                    .min(i64::MAX / 1000),
            ),
            mode,
        }
    }

    /// Earliest timestamp that still counts as "recent" for a scan at `now`.
    /// `None` when dedup is disabled.
    pub fn recent_since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.window <= Duration::zero() {
            return None;
        }
        Some(
            now.checked_sub_signed(self.window)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        )
    }
}

/// Turns a pair of scanned badges into a visit record.
#[derive(Clone)]
pub struct ScanRecorder {
    store: Arc<dyn ExpoStore>,
    verifier: Verifier,
    policy: DedupPolicy,
}

impl ScanRecorder {
    pub fn new(store: Arc<dyn ExpoStore>, verifier: Verifier, policy: DedupPolicy) -> Self {
        Self {
            store,
            verifier,
            policy,
        }
    }

    pub fn policy(&self) -> DedupPolicy {
        self.policy
    }

    pub async fn record(
        &self,
        attendee_token: &str,
        booth_token: &str,
        notes: Option<&str>,
    ) -> Result<ScanResult, AppError> {
        self.record_at(attendee_token, booth_token, notes, Utc::now())
            .await
    }

    pub async fn record_at(
        &self,
        attendee_token: &str,
        booth_token: &str,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ScanResult, AppError> {
        let notes = normalize_notes(notes)?;
        // Stored timestamps have microsecond precision.
        let now = now.trunc_subsecs(6);

        let attendee = self.resolve(attendee_token, "attendee", now).await?;
        let booth = self.resolve(booth_token, "booth", now).await?;

        if attendee.role != Role::Attendee || booth.role != Role::Booth {
            tracing::warn!(
                first = %attendee.role,
                second = %booth.role,
                "scan rejected: expected one attendee and one booth badge"
            );
            return Err(AppError::InvalidPair(format!(
                "expected an attendee badge and a booth badge, got {} and {}",
                attendee.role, booth.role
            )));
        }

        if attendee.event_id != booth.event_id {
            return Err(AppError::InvalidPair(
                "attendee and booth are registered for different events".into(),
            ));
        }

        let (Some(attendee_profile), Some(booth_profile)) =
            (attendee.attendee_profile(), booth.booth_profile())
        else {
            return Err(AppError::Internal(anyhow::anyhow!(
                "profile does not match resolved role"
            )));
        };

        let new_scan = NewScan {
            attendee_id: attendee.entity_id,
            booth_id: booth.entity_id,
            event_id: booth.event_id,
            scanned_at: now,
            notes,
        };

        let outcome = self
            .store
            .record_scan(&new_scan, self.policy.recent_since(now), self.policy.mode)
            .await?;

        tracing::info!(
            attendee_id = %attendee.entity_id,
            booth_id = %booth.entity_id,
            first_visit = outcome.is_first_visit,
            inserted = outcome.inserted,
            "scan recorded"
        );

        let message = if outcome.is_first_visit {
            format!("{} checked in at booth {}", attendee_profile.name, booth_profile.booth_number)
        } else {
            format!(
                "{} already visited booth {} recently",
                attendee_profile.name, booth_profile.booth_number
            )
        };

        Ok(ScanResult {
            scan: outcome.record,
            attendee: attendee_profile.clone(),
            booth: booth_profile.clone(),
            is_first_visit: outcome.is_first_visit,
            message,
        })
    }

    pub async fn list(&self, filter: &ScanFilter) -> Result<Vec<ScanRecord>, AppError> {
        Ok(self.store.list_scans(filter).await?)
    }

    pub async fn update_notes(&self, id: Uuid, notes: Option<&str>) -> Result<ScanRecord, AppError> {
        let notes = normalize_notes(notes)?;
        self.store
            .update_scan_notes(id, notes.as_deref())
            .await?
            .ok_or_else(|| AppError::not_found("scan"))
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        if self.store.delete_scan(id).await? {
            tracing::info!(scan_id = %id, "scan deleted");
            Ok(())
        } else {
            Err(AppError::not_found("scan"))
        }
    }

    async fn resolve(
        &self,
        value: &str,
        which: &str,
        now: DateTime<Utc>,
    ) -> Result<Subject, AppError> {
        match self.verifier.verify_at(value, now).await? {
            Verification::Valid(subject) => Ok(subject),
            Verification::Invalid(reason) => {
                tracing::debug!(which, reason = ?reason, "scan rejected: badge did not verify");
                Err(AppError::InvalidToken(format!("{} badge: {}", which, reason)))
            }
        }
    }
}

fn normalize_notes(notes: Option<&str>) -> Result<Option<String>, AppError> {
    match notes.map(str::trim) {
        None | Some("") => Ok(None),
        Some(n) if n.chars().count() > MAX_NOTES_LEN => Err(AppError::BadRequest(format!(
            "notes must be at most {} characters",
            MAX_NOTES_LEN
        ))),
        Some(n) => Ok(Some(n.to_string())),
    }
}
