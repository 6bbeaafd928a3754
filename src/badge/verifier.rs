use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{load_subject, token, Subject};
use crate::models::{Profile, Role};
use crate::store::ExpoStore;

/// Why a scanned value did not resolve. Expected in the field (misreads,
/// reprinted badges), so it is a value rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    Malformed,
    Unknown,
    Expired,
    Inactive,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            InvalidReason::Malformed => "QR code could not be read",
            InvalidReason::Unknown => "QR code is not recognised",
            InvalidReason::Expired => "QR code has expired",
            InvalidReason::Inactive => "badge holder is no longer registered",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, Clone)]
pub enum Verification {
    Valid(Subject),
    Invalid(InvalidReason),
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid(_))
    }

    pub fn into_payload(self) -> VerificationPayload {
        match self {
            Verification::Valid(s) => VerificationPayload {
                valid: true,
                role: Some(s.role),
                entity_id: Some(s.entity_id),
                event_id: Some(s.event_id),
                info: Some(s.profile),
                reason: None,
            },
            Verification::Invalid(reason) => VerificationPayload {
                valid: false,
                role: None,
                entity_id: None,
                event_id: None,
                info: None,
                reason: Some(reason),
            },
        }
    }
}

/// Wire shape of a verification: `{valid, type, entity_id, event_id, info, reason}`.
#[derive(Debug, Serialize)]
pub struct VerificationPayload {
    pub valid: bool,
    #[serde(rename = "type")]
    pub role: Option<Role>,
    pub entity_id: Option<Uuid>,
    pub event_id: Option<Uuid>,
    pub info: Option<Profile>,
    pub reason: Option<InvalidReason>,
}

/// Read-only resolution of scanned values back to attendees and booths.
#[derive(Clone)]
pub struct Verifier {
    store: Arc<dyn ExpoStore>,
}

impl Verifier {
    pub fn new(store: Arc<dyn ExpoStore>) -> Self {
        Self { store }
    }

    pub async fn verify(&self, value: &str) -> anyhow::Result<Verification> {
        self.verify_at(value, Utc::now()).await
    }

    pub async fn verify_at(&self, value: &str, now: DateTime<Utc>) -> anyhow::Result<Verification> {
        let value = value.trim();
        if !token::is_well_formed(value) {
            return Ok(Verification::Invalid(InvalidReason::Malformed));
        }

        let Some(found) = self.store.find_token(value).await? else {
            tracing::debug!("badge lookup miss");
            return Ok(Verification::Invalid(InvalidReason::Unknown));
        };

        if found.is_expired_at(now) {
            tracing::debug!(role = %found.role, entity_id = %found.entity_id, "badge expired");
            return Ok(Verification::Invalid(InvalidReason::Expired));
        }

        match load_subject(self.store.as_ref(), found.role, found.entity_id).await? {
            Some(subject) => Ok(Verification::Valid(subject)),
            None => Ok(Verification::Invalid(InvalidReason::Inactive)),
        }
    }
}
