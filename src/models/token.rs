use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which kind of entity a badge identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum Role {
    Attendee,
    Booth,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Attendee => "attendee",
            Role::Booth => "booth",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "attendee" => Ok(Role::Attendee),
            "booth" => Ok(Role::Booth),
            other => Err(anyhow::anyhow!(
                "invalid role: {}. Must be 'attendee' or 'booth'",
                other
            )),
        }
    }
}

/// A QR badge credential bound to one `(role, entity_id)` pair.
///
/// A token is live while `revoked_at` is unset. Expiry is checked by the verifier
/// against `expires_at` at lookup time rather than stored as a flag.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QrToken {
    pub value: String,
    pub role: Role,
    pub entity_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl QrToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(exp) if exp <= now)
    }

    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && !self.is_expired_at(now)
    }
}
