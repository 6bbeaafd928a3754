use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub venue: Option<String>,
    pub description: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub name: String,
    pub venue: Option<String>,
    pub description: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attendee {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAttendee {
    #[serde(skip)]
    pub event_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Booth {
    pub id: Uuid,
    pub event_id: Uuid,
    pub booth_number: String,
    pub company_name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBooth {
    #[serde(skip)]
    pub event_id: Uuid,
    pub booth_number: String,
    pub company_name: String,
    pub description: Option<String>,
    pub location: Option<String>,
}

/// Display fields shown on a badge or after a successful scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendeeProfile {
    pub id: Uuid,
    pub name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoothProfile {
    pub id: Uuid,
    pub booth_number: String,
    pub company_name: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Profile {
    Attendee(AttendeeProfile),
    Booth(BoothProfile),
}

impl From<&Attendee> for AttendeeProfile {
    fn from(a: &Attendee) -> Self {
        Self {
            id: a.id,
            name: a.name.clone(),
            company: a.company.clone(),
            email: a.email.clone(),
            title: a.title.clone(),
        }
    }
}

impl From<&Booth> for BoothProfile {
    fn from(b: &Booth) -> Self {
        Self {
            id: b.id,
            booth_number: b.booth_number.clone(),
            company_name: b.company_name.clone(),
            location: b.location.clone(),
        }
    }
}
