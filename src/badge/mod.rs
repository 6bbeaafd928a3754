//! QR badge lifecycle: issuance, verification, rendering and batch export.

pub mod archive;
pub mod issuer;
pub mod render;
pub mod token;
pub mod verifier;

use serde::Serialize;
use uuid::Uuid;

use crate::models::{AttendeeProfile, BoothProfile, Profile, Role};
use crate::store::ExpoStore;

pub use issuer::Issuer;
pub use verifier::{InvalidReason, Verification, Verifier};

/// An active attendee or booth resolved from the store.
#[derive(Debug, Clone, Serialize)]
pub struct Subject {
    pub role: Role,
    pub entity_id: Uuid,
    pub event_id: Uuid,
    pub profile: Profile,
}

impl Subject {
    pub fn attendee_profile(&self) -> Option<&AttendeeProfile> {
        match &self.profile {
            Profile::Attendee(p) => Some(p),
            Profile::Booth(_) => None,
        }
    }

    pub fn booth_profile(&self) -> Option<&BoothProfile> {
        match &self.profile {
            Profile::Booth(p) => Some(p),
            Profile::Attendee(_) => None,
        }
    }

    /// Short human label, used for log lines and archive file names.
    pub fn label(&self) -> &str {
        match &self.profile {
            Profile::Attendee(p) => &p.name,
            Profile::Booth(p) => &p.booth_number,
        }
    }
}

/// Look up an active entity of the given role. `None` if missing or deactivated.
pub async fn load_subject(
    store: &dyn ExpoStore,
    role: Role,
    entity_id: Uuid,
) -> anyhow::Result<Option<Subject>> {
    let subject = match role {
        Role::Attendee => store.get_attendee(entity_id).await?.map(|a| Subject {
            role,
            entity_id: a.id,
            event_id: a.event_id,
            profile: Profile::Attendee(AttendeeProfile::from(&a)),
        }),
        Role::Booth => store.get_booth(entity_id).await?.map(|b| Subject {
            role,
            entity_id: b.id,
            event_id: b.event_id,
            profile: Profile::Booth(BoothProfile::from(&b)),
        }),
    };
    Ok(subject)
}
