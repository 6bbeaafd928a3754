use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::{load_subject, token, Subject};
use crate::errors::AppError;
use crate::models::{QrToken, Role};
use crate::store::ExpoStore;

/// Fresh values are 192-bit random, so a second collision in a row means
/// something other than bad luck is going on.
const MAX_ISSUE_ATTEMPTS: usize = 3;

/// Owns the badge token lifecycle. One live token per `(role, entity_id)`.
#[derive(Clone)]
pub struct Issuer {
    store: Arc<dyn ExpoStore>,
    ttl: Option<Duration>,
}

impl Issuer {
    pub fn new(store: Arc<dyn ExpoStore>, ttl: Option<Duration>) -> Self {
        Self { store, ttl }
    }

    /// Issue a new token, invalidating whatever was live for the entity before.
    pub async fn issue(&self, role: Role, entity_id: Uuid) -> Result<QrToken, AppError> {
        self.issue_at(role, entity_id, Utc::now()).await
    }

    pub async fn issue_at(
        &self,
        role: Role,
        entity_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<QrToken, AppError> {
        self.place(role, entity_id, now, false).await
    }

    /// The entity's live, unexpired token, issuing one if there is none.
    pub async fn current_or_issue(&self, role: Role, entity_id: Uuid) -> Result<QrToken, AppError> {
        self.place(role, entity_id, Utc::now(), true).await
    }

    /// Store a fresh token for the entity. With `reuse_live`, a token that is
    /// still live at `now` wins instead, decided in the same store call.
    async fn place(
        &self,
        role: Role,
        entity_id: Uuid,
        now: DateTime<Utc>,
        reuse_live: bool,
    ) -> Result<QrToken, AppError> {
        let subject = self.require_subject(role, entity_id).await?;

        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let candidate = QrToken {
                value: token::generate(),
                role,
                entity_id,
                issued_at: now,
                // A TTL past the representable range means no expiry.
                expires_at: self.ttl.and_then(|ttl| now.checked_add_signed(ttl)),
                revoked_at: None,
            };

            let placed = if reuse_live {
                self.store.live_or_replace_token(&candidate).await?
            } else {
                self.store
                    .replace_token(&candidate)
                    .await?
                    .then(|| candidate.clone())
            };

            if let Some(placed) = placed {
                if placed.value == candidate.value {
                    tracing::info!(
                        role = %role,
                        entity_id = %entity_id,
                        subject = subject.label(),
                        "issued badge token"
                    );
                }
                return Ok(placed);
            }

            tracing::warn!(attempt, role = %role, "badge token value collided, regenerating");
        }

        Err(AppError::Internal(anyhow::anyhow!(
            "could not generate a unique badge token after {} attempts",
            MAX_ISSUE_ATTEMPTS
        )))
    }

    /// Revoke the live token, if any. Returns how many tokens were revoked.
    pub async fn revoke(&self, role: Role, entity_id: Uuid) -> Result<u64, AppError> {
        let revoked = self.store.revoke_tokens_for(role, entity_id).await?;
        if revoked > 0 {
            tracing::info!(role = %role, entity_id = %entity_id, "revoked badge token");
        }
        Ok(revoked)
    }

    async fn require_subject(&self, role: Role, entity_id: Uuid) -> Result<Subject, AppError> {
        load_subject(self.store.as_ref(), role, entity_id)
            .await?
            .ok_or_else(|| AppError::not_found(role.as_str()))
    }
}
