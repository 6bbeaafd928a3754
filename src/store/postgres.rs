use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::ExpoStore;
use crate::config::DedupMode;
use crate::models::analytics::{AttendanceRank, BoothPopularity, EventCounts, VolumeStat};
use crate::models::event::{NewAttendee, NewBooth, NewEvent};
use crate::models::scan::{NewScan, ScanFilter, ScanOutcome};
use crate::models::{Attendee, Booth, Event, QrToken, Role, ScanRecord};

const EVENT_COLUMNS: &str = "id, name, venue, description, starts_at, ends_at, created_at";
const ATTENDEE_COLUMNS: &str = "id, event_id, name, email, company, title, is_active, created_at";
const BOOTH_COLUMNS: &str =
    "id, event_id, booth_number, company_name, description, location, is_active, created_at";
const TOKEN_COLUMNS: &str = "value, role, entity_id, issued_at, expires_at, revoked_at";
const SCAN_COLUMNS: &str = "id, attendee_id, booth_id, event_id, scanned_at, notes";

/// Serialize badge writers of one entity until the transaction ends.
async fn lock_entity_tokens(conn: &mut PgConnection, role: Role, entity_id: Uuid) -> anyhow::Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(format!("token:{}:{}", role, entity_id))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Revoke the entity's live token and insert `token`. `false` if the value is taken.
async fn swap_live_token(conn: &mut PgConnection, token: &QrToken) -> anyhow::Result<bool> {
    sqlx::query(
        "UPDATE qr_tokens SET revoked_at = $3 WHERE role = $1 AND entity_id = $2 AND revoked_at IS NULL",
    )
    .bind(token.role)
    .bind(token.entity_id)
    .bind(token.issued_at)
    .execute(&mut *conn)
    .await?;

    let inserted = sqlx::query(
        r#"INSERT INTO qr_tokens (value, role, entity_id, issued_at, expires_at)
           VALUES ($1, $2, $3, $4, $5)
           ON CONFLICT (value) DO NOTHING"#,
    )
    .bind(&token.value)
    .bind(token.role)
    .bind(token.entity_id)
    .bind(token.issued_at)
    .bind(token.expires_at)
    .execute(&mut *conn)
    .await?;

    Ok(inserted.rows_affected() > 0)
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ExpoStore for PgStore {
    // -- Event Operations --

    async fn create_event(&self, event: &NewEvent) -> anyhow::Result<Event> {
        let row = sqlx::query_as::<_, Event>(&format!(
            r#"INSERT INTO events (name, venue, description, starts_at, ends_at)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING {EVENT_COLUMNS}"#
        ))
        .bind(&event.name)
        .bind(&event.venue)
        .bind(&event.description)
        .bind(event.starts_at)
        .bind(event.ends_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_event(&self, id: Uuid) -> anyhow::Result<Option<Event>> {
        let row = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_events(&self) -> anyhow::Result<Vec<Event>> {
        let rows = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -- Attendee / Booth Operations --

    async fn create_attendee(&self, attendee: &NewAttendee) -> anyhow::Result<Attendee> {
        let row = sqlx::query_as::<_, Attendee>(&format!(
            r#"INSERT INTO attendees (event_id, name, email, company, title)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING {ATTENDEE_COLUMNS}"#
        ))
        .bind(attendee.event_id)
        .bind(&attendee.name)
        .bind(&attendee.email)
        .bind(&attendee.company)
        .bind(&attendee.title)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_attendee(&self, id: Uuid) -> anyhow::Result<Option<Attendee>> {
        let row = sqlx::query_as::<_, Attendee>(&format!(
            "SELECT {ATTENDEE_COLUMNS} FROM attendees WHERE id = $1 AND is_active = true"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_attendees(&self, event_id: Uuid) -> anyhow::Result<Vec<Attendee>> {
        let rows = sqlx::query_as::<_, Attendee>(&format!(
            "SELECT {ATTENDEE_COLUMNS} FROM attendees WHERE event_id = $1 AND is_active = true ORDER BY name ASC"
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn deactivate_attendee(&self, id: Uuid) -> anyhow::Result<bool> {
        let result =
            sqlx::query("UPDATE attendees SET is_active = false WHERE id = $1 AND is_active = true")
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_booth(&self, booth: &NewBooth) -> anyhow::Result<Option<Booth>> {
        let row = sqlx::query_as::<_, Booth>(&format!(
            r#"INSERT INTO booths (event_id, booth_number, company_name, description, location)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (event_id, booth_number) WHERE is_active DO NOTHING
               RETURNING {BOOTH_COLUMNS}"#
        ))
        .bind(booth.event_id)
        .bind(&booth.booth_number)
        .bind(&booth.company_name)
        .bind(&booth.description)
        .bind(&booth.location)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_booth(&self, id: Uuid) -> anyhow::Result<Option<Booth>> {
        let row = sqlx::query_as::<_, Booth>(&format!(
            "SELECT {BOOTH_COLUMNS} FROM booths WHERE id = $1 AND is_active = true"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_booths(&self, event_id: Uuid) -> anyhow::Result<Vec<Booth>> {
        let rows = sqlx::query_as::<_, Booth>(&format!(
            "SELECT {BOOTH_COLUMNS} FROM booths WHERE event_id = $1 AND is_active = true ORDER BY booth_number ASC"
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn deactivate_booth(&self, id: Uuid) -> anyhow::Result<bool> {
        let result =
            sqlx::query("UPDATE booths SET is_active = false WHERE id = $1 AND is_active = true")
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    // -- Token Operations --

    async fn replace_token(&self, token: &QrToken) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;
        lock_entity_tokens(&mut tx, token.role, token.entity_id).await?;

        if !swap_live_token(&mut tx, token).await? {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn live_or_replace_token(&self, token: &QrToken) -> anyhow::Result<Option<QrToken>> {
        let mut tx = self.pool.begin().await?;
        lock_entity_tokens(&mut tx, token.role, token.entity_id).await?;

        let current = sqlx::query_as::<_, QrToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM qr_tokens WHERE role = $1 AND entity_id = $2 AND revoked_at IS NULL"
        ))
        .bind(token.role)
        .bind(token.entity_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(current) = current.filter(|t| t.is_live_at(token.issued_at)) {
            tx.commit().await?;
            return Ok(Some(current));
        }

        if !swap_live_token(&mut tx, token).await? {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(token.clone()))
    }

    async fn find_token(&self, value: &str) -> anyhow::Result<Option<QrToken>> {
        let row = sqlx::query_as::<_, QrToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM qr_tokens WHERE value = $1 AND revoked_at IS NULL"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn revoke_tokens_for(&self, role: Role, entity_id: Uuid) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE qr_tokens SET revoked_at = NOW() WHERE role = $1 AND entity_id = $2 AND revoked_at IS NULL",
        )
        .bind(role)
        .bind(entity_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // -- Scan Operations --

    async fn record_scan(
        &self,
        scan: &NewScan,
        recent_since: Option<DateTime<Utc>>,
        mode: DedupMode,
    ) -> anyhow::Result<ScanOutcome> {
        let mut tx = self.pool.begin().await?;

        // One writer per pair: the recency check and the insert must see the same state.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("scan:{}:{}", scan.attendee_id, scan.booth_id))
            .execute(&mut *tx)
            .await?;

        // A row at the identical instant is the same scan, whatever the mode.
        let same = sqlx::query_as::<_, ScanRecord>(&format!(
            r#"SELECT {SCAN_COLUMNS} FROM scans
               WHERE attendee_id = $1 AND booth_id = $2 AND scanned_at = $3
               LIMIT 1"#
        ))
        .bind(scan.attendee_id)
        .bind(scan.booth_id)
        .bind(scan.scanned_at)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(same) = same {
            tx.commit().await?;
            return Ok(ScanOutcome {
                record: same,
                is_first_visit: false,
                inserted: false,
            });
        }

        let recent = match recent_since {
            Some(since) => {
                sqlx::query_as::<_, ScanRecord>(&format!(
                    r#"SELECT {SCAN_COLUMNS} FROM scans
                       WHERE attendee_id = $1 AND booth_id = $2 AND scanned_at >= $3
                       ORDER BY scanned_at DESC
                       LIMIT 1"#
                ))
                .bind(scan.attendee_id)
                .bind(scan.booth_id)
                .bind(since)
                .fetch_optional(&mut *tx)
                .await?
            }
            None => None,
        };

        let mut is_first_visit = true;
        if let Some(recent) = recent {
            if mode == DedupMode::Suppress {
                tx.commit().await?;
                return Ok(ScanOutcome {
                    record: recent,
                    is_first_visit: false,
                    inserted: false,
                });
            }
            is_first_visit = false;
        }

        let record = sqlx::query_as::<_, ScanRecord>(&format!(
            r#"INSERT INTO scans (attendee_id, booth_id, event_id, scanned_at, notes)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING {SCAN_COLUMNS}"#
        ))
        .bind(scan.attendee_id)
        .bind(scan.booth_id)
        .bind(scan.event_id)
        .bind(scan.scanned_at)
        .bind(&scan.notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ScanOutcome {
            record,
            is_first_visit,
            inserted: true,
        })
    }

    async fn list_scans(&self, filter: &ScanFilter) -> anyhow::Result<Vec<ScanRecord>> {
        let rows = sqlx::query_as::<_, ScanRecord>(&format!(
            r#"SELECT {SCAN_COLUMNS} FROM scans
               WHERE ($1::uuid IS NULL OR event_id = $1)
                 AND ($2::uuid IS NULL OR attendee_id = $2)
                 AND ($3::uuid IS NULL OR booth_id = $3)
               ORDER BY scanned_at DESC
               LIMIT $4 OFFSET $5"#
        ))
        .bind(filter.event_id)
        .bind(filter.attendee_id)
        .bind(filter.booth_id)
        .bind(filter.limit())
        .bind(filter.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update_scan_notes(
        &self,
        id: Uuid,
        notes: Option<&str>,
    ) -> anyhow::Result<Option<ScanRecord>> {
        let row = sqlx::query_as::<_, ScanRecord>(&format!(
            "UPDATE scans SET notes = $2 WHERE id = $1 RETURNING {SCAN_COLUMNS}"
        ))
        .bind(id)
        .bind(notes)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_scan(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM scans WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -- Report Operations --

    async fn event_counts(&self, event_id: Uuid) -> anyhow::Result<EventCounts> {
        let row = sqlx::query_as::<_, EventCounts>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM attendees WHERE event_id = $1 AND is_active) AS total_attendees,
                (SELECT COUNT(*) FROM booths WHERE event_id = $1 AND is_active) AS total_booths,
                COUNT(s.id) AS total_scans,
                COUNT(DISTINCT s.attendee_id) AS unique_visitors,
                COUNT(DISTINCT s.booth_id) AS active_booths
            FROM scans s
            JOIN attendees a ON a.id = s.attendee_id AND a.is_active
            JOIN booths b ON b.id = s.booth_id AND b.is_active
            WHERE s.event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn attendance_ranking(
        &self,
        event_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<AttendanceRank>> {
        let rows = sqlx::query_as::<_, AttendanceRank>(
            r#"
            SELECT
                a.id AS attendee_id,
                a.name,
                a.company,
                COUNT(s.id) AS visit_count,
                COUNT(DISTINCT s.booth_id) AS unique_booths,
                MAX(s.scanned_at) AS last_visit
            FROM attendees a
            LEFT JOIN scans s ON s.attendee_id = a.id
            WHERE a.event_id = $1 AND a.is_active
            GROUP BY a.id, a.name, a.company
            ORDER BY visit_count DESC, unique_booths DESC, a.name ASC
            LIMIT $2
            "#,
        )
        .bind(event_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn booth_popularity(
        &self,
        event_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<BoothPopularity>> {
        let rows = sqlx::query_as::<_, BoothPopularity>(
            r#"
            SELECT
                b.id AS booth_id,
                b.booth_number,
                b.company_name,
                COUNT(s.id) AS visit_count,
                COUNT(DISTINCT s.attendee_id) AS unique_visitors
            FROM booths b
            LEFT JOIN scans s ON s.booth_id = b.id
            WHERE b.event_id = $1 AND b.is_active
            GROUP BY b.id, b.booth_number, b.company_name
            ORDER BY visit_count DESC, unique_visitors DESC, b.booth_number ASC
            LIMIT $2
            "#,
        )
        .bind(event_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn scan_volume(&self, event_id: Uuid) -> anyhow::Result<Vec<VolumeStat>> {
        let rows = sqlx::query_as::<_, VolumeStat>(
            r#"
            SELECT
                date_trunc('hour', scanned_at) AS bucket,
                COUNT(*) AS count
            FROM scans
            WHERE event_id = $1
            GROUP BY 1
            ORDER BY 1 ASC
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
