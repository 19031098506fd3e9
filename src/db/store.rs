// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! The PollState store (C3): typed persistent view of per-user polling
//! state, plus the activity/photo upserts the result applier drives.
//!
//! All writes flow through a single `sqlx::Transaction` per call, using
//! Postgres's default read-committed isolation, matching the "per-result
//! commit boundary" the scheduler depends on.

use crate::error::PollError;
use crate::models::{Activity, PhotoEntry, PollState, PollStateUpdate, Token};
use crate::services::strava::UpstreamActivity;
pub use crate::services::worker::ActivityInfo;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::BTreeMap;

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Rows eligible for submission: not stopped, not in `exclude_ids`, and
    /// either still backfilling or due for a LATEST refresh.
    pub async fn eligible_poll_states(
        &self,
        exclude_ids: &[i64],
        latest_interval: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<PollState>, sqlx::Error> {
        let cutoff = now - latest_interval;
        sqlx::query_as::<_, PollState>(
            r#"
            SELECT id, user_id, full_fetch_next_page, full_fetch_per_page,
                   full_fetch_completed, last_fetch_completed_at, total_fetches,
                   error_happened, error_happened_at, error_message, error_data,
                   stopped
            FROM strava_poll_states
            WHERE stopped IS NOT TRUE
              AND NOT (id = ANY($1))
              AND (
                    full_fetch_completed IS NOT TRUE
                    OR last_fetch_completed_at IS NULL
                    OR last_fetch_completed_at < $2
                  )
            ORDER BY id
            "#,
        )
        .bind(exclude_ids)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_poll_state(&self, id: i64) -> Result<Option<PollState>, sqlx::Error> {
        sqlx::query_as::<_, PollState>(
            r#"
            SELECT id, user_id, full_fetch_next_page, full_fetch_per_page,
                   full_fetch_completed, last_fetch_completed_at, total_fetches,
                   error_happened, error_happened_at, error_message, error_data,
                   stopped
            FROM strava_poll_states WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn get_token(&self, user_id: i64) -> Result<Option<Token>, sqlx::Error> {
        sqlx::query_as::<_, Token>(
            "SELECT user_id, access_token, refresh_token, expires_at FROM tokens WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Creates the `PollState` row for a newly enrolled user: the one piece
    /// of the login/enrollment subsystem the core must expose so it can be
    /// exercised without the (out-of-scope) OAuth views.
    pub async fn create_poll_state_for_user(&self, user_id: i64) -> Result<PollState, sqlx::Error> {
        sqlx::query_as::<_, PollState>(
            r#"
            INSERT INTO strava_poll_states (user_id, full_fetch_next_page, full_fetch_per_page, full_fetch_completed)
            VALUES ($1, 1, 20, false)
            RETURNING id, user_id, full_fetch_next_page, full_fetch_per_page,
                      full_fetch_completed, last_fetch_completed_at, total_fetches,
                      error_happened, error_happened_at, error_message, error_data,
                      stopped
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn start(&self, poll_state_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE strava_poll_states SET stopped = false WHERE id = $1")
            .bind(poll_state_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn stop(&self, poll_state_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE strava_poll_states SET stopped = true WHERE id = $1")
            .bind(poll_state_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn clear_error(&self, poll_state_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE strava_poll_states
            SET error_happened = false, error_happened_at = NULL,
                error_message = NULL, error_data = NULL
            WHERE id = $1
            "#,
        )
        .bind(poll_state_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records a failed job: sets the error fields and advances
    /// `last_fetch_completed_at` so the eligibility query naturally backs
    /// off instead of hot-looping on the same failing state. Does not set
    /// `stopped`.
    pub async fn mark_error(
        &self,
        poll_state_id: i64,
        message: &str,
        error_data: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE strava_poll_states
            SET error_happened = true, error_happened_at = $2,
                error_message = $3, error_data = $4,
                last_fetch_completed_at = $2
            WHERE id = $1
            "#,
        )
        .bind(poll_state_id)
        .bind(now)
        .bind(message)
        .bind(error_data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Applies a successful fetch: refetches the row inside the
    /// transaction, upserts every activity and its photos, writes the
    /// state-update patch, and commits once. Mirrors the result applier's
    /// contract in §4.5 of the spec this crate implements.
    pub async fn apply_fetch_result(
        &self,
        poll_state_id: i64,
        user_id: i64,
        activity_infos: Vec<ActivityInfo>,
        patch: PollStateUpdate,
    ) -> Result<(), PollError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM strava_poll_states WHERE id = $1 FOR UPDATE")
                .bind(poll_state_id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            // The state was removed out from under us (user deleted
            // mid-fetch). Nothing left to commit against.
            tx.rollback().await?;
            return Ok(());
        }

        for info in activity_infos {
            upsert_activity(&mut tx, user_id, &info.activity).await?;
            upsert_activity_photos(&mut tx, user_id, info.activity.id, &info.photos).await?;
        }

        apply_state_update(&mut tx, poll_state_id, &patch).await?;

        tx.commit().await?;
        Ok(())
    }
}

async fn apply_state_update(
    tx: &mut Transaction<'_, Postgres>,
    poll_state_id: i64,
    patch: &PollStateUpdate,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE strava_poll_states
        SET full_fetch_next_page = COALESCE($2, full_fetch_next_page),
            full_fetch_per_page = COALESCE($3, full_fetch_per_page),
            full_fetch_completed = COALESCE($4, full_fetch_completed),
            total_fetches = $5,
            last_fetch_completed_at = $6
        WHERE id = $1
        "#,
    )
    .bind(poll_state_id)
    .bind(patch.full_fetch_next_page)
    .bind(patch.full_fetch_per_page)
    .bind(patch.full_fetch_completed)
    .bind(patch.total_fetches)
    .bind(patch.last_fetch_completed_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Parses a Strava timestamp, enforcing that it carries a zero UTC offset.
/// A non-zero offset (or an unparseable string) is a hard data error —
/// invariant 7 of the data model this store implements.
fn parse_naive_utc(field: &str, raw: &str) -> Result<DateTime<Utc>, PollError> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map_err(|e| PollError::Data(format!("{field}: unparsable timestamp {raw:?}: {e}")))?;
    if parsed.offset().local_minus_utc() != 0 {
        return Err(PollError::Data(format!(
            "{field}: non-UTC offset in timestamp {raw:?}"
        )));
    }
    Ok(parsed.with_timezone(&Utc))
}

async fn upsert_activity(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    src: &UpstreamActivity,
) -> Result<(), PollError> {
    let start_date = parse_naive_utc("start_date", &src.start_date)?;
    let start_date_local = parse_naive_utc("start_date_local", &src.start_date_local)?;

    let existing = sqlx::query_as::<_, Activity>(
        r#"
        SELECT strava_id, user_id, activity_type, name, description, external_id,
               distance, moving_time, elapsed_time, total_elevation_gain, average_temp,
               start_date, start_date_local, utc_offset, timezone,
               start_lat, start_lng, end_lat, end_lng, summary_polyline, total_photo_count
        FROM activities WHERE strava_id = $1 FOR UPDATE
        "#,
    )
    .bind(src.id)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(existing) = &existing {
        if existing.user_id != user_id {
            return Err(PollError::Data(format!(
                "activity {} belongs to user {}, not {}",
                src.id, existing.user_id, user_id
            )));
        }
    }

    // Update-from-source: every field is overwritten from the upstream
    // value except a missing timezone/description, which keeps whatever
    // was already stored rather than nulling it out. lat/lng are always
    // overwritten, even to null — no drift preservation.
    let description = src
        .description
        .clone()
        .or_else(|| existing.as_ref().and_then(|e| e.description.clone()));
    let timezone = src
        .timezone
        .clone()
        .or_else(|| existing.as_ref().and_then(|e| e.timezone.clone()));
    let (start_lat, start_lng) = src
        .start_latlng
        .map(|[lat, lng]| (Some(lat), Some(lng)))
        .unwrap_or((None, None));
    let (end_lat, end_lng) = src
        .end_latlng
        .map(|[lat, lng]| (Some(lat), Some(lng)))
        .unwrap_or((None, None));
    let summary_polyline = src.map.as_ref().and_then(|m| m.summary_polyline.clone());

    sqlx::query(
        r#"
        INSERT INTO activities (
            strava_id, user_id, activity_type, name, description, external_id,
            distance, moving_time, elapsed_time, total_elevation_gain, average_temp,
            start_date, start_date_local, utc_offset, timezone,
            start_lat, start_lng, end_lat, end_lng, summary_polyline, total_photo_count
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21
        )
        ON CONFLICT (strava_id) DO UPDATE SET
            activity_type = EXCLUDED.activity_type,
            name = EXCLUDED.name,
            description = EXCLUDED.description,
            external_id = EXCLUDED.external_id,
            distance = EXCLUDED.distance,
            moving_time = EXCLUDED.moving_time,
            elapsed_time = EXCLUDED.elapsed_time,
            total_elevation_gain = EXCLUDED.total_elevation_gain,
            average_temp = EXCLUDED.average_temp,
            start_date = EXCLUDED.start_date,
            start_date_local = EXCLUDED.start_date_local,
            utc_offset = EXCLUDED.utc_offset,
            timezone = EXCLUDED.timezone,
            start_lat = EXCLUDED.start_lat,
            start_lng = EXCLUDED.start_lng,
            end_lat = EXCLUDED.end_lat,
            end_lng = EXCLUDED.end_lng,
            summary_polyline = EXCLUDED.summary_polyline,
            total_photo_count = EXCLUDED.total_photo_count
        "#,
    )
    .bind(src.id)
    .bind(user_id)
    .bind(&src.activity_type)
    .bind(&src.name)
    .bind(description)
    .bind(&src.external_id)
    .bind(src.distance)
    .bind(src.moving_time)
    .bind(src.elapsed_time)
    .bind(src.total_elevation_gain)
    .bind(src.average_temp)
    .bind(start_date)
    .bind(start_date_local)
    .bind(src.utc_offset as i32)
    .bind(timezone)
    .bind(start_lat)
    .bind(start_lng)
    .bind(end_lat)
    .bind(end_lng)
    .bind(summary_polyline)
    .bind(src.total_photo_count)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn upsert_activity_photos(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    activity_id: i64,
    photos: &BTreeMap<u32, Vec<PhotoEntry>>,
) -> Result<(), sqlx::Error> {
    let blob = crate::models::activity::canonical_photos_json(photos);

    let existing: Option<(String,)> =
        sqlx::query_as("SELECT data FROM activity_photos WHERE activity_id = $1")
            .bind(activity_id)
            .fetch_optional(&mut **tx)
            .await?;

    if existing.as_ref().map(|(d,)| d.as_str()) == Some(blob.as_str()) {
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO activity_photos (activity_id, user_id, data)
        VALUES ($1, $2, $3)
        ON CONFLICT (activity_id) DO UPDATE SET data = EXCLUDED.data
        "#,
    )
    .bind(activity_id)
    .bind(user_id)
    .bind(blob)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
