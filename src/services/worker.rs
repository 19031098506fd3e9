// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! The fetch worker (C4): a pure function from `(token, poll state
//! snapshot, now)` to a result envelope plus a state-update patch. Pure in
//! the sense that it touches no database — everything it needs comes in as
//! arguments and everything it produces comes back as plain data, so it is
//! unit-testable with a mock adapter and no running Postgres.

use crate::error::PollError;
use crate::models::{PhotoEntry, PollStateUpdate};
use crate::services::strava::{ListActivitiesParams, UpstreamActivity, UpstreamAdapter};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Per-page size used when `PollState.full_fetch_per_page` hasn't been set.
pub const DEFAULT_PER_PAGE: i32 = 20;
/// `per_page` used for LATEST mode's activity listing call.
pub const LATEST_PAGE_SIZE: i32 = 50;
/// Lookback window, in days, for LATEST mode's `after` cutoff.
pub const LATEST_LOOKBACK_DAYS: i64 = 14;
/// Photo sizes fetched for every activity that reports at least one photo.
pub const PHOTO_SIZES: [u32; 2] = [256, 1024];

/// Tunables threaded in from [`crate::config::PollerArgs`], so the worker's
/// defaults above are only used when the caller (tests, mostly) doesn't
/// care to override them.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub full_fetch_per_page: i32,
    pub latest_page_size: i32,
    pub latest_lookback: chrono::Duration,
    pub photo_sizes: Vec<u32>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            full_fetch_per_page: DEFAULT_PER_PAGE,
            latest_page_size: LATEST_PAGE_SIZE,
            latest_lookback: chrono::Duration::days(LATEST_LOOKBACK_DAYS),
            photo_sizes: PHOTO_SIZES.to_vec(),
        }
    }
}

/// A frozen view of the `PollState` row the worker dispatches on. Carries
/// only what the worker needs to decide FULL vs LATEST and to build the
/// state-update patch; the applier re-reads the live row before writing.
#[derive(Debug, Clone)]
pub struct PollStateSnapshot {
    pub id: i64,
    pub user_id: i64,
    pub full_fetch_next_page: Option<i32>,
    pub full_fetch_per_page: i32,
    pub full_fetch_completed: bool,
    pub last_fetch_completed_at: Option<DateTime<Utc>>,
    pub total_fetches: i64,
}

impl From<&crate::models::PollState> for PollStateSnapshot {
    fn from(ps: &crate::models::PollState) -> Self {
        Self {
            id: ps.id,
            user_id: ps.user_id,
            full_fetch_next_page: ps.full_fetch_next_page,
            full_fetch_per_page: ps.full_fetch_per_page,
            full_fetch_completed: ps.full_fetch_completed,
            last_fetch_completed_at: ps.last_fetch_completed_at,
            total_fetches: ps.total_fetches,
        }
    }
}

/// One fetched activity plus its resolved photos, keyed by requested size.
#[derive(Debug, Clone)]
pub struct ActivityInfo {
    pub activity: UpstreamActivity,
    pub photos: BTreeMap<u32, Vec<PhotoEntry>>,
}

/// The value-only output of a single worker invocation.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub activity_infos: Vec<ActivityInfo>,
    pub state_update: PollStateUpdate,
}

/// Dispatch to FULL or LATEST mode depending on `snapshot.full_fetch_completed`.
pub async fn fetch_activities(
    adapter: &dyn UpstreamAdapter,
    token: &str,
    snapshot: &PollStateSnapshot,
    now: DateTime<Utc>,
    config: &WorkerConfig,
) -> Result<FetchResult, PollError> {
    if !snapshot.full_fetch_completed {
        full_fetch(adapter, token, snapshot, now, config).await
    } else {
        latest_fetch(adapter, token, snapshot, now, config).await
    }
}

async fn full_fetch(
    adapter: &dyn UpstreamAdapter,
    token: &str,
    snapshot: &PollStateSnapshot,
    now: DateTime<Utc>,
    config: &WorkerConfig,
) -> Result<FetchResult, PollError> {
    let page = snapshot.full_fetch_next_page.unwrap_or(1);
    let per_page = if snapshot.full_fetch_per_page > 0 {
        snapshot.full_fetch_per_page
    } else {
        config.full_fetch_per_page
    };

    let activities = adapter
        .list_activities(
            token,
            ListActivitiesParams {
                page: Some(page),
                per_page: Some(per_page),
                ..Default::default()
            },
        )
        .await?;

    let surviving = filter_resource_state(activities);
    let activity_infos = fetch_photos_for_activities(adapter, token, surviving, config).await?;

    let state_update = PollStateUpdate {
        full_fetch_next_page: Some(page + 1),
        full_fetch_per_page: Some(per_page),
        full_fetch_completed: Some(activity_infos.is_empty()),
        total_fetches: snapshot.total_fetches + 1,
        last_fetch_completed_at: now,
    };

    Ok(FetchResult {
        activity_infos,
        state_update,
    })
}

async fn latest_fetch(
    adapter: &dyn UpstreamAdapter,
    token: &str,
    snapshot: &PollStateSnapshot,
    now: DateTime<Utc>,
    config: &WorkerConfig,
) -> Result<FetchResult, PollError> {
    let reference = snapshot.last_fetch_completed_at.unwrap_or(now);
    let after_dt = reference - config.latest_lookback;

    if now - after_dt > config.latest_lookback + chrono::Duration::days(1) {
        tracing::warn!(
            poll_state_id = snapshot.id,
            after = %after_dt,
            "latest fetch window has grown past lookback + 1 day, a full refetch may be needed"
        );
    }

    let activities = adapter
        .list_activities(
            token,
            ListActivitiesParams {
                after: Some(after_dt.timestamp()),
                per_page: Some(config.latest_page_size),
                ..Default::default()
            },
        )
        .await?;

    if activities.len() as i32 >= config.latest_page_size {
        tracing::warn!(
            poll_state_id = snapshot.id,
            count = activities.len(),
            "latest fetch returned a full page, results may be truncated"
        );
    }

    let surviving = filter_resource_state(activities);
    let activity_infos = fetch_photos_for_activities(adapter, token, surviving, config).await?;

    let state_update = PollStateUpdate {
        full_fetch_next_page: None,
        full_fetch_per_page: None,
        full_fetch_completed: None,
        total_fetches: snapshot.total_fetches + 1,
        last_fetch_completed_at: now,
    };

    Ok(FetchResult {
        activity_infos,
        state_update,
    })
}

/// Drop activities with a negative `resource_state`. Defensive: the
/// upstream contract doesn't promise this can't happen, so we skip rather
/// than fail the whole job. If the contract is ever tightened to guarantee
/// non-negative `resource_state`, this filter becomes dead code — kept as
/// is rather than guessed away.
fn filter_resource_state(activities: Vec<UpstreamActivity>) -> Vec<UpstreamActivity> {
    activities
        .into_iter()
        .filter(|a| {
            if a.resource_state < 0 {
                tracing::warn!(activity_id = a.id, resource_state = a.resource_state, "skipping activity with negative resource_state");
                false
            } else {
                true
            }
        })
        .collect()
}

async fn fetch_photos_for_activities(
    adapter: &dyn UpstreamAdapter,
    token: &str,
    activities: Vec<UpstreamActivity>,
    config: &WorkerConfig,
) -> Result<Vec<ActivityInfo>, PollError> {
    let mut infos = Vec::with_capacity(activities.len());
    for activity in activities {
        let photos = fetch_photos_for_activity(adapter, token, &activity, config).await?;
        infos.push(ActivityInfo { activity, photos });
    }
    Ok(infos)
}

/// For an activity with photos, fetch each configured size and annotate
/// every returned photo with the width/height resolved from its `sizes`
/// map. An activity with `total_photo_count == 0` costs no network call.
async fn fetch_photos_for_activity(
    adapter: &dyn UpstreamAdapter,
    token: &str,
    activity: &UpstreamActivity,
    config: &WorkerConfig,
) -> Result<BTreeMap<u32, Vec<PhotoEntry>>, PollError> {
    let mut by_size = BTreeMap::new();
    if activity.total_photo_count == 0 {
        return Ok(by_size);
    }

    for &size in &config.photo_sizes {
        let photos = adapter.activity_photos(token, activity.id, size).await?;
        let mut annotated = Vec::with_capacity(photos.len());
        for photo in photos {
            if photo.sizes.len() != 1 {
                return Err(PollError::Data(format!(
                    "activity {}: expected exactly one size entry, got {}",
                    activity.id,
                    photo.sizes.len()
                )));
            }
            let (width, height) = *photo.sizes.values().next().expect("checked len == 1");
            if width != size && height != size {
                return Err(PollError::Data(format!(
                    "activity {}: photo dimensions {}x{} match neither requested size {}",
                    activity.id, width, height, size
                )));
            }

            let url = photo
                .urls
                .values()
                .next()
                .cloned()
                .unwrap_or_default();

            annotated.push(PhotoEntry {
                url,
                width,
                height,
                caption: photo.caption,
            });
        }
        by_size.insert(size, annotated);
    }

    Ok(by_size)
}
