// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Integration tests for the PollState store (C3) and the result applier
//! (C5), run against a real Postgres database.
//!
//! Gated behind a reachable `DATABASE_URL`, following the same pattern as
//! `require_emulator!` in the rest of this corpus's test suites.

mod common;

use async_trait::async_trait;
use chrono::Utc;
use common::{create_enrolled_user, test_store};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use strava_poller::error::PollError;
use strava_poller::services::strava::{
    ListActivitiesParams, UpstreamActivity, UpstreamAdapter, UpstreamPhoto,
};
use strava_poller::services::worker::{fetch_activities, PollStateSnapshot, WorkerConfig};
use strava_poller::services::ResultApplier;

fn activity(id: i64) -> UpstreamActivity {
    UpstreamActivity {
        id,
        resource_state: 2,
        activity_type: "Ride".to_string(),
        name: format!("ride {id}"),
        description: None,
        external_id: None,
        distance: Some(5000.0),
        moving_time: Some(1200),
        elapsed_time: Some(1300),
        total_elevation_gain: Some(50.0),
        average_temp: None,
        start_date: "2017-07-01T00:00:00Z".to_string(),
        start_date_local: "2017-07-01T00:00:00Z".to_string(),
        utc_offset: 0.0,
        timezone: Some("(GMT) UTC".to_string()),
        start_latlng: Some([37.4, -122.1]),
        end_latlng: Some([37.5, -122.2]),
        map: None,
        total_photo_count: 0,
    }
}

/// An adapter whose activity pages are scripted by requested page number.
struct PagedAdapter {
    pages: Mutex<HashMap<i32, Vec<UpstreamActivity>>>,
}

#[async_trait]
impl UpstreamAdapter for PagedAdapter {
    async fn list_activities(
        &self,
        _token: &str,
        params: ListActivitiesParams,
    ) -> Result<Vec<UpstreamActivity>, PollError> {
        let page = params.page.unwrap_or(1);
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(&page)
            .cloned()
            .unwrap_or_default())
    }

    async fn activity_photos(
        &self,
        _token: &str,
        _activity_id: i64,
        _size: u32,
    ) -> Result<Vec<UpstreamPhoto>, PollError> {
        Ok(Vec::new())
    }
}

/// S1: FULL mode runs page 1 (three activities), then page 2 (empty), and
/// completes. Mirrors what the scheduler does per tick: fetch, then apply.
#[tokio::test]
async fn full_fetch_completes_after_two_ticks() {
    require_database!();
    let store = test_store().await;
    let (user_id, poll_state) = create_enrolled_user(&store, "tok-s1").await;

    let adapter = PagedAdapter {
        pages: Mutex::new(HashMap::from([
            (1, vec![activity(1001), activity(1002), activity(1003)]),
            (2, vec![]),
        ])),
    };
    let config = WorkerConfig::default();
    let applier = ResultApplier::new(&store);

    // Tick 1: page 1, three activities.
    let snapshot = PollStateSnapshot::from(&poll_state);
    let result = fetch_activities(&adapter, "tok-s1", &snapshot, Utc::now(), &config)
        .await
        .expect("tick 1 fetch succeeds");
    applier
        .apply(poll_state.id, user_id, Ok(result), Utc::now())
        .await;

    let after_tick1 = store
        .get_poll_state(poll_state.id)
        .await
        .unwrap()
        .expect("poll state exists");
    assert_eq!(after_tick1.full_fetch_next_page, Some(2));
    assert!(!after_tick1.full_fetch_completed);
    assert_eq!(after_tick1.total_fetches, 1);

    // Tick 2: page 2, empty, backfill completes.
    let snapshot2 = PollStateSnapshot::from(&after_tick1);
    let result2 = fetch_activities(&adapter, "tok-s1", &snapshot2, Utc::now(), &config)
        .await
        .expect("tick 2 fetch succeeds");
    applier
        .apply(poll_state.id, user_id, Ok(result2), Utc::now())
        .await;

    let after_tick2 = store
        .get_poll_state(poll_state.id)
        .await
        .unwrap()
        .expect("poll state exists");
    assert_eq!(after_tick2.full_fetch_next_page, Some(3));
    assert!(after_tick2.full_fetch_completed);
    assert_eq!(after_tick2.total_fetches, 2);

    let stored: Vec<(i64,)> =
        sqlx::query_as("SELECT strava_id FROM activities WHERE user_id = $1 ORDER BY strava_id")
            .bind(user_id)
            .fetch_all(store.pool())
            .await
            .unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[0].0, 1001);
}

/// S3: an `InvalidAthleteAccessToken` from a job is recorded on the
/// `PollState` verbatim, including response headers, and does not stop it.
#[tokio::test]
async fn auth_failure_is_recorded_without_stopping() {
    require_database!();
    let store = test_store().await;
    let (user_id, poll_state) = create_enrolled_user(&store, "tok-s3").await;
    let applier = ResultApplier::new(&store);

    let err = PollError::InvalidAthleteAccessToken {
        message: "Really bad auth error".to_string(),
        body: serde_json::json!({
            "message": "Really bad auth error",
            "errors": [{"resource": "Athlete", "field": "access_token", "code": "invalid"}],
        }),
        headers: BTreeMap::from([("Cache-Control".to_string(), "no-cache".to_string())]),
    };

    applier
        .apply(poll_state.id, user_id, Err(err), Utc::now())
        .await;

    let after = store
        .get_poll_state(poll_state.id)
        .await
        .unwrap()
        .expect("poll state exists");
    assert!(after.error_happened);
    assert!(!after.stopped);
    assert!(after.error_happened_at.is_some());
    assert_eq!(after.error_message.as_deref(), Some("Really bad auth error"));
    let data = after.error_data.expect("error data recorded");
    assert_eq!(
        data["response_headers"]["Cache-Control"],
        serde_json::json!("no-cache")
    );
}

/// S4: an unhandled/generic error still produces exactly one `PollState`
/// commit (error fields + `last_fetch_completed_at`), and a LATEST-mode
/// state backs off instead of being reselected on the immediate next tick.
#[tokio::test]
async fn unhandled_error_backs_off_latest_mode_state() {
    require_database!();
    let store = test_store().await;
    let (user_id, poll_state) = create_enrolled_user(&store, "tok-s4").await;

    // Promote to LATEST mode as if backfill had already finished.
    sqlx::query("UPDATE strava_poll_states SET full_fetch_completed = true WHERE id = $1")
        .bind(poll_state.id)
        .execute(store.pool())
        .await
        .unwrap();

    let applier = ResultApplier::new(&store);
    let now = Utc::now();
    applier
        .apply(
            poll_state.id,
            user_id,
            Err(PollError::Unexpected(anyhow::anyhow!("boom"))),
            now,
        )
        .await;

    let after = store
        .get_poll_state(poll_state.id)
        .await
        .unwrap()
        .expect("poll state exists");
    assert!(after.error_happened);
    assert!(!after.stopped);
    assert!(after.last_fetch_completed_at.is_some());

    let eligible = store
        .eligible_poll_states(&[], chrono::Duration::minutes(5), now)
        .await
        .unwrap();
    assert!(
        !eligible.iter().any(|ps| ps.id == poll_state.id),
        "a just-failed LATEST-mode state should not be immediately reselected"
    );
}

/// S5: applying byte-identical photo results twice writes the
/// `activity_photos` row only once; the second write is a no-op.
#[tokio::test]
async fn identical_photo_results_are_written_once() {
    require_database!();
    let store = test_store().await;
    let (user_id, poll_state) = create_enrolled_user(&store, "tok-s5").await;

    let mut act = activity(2001);
    act.total_photo_count = 1;
    let mut photos = BTreeMap::new();
    photos.insert(
        256,
        vec![strava_poller::models::PhotoEntry {
            url: "https://example.com/256.jpg".to_string(),
            width: 256,
            height: 192,
            caption: Some("summit".to_string()),
        }],
    );

    let activity_info = strava_poller::services::ActivityInfo {
        activity: act,
        photos: photos.clone(),
    };

    let patch1 = strava_poller::models::PollStateUpdate {
        full_fetch_next_page: Some(2),
        full_fetch_per_page: Some(20),
        full_fetch_completed: Some(false),
        total_fetches: 1,
        last_fetch_completed_at: Utc::now(),
    };
    store
        .apply_fetch_result(poll_state.id, user_id, vec![activity_info.clone()], patch1)
        .await
        .expect("first apply succeeds");

    let (xmin_after_first,): (String,) = sqlx::query_as(
        "SELECT xmin::text FROM activity_photos WHERE activity_id = $1",
    )
    .bind(2001_i64)
    .fetch_one(store.pool())
    .await
    .unwrap();

    let patch2 = strava_poller::models::PollStateUpdate {
        full_fetch_next_page: Some(3),
        full_fetch_per_page: Some(20),
        full_fetch_completed: Some(false),
        total_fetches: 2,
        last_fetch_completed_at: Utc::now(),
    };
    store
        .apply_fetch_result(poll_state.id, user_id, vec![activity_info], patch2)
        .await
        .expect("second apply succeeds");

    let (xmin_after_second,): (String,) = sqlx::query_as(
        "SELECT xmin::text FROM activity_photos WHERE activity_id = $1",
    )
    .bind(2001_i64)
    .fetch_one(store.pool())
    .await
    .unwrap();

    assert_eq!(
        xmin_after_first, xmin_after_second,
        "identical photo payload must not rewrite the row"
    );

    let (data,): (String,) = sqlx::query_as("SELECT data FROM activity_photos WHERE activity_id = $1")
        .bind(2001_i64)
        .fetch_one(store.pool())
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&data).unwrap();
    assert_eq!(parsed["256"].as_array().unwrap().len(), 1);
}

/// S6 / invariant 1 & 3: the eligibility query excludes ids already
/// in-flight and rows marked `stopped`, which is how the scheduler
/// guarantees at most one job per user at a time.
#[tokio::test]
async fn eligibility_excludes_inflight_and_stopped_states() {
    require_database!();
    let store = test_store().await;
    let (_user_id, poll_state) = create_enrolled_user(&store, "tok-s6").await;

    let now = Utc::now();
    let eligible_before = store
        .eligible_poll_states(&[], chrono::Duration::minutes(5), now)
        .await
        .unwrap();
    assert!(eligible_before.iter().any(|ps| ps.id == poll_state.id));

    // Simulate the scheduler having this id in-flight.
    let excluded = store
        .eligible_poll_states(&[poll_state.id], chrono::Duration::minutes(5), now)
        .await
        .unwrap();
    assert!(
        !excluded.iter().any(|ps| ps.id == poll_state.id),
        "an in-flight id must not be reselected"
    );

    store.stop(poll_state.id).await.unwrap();
    let after_stop = store
        .eligible_poll_states(&[], chrono::Duration::minutes(5), now)
        .await
        .unwrap();
    assert!(
        !after_stop.iter().any(|ps| ps.id == poll_state.id),
        "a stopped state must never be selected"
    );

    store.start(poll_state.id).await.unwrap();
    let after_start = store
        .eligible_poll_states(&[], chrono::Duration::minutes(5), now)
        .await
        .unwrap();
    assert!(after_start.iter().any(|ps| ps.id == poll_state.id));
}
