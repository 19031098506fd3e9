// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use sqlx::postgres::PgPoolOptions;
use std::time::{SystemTime, UNIX_EPOCH};
use strava_poller::db::Store;
use strava_poller::models::PollState;

/// Check if a Postgres test database is available via environment variable.
#[allow(dead_code)]
pub fn database_available() -> bool {
    std::env::var("DATABASE_URL").is_ok()
}

/// Skip test with a message if no test database is configured.
#[macro_export]
macro_rules! require_database {
    () => {
        if !crate::common::database_available() {
            eprintln!("skipping: DATABASE_URL not set");
            return;
        }
    };
}

/// Connect to the test database and apply migrations. Safe to call from
/// many tests concurrently: `sqlx::migrate!` tracks what it already ran.
#[allow(dead_code)]
pub async fn test_store() -> Store {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");

    Store::from_pool(pool)
}

/// A Strava athlete id unique enough for test isolation within a shared
/// database (tests never clean up after themselves, same as the
/// Firestore-emulator tests this harness is modeled on).
#[allow(dead_code)]
pub fn unique_athlete_id() -> i64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    (nanos % (i64::MAX as u128)) as i64
}

/// Creates a user, a token, and a freshly backfilling `PollState` for it.
#[allow(dead_code)]
pub async fn create_enrolled_user(store: &Store, access_token: &str) -> (i64, PollState) {
    let athlete_id = unique_athlete_id();

    let (user_id,): (i64,) =
        sqlx::query_as("INSERT INTO users (strava_athlete_id) VALUES ($1) RETURNING id")
            .bind(athlete_id)
            .fetch_one(store.pool())
            .await
            .expect("insert user");

    sqlx::query("INSERT INTO tokens (user_id, access_token) VALUES ($1, $2)")
        .bind(user_id)
        .bind(access_token)
        .execute(store.pool())
        .await
        .expect("insert token");

    let poll_state = store
        .create_poll_state_for_user(user_id)
        .await
        .expect("create poll state");

    (user_id, poll_state)
}
