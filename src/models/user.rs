// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! `User` and `Token`, both external to the core: the login/enrollment
//! subsystem owns their lifecycle, the core only reads them.

use chrono::{DateTime, Utc};

/// A user whose Strava history the poller mirrors. Referenced by id only;
/// the core never mutates this row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub strava_athlete_id: i64,
    pub created_at: DateTime<Utc>,
}

/// OAuth credentials for a user, 1:1 with [`User`]. The core consumes this
/// read-only: if it turns out to be invalid, the core records an
/// auth-class error on `PollState` but does not refresh or mutate the
/// token itself (refresh is a non-goal of this crate).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Token {
    pub user_id: i64,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}
