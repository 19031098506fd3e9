// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! `PollState`: the central entity of the polling core, 1:1 with `User`.

use chrono::{DateTime, Utc};

/// Per-user polling state driving FULL/LATEST mode selection and
/// scheduling eligibility. Created by the login/enrollment subsystem with
/// `full_fetch_next_page = 1, full_fetch_completed = false`; mutated only
/// by the core from then on.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PollState {
    pub id: i64,
    pub user_id: i64,
    pub full_fetch_next_page: Option<i32>,
    pub full_fetch_per_page: i32,
    pub full_fetch_completed: bool,
    pub last_fetch_completed_at: Option<DateTime<Utc>>,
    pub total_fetches: i64,
    pub error_happened: bool,
    pub error_happened_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub error_data: Option<serde_json::Value>,
    pub stopped: bool,
}

/// The named-field patch a fetch worker hands back to the result applier.
/// `total_fetches` and `last_fetch_completed_at` are always set by a
/// completed fetch (success or failure); the `full_fetch_*` fields are
/// only touched by FULL mode.
#[derive(Debug, Clone, Default)]
pub struct PollStateUpdate {
    pub full_fetch_next_page: Option<i32>,
    pub full_fetch_per_page: Option<i32>,
    pub full_fetch_completed: Option<bool>,
    pub total_fetches: i64,
    pub last_fetch_completed_at: DateTime<Utc>,
}
