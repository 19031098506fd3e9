// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! The result applier (C5). Runs on the scheduler's own task, never inside
//! a worker: it is the only thing that writes to the database on behalf
//! of a completed fetch, and it never lets an error escape back to the
//! scheduler loop — every job outcome, success or failure, concludes with
//! exactly one `PollState` commit.

use crate::db::Store;
use crate::error::PollError;
use crate::services::worker::FetchResult;
use chrono::{DateTime, Utc};

pub struct ResultApplier<'a> {
    store: &'a Store,
}

impl<'a> ResultApplier<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Apply one job's outcome. `now` is passed in rather than read from the
    /// clock so error-path tests are deterministic.
    pub async fn apply(
        &self,
        poll_state_id: i64,
        user_id: i64,
        outcome: Result<FetchResult, PollError>,
        now: DateTime<Utc>,
    ) {
        match outcome {
            Ok(result) => {
                if let Err(err) = self
                    .store
                    .apply_fetch_result(
                        poll_state_id,
                        user_id,
                        result.activity_infos,
                        result.state_update,
                    )
                    .await
                {
                    tracing::warn!(poll_state_id, error = %err, "fetch result failed to apply, recording error instead");
                    self.record_failure(poll_state_id, &err, now).await;
                }
            }
            Err(err) => {
                tracing::warn!(poll_state_id, error = %err, "fetch job failed");
                self.record_failure(poll_state_id, &err, now).await;
            }
        }
    }

    /// Records a failure on the `PollState`. If this write itself fails
    /// (database unreachable), we log and give up for this tick rather
    /// than propagate — the next eligibility query will simply pick the
    /// state up again.
    async fn record_failure(&self, poll_state_id: i64, err: &PollError, now: DateTime<Utc>) {
        if let Err(db_err) = self
            .store
            .mark_error(poll_state_id, &err.short_message(), err.error_data(), now)
            .await
        {
            tracing::error!(
                poll_state_id,
                error = %db_err,
                "failed to record poll error; state will be retried next tick"
            );
        }
    }
}
