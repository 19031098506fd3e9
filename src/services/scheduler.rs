// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! The scheduler (C6): the main loop. Discovers eligible `PollState`s,
//! submits fetch-worker jobs to a bounded pool, harvests completions,
//! drives sleep/backoff, and never double-submits the same state.
//!
//! The in-flight bookkeeping (`inflight_ids`) lives entirely on this loop's
//! own task — workers communicate back only via the completion channel
//! `tokio::task::JoinSet` gives us, never by mutating shared structures.

use crate::db::Store;
use crate::error::PollError;
use crate::services::applier::ResultApplier;
use crate::services::pool::ClientPool;
use crate::services::strava::UpstreamAdapter;
use crate::services::worker::{fetch_activities, FetchResult, PollStateSnapshot, WorkerConfig};
use chrono::Utc;
use futures_util::FutureExt;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Tunables from [`crate::config::PollerArgs`] the scheduler loop needs
/// directly (the rest go to [`WorkerConfig`]).
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub worker_count: usize,
    pub poll_sleep: Duration,
    pub latest_interval: chrono::Duration,
    pub shutdown_deadline: Duration,
}

type JobOutcome = (i64, i64, Result<FetchResult, PollError>);

pub struct Scheduler {
    store: Store,
    pool: ClientPool<Box<dyn UpstreamAdapter>>,
    worker_config: WorkerConfig,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        store: Store,
        pool: ClientPool<Box<dyn UpstreamAdapter>>,
        worker_config: WorkerConfig,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            pool,
            worker_config,
            config,
        }
    }

    /// Runs the loop until `shutdown` is set, then drains in-flight jobs
    /// (bounded by `shutdown_deadline`) before returning.
    pub async fn run(&self, shutdown: Arc<AtomicBool>) {
        let semaphore = Arc::new(Semaphore::new(self.config.worker_count.max(1)));
        let mut inflight: JoinSet<JobOutcome> = JoinSet::new();
        let mut inflight_ids: HashSet<i64> = HashSet::new();

        while !shutdown.load(Ordering::Relaxed) {
            let exclude: Vec<i64> = inflight_ids.iter().copied().collect();
            let eligible = match self
                .store
                .eligible_poll_states(&exclude, self.config.latest_interval, Utc::now())
                .await
            {
                Ok(rows) => rows,
                Err(err) => {
                    tracing::error!(error = %err, "eligibility query failed, backing off");
                    Vec::new()
                }
            };

            for ps in eligible {
                if inflight_ids.contains(&ps.id) {
                    continue;
                }
                inflight_ids.insert(ps.id);

                let semaphore = semaphore.clone();
                let pool = self.pool.clone();
                let store = self.store.clone();
                let worker_config = self.worker_config.clone();
                let poll_state_id = ps.id;
                let user_id = ps.user_id;
                let snapshot = PollStateSnapshot::from(&ps);

                inflight.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("semaphore is never closed");

                    // Catch a panic inside the job itself so the outer tuple
                    // (and therefore `poll_state_id`) always comes back to
                    // the harvester, even when a worker step panics. Without
                    // this, a panicking job would leave its id stuck in
                    // `inflight_ids` forever since a bare `JoinError` carries
                    // no payload to identify which state it belonged to.
                    let outcome = std::panic::AssertUnwindSafe(run_one_job(
                        &store,
                        &pool,
                        &worker_config,
                        &snapshot,
                    ))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        let msg = panic
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "fetch worker panicked".to_string());
                        Err(PollError::Unexpected(anyhow::anyhow!(msg)))
                    });
                    (poll_state_id, user_id, outcome)
                });
            }

            let mut progressed = false;
            while let Some(joined) = inflight.try_join_next() {
                progressed = true;
                self.harvest(joined, &mut inflight_ids).await;
            }

            if !progressed {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_sleep) => {}
                    Some(joined) = inflight.join_next(), if !inflight.is_empty() => {
                        self.harvest(joined, &mut inflight_ids).await;
                    }
                }
            }
        }

        let _ = tokio::time::timeout(self.config.shutdown_deadline, async {
            while let Some(joined) = inflight.join_next().await {
                self.harvest(joined, &mut inflight_ids).await;
            }
        })
        .await;
    }

    async fn harvest(
        &self,
        joined: Result<JobOutcome, tokio::task::JoinError>,
        inflight_ids: &mut HashSet<i64>,
    ) {
        let (poll_state_id, user_id, outcome) = match joined {
            Ok(outcome) => outcome,
            Err(join_err) => {
                // A panic inside the job is already caught and turned into
                // an `Err(PollError::Unexpected)` outcome above, so this
                // branch only fires if the task was cancelled outright. We
                // never call `abort()`, so this should not happen in
                // practice; if it ever does, the id is stuck in
                // `inflight_ids` until the process restarts.
                tracing::error!(error = %join_err, "fetch worker task was cancelled");
                return;
            }
        };

        inflight_ids.remove(&poll_state_id);
        let applier = ResultApplier::new(&self.store);
        applier.apply(poll_state_id, user_id, outcome, Utc::now()).await;
    }
}

async fn run_one_job(
    store: &Store,
    pool: &ClientPool<Box<dyn UpstreamAdapter>>,
    worker_config: &WorkerConfig,
    snapshot: &PollStateSnapshot,
) -> Result<FetchResult, PollError> {
    let token = store
        .get_token(snapshot.user_id)
        .await?
        .ok_or_else(|| PollError::Data(format!("no token on file for user {}", snapshot.user_id)))?;

    let adapter = pool.acquire().await;
    fetch_activities(
        &**adapter,
        &token.access_token,
        snapshot,
        Utc::now(),
        worker_config,
    )
    .await
}
