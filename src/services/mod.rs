// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! The polling core: upstream adapter, client pool, fetch worker, result
//! applier, and scheduler.

pub mod applier;
pub mod pool;
pub mod scheduler;
pub mod strava;
pub mod worker;

pub use applier::ResultApplier;
pub use pool::{ClientPool, PoolGuard};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use strava::{StravaAdapter, UpstreamAdapter};
pub use worker::{fetch_activities, ActivityInfo, FetchResult, PollStateSnapshot, WorkerConfig};
