// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! strava-poller: mirrors a user's Strava activity history into a local
//! Postgres database.
//!
//! The hard engineering lives in [`services::scheduler`]: a long-running
//! loop that, for every enrolled user, keeps the local copy of their
//! activities and photos eventually consistent with Strava under rate
//! limits, network flakiness, and credential expiry. Everything else in
//! this crate (config, error taxonomy, the status server) is glue around
//! that loop.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::Store;
use std::sync::Arc;

/// Shared application state for the status server binary.
pub struct AppState {
    pub config: Config,
    pub store: Store,
}

pub type SharedState = Arc<AppState>;

/// Initialize structured JSON logging to stdout, seeded from a `--loglevel`
/// string falling back to `RUST_LOG`. Shared by both binaries so their
/// output is uniform.
pub fn init_logging(loglevel: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let default_directive = format!("strava_poller={loglevel}");

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive)),
        )
        .with(format)
        .init();
}
