// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! `poller`: the long-running daemon that mirrors every enrolled user's
//! Strava activity history into Postgres.

use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strava_poller::config::{Config, PollerArgs};
use strava_poller::db::Store;
use strava_poller::services::pool::ClientPool;
use strava_poller::services::scheduler::{Scheduler, SchedulerConfig};
use strava_poller::services::strava::StravaAdapter;
use strava_poller::services::strava::UpstreamAdapter;
use strava_poller::services::worker::WorkerConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let args = PollerArgs::parse();
    strava_poller::init_logging(&args.loglevel);

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(err) => {
            tracing::error!(error = %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let store = match Store::connect(&config.database_url).await {
        Ok(s) => s,
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to database");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        worker_count = args.worker_count,
        poll_sleep_secs = args.poll_sleep_secs,
        "starting poller"
    );

    let connect_timeout = args.upstream_connect_timeout();
    let read_timeout = args.upstream_read_timeout();
    let base_url = config.strava_base_url.clone();
    let client_id = config.strava_client_id.clone();
    let client_secret = config.strava_client_secret.clone();

    let pool: ClientPool<Box<dyn UpstreamAdapter>> = ClientPool::new(
        move || {
            Box::new(StravaAdapter::new(
                base_url.clone(),
                client_id.clone(),
                client_secret.clone(),
                connect_timeout,
                read_timeout,
            )) as Box<dyn UpstreamAdapter>
        },
        args.pool_max_size,
    );

    let worker_config = WorkerConfig {
        full_fetch_per_page: args.full_fetch_per_page,
        latest_page_size: args.latest_lookback_per_page,
        latest_lookback: args.latest_lookback(),
        ..WorkerConfig::default()
    };

    let scheduler_config = SchedulerConfig {
        worker_count: args.worker_count,
        poll_sleep: args.poll_sleep(),
        latest_interval: args.latest_interval(),
        shutdown_deadline: args.shutdown_deadline(),
    };

    let scheduler = Scheduler::new(store, pool, worker_config, scheduler_config);

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received, draining in-flight jobs");
        shutdown_signal.store(true, Ordering::Relaxed);
    });

    scheduler.run(shutdown).await;
    tracing::info!("poller stopped cleanly");
    ExitCode::SUCCESS
}
