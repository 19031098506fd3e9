// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! `server`: a minimal HTTP surface exposing liveness and a read-only
//! status view of the poller's database, so the daemon is observable from
//! a container orchestrator. Carries no OAuth, HTML, or map rendering —
//! those are out of this crate's scope.

use std::sync::Arc;
use strava_poller::config::Config;
use strava_poller::db::Store;
use strava_poller::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    strava_poller::init_logging("info");

    let config = Config::from_env().expect("failed to load configuration");
    tracing::info!(port = config.port, "starting status server");

    let store = Store::connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    let state = Arc::new(AppState {
        config: config.clone(),
        store,
    });

    let app = strava_poller::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "status server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
