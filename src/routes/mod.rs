// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP surface for the `server` binary: a liveness probe and a read-only
//! status endpoint, so the `poller` daemon's database is observable from a
//! container orchestrator. No mutation endpoints live here — everything
//! that writes to `PollState` runs inside the scheduler loop.

use crate::error::Result;
use crate::SharedState;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub eligible_poll_states: i64,
    pub stopped_poll_states: i64,
}

async fn status(
    axum::extract::State(state): axum::extract::State<SharedState>,
) -> Result<Json<StatusResponse>> {
    let row: (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE stopped IS NOT TRUE) AS eligible,
            COUNT(*) FILTER (WHERE stopped IS TRUE) AS stopped
        FROM strava_poll_states
        "#,
    )
    .fetch_one(state.store.pool())
    .await?;

    Ok(Json(StatusResponse {
        eligible_poll_states: row.0,
        stopped_poll_states: row.1,
    }))
}

/// Build the status server's router.
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/status", get(status))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
