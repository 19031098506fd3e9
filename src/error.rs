// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error taxonomy for the poller core, plus a thin HTTP-facing error type
//! for the status server.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;
use std::collections::BTreeMap;

/// A single entry in a Strava `errors[]` body, e.g.
/// `{"resource": "Activity", "field": "id", "code": "invalid"}`.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize, PartialEq, Eq)]
pub struct UpstreamErrorDetail {
    pub resource: String,
    pub field: String,
    pub code: String,
}

/// Error taxonomy produced by the upstream adapter, the client pool, and the
/// fetch worker's own sanity checks. Every variant here corresponds to a row
/// in the error handling design's recovery-policy table.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// A call exceeded its configured connect/read timeout.
    #[error("upstream call timed out: {0}")]
    Timeout(String),

    /// A 5xx response or transport-level failure. Retryable.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// A 4xx response that isn't an auth failure.
    #[error("bad request ({status}): {message}")]
    BadRequest {
        status: u16,
        message: String,
        errors: Vec<UpstreamErrorDetail>,
    },

    /// A 4xx response whose `errors[]` names an invalid `access_token`.
    #[error("invalid access token: {message}")]
    InvalidAccessToken {
        message: String,
        body: serde_json::Value,
        headers: BTreeMap<String, String>,
    },

    /// As above, but the error also names the `Athlete` resource — a
    /// stricter variant the applier records identically but which callers
    /// may want to distinguish.
    #[error("invalid athlete access token: {message}")]
    InvalidAthleteAccessToken {
        message: String,
        body: serde_json::Value,
        headers: BTreeMap<String, String>,
    },

    /// A fetch-worker sanity check failed: non-UTC timestamp, anomalous
    /// photo dimensions, or an activity belonging to a different user.
    #[error("data error: {0}")]
    Data(String),

    /// The client pool could not hand out a handle before its timeout.
    #[error("client pool exhausted")]
    PoolEmpty,

    /// A persistence-layer failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Anything else. The applier still records this as an opaque error on
    /// the `PollState` rather than letting it escape.
    #[error("unexpected error: {0}")]
    Unexpected(#[from] anyhow::Error),
}

impl PollError {
    /// Returns true for errors whose recovery policy is "retryable" (the
    /// next scheduler tick will simply try again): `Timeout` and `Upstream`.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PollError::Timeout(_) | PollError::Upstream(_))
    }

    /// The short message recorded in `PollState.error_message`.
    pub fn short_message(&self) -> String {
        match self {
            PollError::InvalidAccessToken { message, .. }
            | PollError::InvalidAthleteAccessToken { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// The opaque JSON blob recorded in `PollState.error_data`, mirroring
    /// the original implementation's habit of stashing the raw response
    /// body and headers alongside the classified error.
    pub fn error_data(&self) -> serde_json::Value {
        match self {
            PollError::InvalidAccessToken { body, headers, .. }
            | PollError::InvalidAthleteAccessToken { body, headers, .. } => serde_json::json!({
                "response_data": body,
                "response_headers": headers,
            }),
            PollError::BadRequest {
                status,
                message,
                errors,
            } => serde_json::json!({
                "status": status,
                "message": message,
                "errors": errors,
            }),
            other => serde_json::json!({ "message": other.to_string() }),
        }
    }
}

/// HTTP-facing error type for the status server. Kept deliberately small:
/// the status server exposes no mutation endpoints.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(error = %self, "status server error");
        (
            status,
            Json(ErrorResponse {
                error: status.canonical_reason().unwrap_or("error").to_string(),
            }),
        )
            .into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
