// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! The upstream adapter (C1): typed calls to the Strava API, and the error
//! classification the rest of the core relies on.

use crate::error::{PollError, UpstreamErrorDetail};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Raw Strava activity shape, decoded verbatim from the list-activities
/// response.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamActivity {
    pub id: i64,
    #[serde(default = "default_resource_state")]
    pub resource_state: i32,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub moving_time: Option<i32>,
    #[serde(default)]
    pub elapsed_time: Option<i32>,
    #[serde(default)]
    pub total_elevation_gain: Option<f64>,
    #[serde(default)]
    pub average_temp: Option<f64>,
    pub start_date: String,
    pub start_date_local: String,
    #[serde(default)]
    pub utc_offset: f64,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub start_latlng: Option<[f64; 2]>,
    #[serde(default)]
    pub end_latlng: Option<[f64; 2]>,
    #[serde(default)]
    pub map: Option<UpstreamMap>,
    #[serde(default)]
    pub total_photo_count: i32,
}

/// A missing `resource_state` means the upstream didn't return one at all,
/// which the original poller treats as absent rather than "unset" — `-1`
/// falls below `filter_resource_state`'s `< 0` cutoff, so the activity is
/// dropped instead of kept.
fn default_resource_state() -> i32 {
    -1
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamMap {
    #[serde(default)]
    pub summary_polyline: Option<String>,
}

/// A photo as returned by the activity-photos endpoint. `sizes` maps a
/// size label (Strava's own internal key, not the requested size) to
/// `[width, height]`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamPhoto {
    #[serde(default)]
    pub unique_id: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub urls: HashMap<String, String>,
    #[serde(default)]
    pub sizes: HashMap<String, (u32, u32)>,
}

/// Parameters for [`UpstreamAdapter::list_activities`].
#[derive(Debug, Clone, Default)]
pub struct ListActivitiesParams {
    pub page: Option<i32>,
    pub per_page: Option<i32>,
    pub before: Option<i64>,
    pub after: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchangeResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub athlete: serde_json::Value,
}

/// The contract the fetch worker and client pool depend on. Implemented by
/// [`StravaAdapter`] for production use and by a mock in unit tests.
#[async_trait]
pub trait UpstreamAdapter: Send + Sync {
    async fn list_activities(
        &self,
        token: &str,
        params: ListActivitiesParams,
    ) -> Result<Vec<UpstreamActivity>, PollError>;

    async fn activity_photos(
        &self,
        token: &str,
        activity_id: i64,
        size: u32,
    ) -> Result<Vec<UpstreamPhoto>, PollError>;
}

/// Production adapter, backed by `reqwest`. Stateless beyond the
/// credential configuration and a reusable connection handle — the same
/// instance is what the client pool hands out and takes back.
pub struct StravaAdapter {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl StravaAdapter {
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .expect("reqwest client configuration is static and valid");

        Self {
            http,
            base_url: base_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Build the OAuth authorization redirect URL. Not exercised by the
    /// poller core; kept for parity with the login subsystem, which shares
    /// this adapter's client id.
    pub fn authorize_redirect_url(&self, redirect_uri: &str, state: &str, scope: &str) -> String {
        format!(
            "https://www.strava.com/oauth/authorize?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.client_id,
            urlencoding_lite(redirect_uri),
            urlencoding_lite(scope),
            urlencoding_lite(state),
        )
    }

    pub async fn exchange_token(&self, code: &str) -> Result<TokenExchangeResponse, PollError> {
        let response = self
            .http
            .post("https://www.strava.com/oauth/token")
            .json(&serde_json::json!({
                "client_id": self.client_id,
                "client_secret": self.client_secret,
                "code": code,
                "grant_type": "authorization_code",
            }))
            .send()
            .await
            .map_err(classify_transport_error)?;

        let headers = collect_headers(response.headers());
        let status = response.status();
        let body = response.text().await.map_err(classify_transport_error)?;

        if status.is_success() {
            serde_json::from_str(&body)
                .map_err(|e| PollError::Data(format!("undecodable token response: {e}")))
        } else {
            Err(classify_error_body(status.as_u16(), &body, headers))
        }
    }
}

#[async_trait]
impl UpstreamAdapter for StravaAdapter {
    async fn list_activities(
        &self,
        token: &str,
        params: ListActivitiesParams,
    ) -> Result<Vec<UpstreamActivity>, PollError> {
        let url = format!("{}/athlete/activities", self.base_url);
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(page) = params.page {
            query.push(("page", page.to_string()));
        }
        if let Some(per_page) = params.per_page {
            query.push(("per_page", per_page.to_string()));
        }
        if let Some(before) = params.before {
            query.push(("before", before.to_string()));
        }
        if let Some(after) = params.after {
            query.push(("after", after.to_string()));
        }

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&query)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let headers = collect_headers(response.headers());
        let status = response.status();
        let body = response.text().await.map_err(classify_transport_error)?;

        if status.is_success() {
            serde_json::from_str(&body)
                .map_err(|e| PollError::Data(format!("undecodable activities response: {e}")))
        } else {
            Err(classify_error_body(status.as_u16(), &body, headers))
        }
    }

    async fn activity_photos(
        &self,
        token: &str,
        activity_id: i64,
        size: u32,
    ) -> Result<Vec<UpstreamPhoto>, PollError> {
        let url = format!("{}/activities/{}/photos", self.base_url, activity_id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[
                ("size", size.to_string()),
                ("photo_sources", "true".to_string()),
            ])
            .send()
            .await
            .map_err(classify_transport_error)?;

        let headers = collect_headers(response.headers());
        let status = response.status();
        let body = response.text().await.map_err(classify_transport_error)?;

        if status.is_success() {
            serde_json::from_str(&body)
                .map_err(|e| PollError::Data(format!("undecodable photos response: {e}")))
        } else {
            Err(classify_error_body(status.as_u16(), &body, headers))
        }
    }
}

fn collect_headers(headers: &reqwest::header::HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn classify_transport_error(err: reqwest::Error) -> PollError {
    if err.is_timeout() {
        PollError::Timeout(err.to_string())
    } else {
        PollError::Upstream(err.to_string())
    }
}

/// Classify a non-2xx response body per the adapter contract: an
/// `errors[]` entry naming an invalid `access_token` becomes
/// `InvalidAccessToken` (or the stricter `InvalidAthleteAccessToken` when
/// the `Athlete` resource is also named); any other 4xx is `BadRequest`;
/// 5xx is `Upstream`.
fn classify_error_body(status: u16, body: &str, headers: BTreeMap<String, String>) -> PollError {
    #[derive(Deserialize, Default)]
    struct ErrorBody {
        #[serde(default)]
        message: String,
        #[serde(default)]
        errors: Vec<UpstreamErrorDetail>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let body_json: serde_json::Value =
        serde_json::from_str(body).unwrap_or_else(|_| serde_json::json!({ "raw": body }));

    if !(400..500).contains(&status) {
        return PollError::Upstream(format!("HTTP {status}: {body}"));
    }

    let has_invalid_access_token = parsed
        .errors
        .iter()
        .any(|e| e.field == "access_token" && e.code == "invalid");

    if has_invalid_access_token {
        let names_athlete = parsed.errors.iter().any(|e| e.resource == "Athlete");
        let message = if parsed.message.is_empty() {
            format!("HTTP {status}")
        } else {
            parsed.message
        };
        return if names_athlete {
            PollError::InvalidAthleteAccessToken {
                message,
                body: body_json,
                headers,
            }
        } else {
            PollError::InvalidAccessToken {
                message,
                body: body_json,
                headers,
            }
        };
    }

    PollError::BadRequest {
        status,
        message: if parsed.message.is_empty() {
            format!("HTTP {status}")
        } else {
            parsed.message
        },
        errors: parsed.errors,
    }
}

/// Minimal percent-encoding for the handful of characters OAuth redirect
/// parameters need escaped, avoiding a dedicated URL-encoding dependency
/// for a single call site.
fn urlencoding_lite(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
