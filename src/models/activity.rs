// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! `Activity` and `ActivityPhotos`, upserted by the result applier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A mirrored Strava activity, keyed by the upstream id. Per-field
/// overwrite (update-from-source) is the rule, with two exceptions: a
/// missing `timezone`/`description` in the source is ignored rather than
/// nulling an existing value, and `start_lat`/`start_lng`/`end_lat`/
/// `end_lng` are always overwritten (no drift preservation).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Activity {
    pub strava_id: i64,
    pub user_id: i64,
    pub activity_type: String,
    pub name: String,
    pub description: Option<String>,
    pub external_id: Option<String>,
    pub distance: Option<f64>,
    pub moving_time: Option<i32>,
    pub elapsed_time: Option<i32>,
    pub total_elevation_gain: Option<f64>,
    pub average_temp: Option<f64>,
    pub start_date: DateTime<Utc>,
    pub start_date_local: DateTime<Utc>,
    pub utc_offset: i32,
    pub timezone: Option<String>,
    pub start_lat: Option<f64>,
    pub start_lng: Option<f64>,
    pub end_lat: Option<f64>,
    pub end_lng: Option<f64>,
    pub summary_polyline: Option<String>,
    pub total_photo_count: i32,
}

/// A single photo entry as stored in [`ActivityPhotos::data`], annotated
/// with the dimensions the fetch worker resolved for the requested size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoEntry {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub caption: Option<String>,
}

/// Raw row for `activity_photos`. `data` is the canonical JSON blob
/// (`{size -> [PhotoEntry]}`), rewritten only when it differs from what is
/// already stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActivityPhotos {
    pub activity_id: i64,
    pub user_id: i64,
    pub data: String,
}

/// Serializes a photo map the way the applier writes it: keys sorted
/// numerically (not lexicographically as strings — `256` before `1024`) so
/// two runs that produce the same photos produce byte-identical JSON,
/// making change detection a plain string comparison. `BTreeMap<u32, _>`
/// already iterates in ascending numeric key order; we write the object
/// directly from that order rather than restringifying through a
/// string-keyed map, which would re-sort `"1024"` before `"256"`.
pub fn canonical_photos_json(photos: &BTreeMap<u32, Vec<PhotoEntry>>) -> String {
    let mut out = String::from("{");
    for (i, (size, entries)) in photos.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('"');
        out.push_str(&size.to_string());
        out.push_str("\":");
        out.push_str(&serde_json::to_string(entries).expect("photo entries serialize"));
    }
    out.push('}');
    out
}
