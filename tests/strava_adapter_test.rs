// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Exercises [`StravaAdapter`] against a local mock HTTP server, covering
//! the parts of the adapter contract (C1) that only show up on the wire:
//! bearer auth, query-string shape, and timeout classification.

use httpmock::prelude::*;
use std::time::Duration;
use strava_poller::error::PollError;
use strava_poller::services::strava::{ListActivitiesParams, StravaAdapter, UpstreamAdapter};

fn adapter(base_url: &str) -> StravaAdapter {
    StravaAdapter::new(
        base_url,
        "client-id",
        "client-secret",
        Duration::from_secs(1),
        Duration::from_secs(1),
    )
}

#[tokio::test]
async fn list_activities_sends_bearer_auth_and_paging_params() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/athlete/activities")
            .header("authorization", "Bearer test-token")
            .query_param("page", "2")
            .query_param("per_page", "20");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(serde_json::json!([
                {
                    "id": 42,
                    "resource_state": 2,
                    "type": "Run",
                    "name": "Morning Run",
                    "start_date": "2017-07-01T00:00:00Z",
                    "start_date_local": "2017-07-01T00:00:00Z",
                    "total_photo_count": 0
                }
            ]));
    });

    let client = adapter(&server.base_url());
    let activities = client
        .list_activities(
            "test-token",
            ListActivitiesParams {
                page: Some(2),
                per_page: Some(20),
                ..Default::default()
            },
        )
        .await
        .expect("list_activities succeeds");

    mock.assert();
    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0].id, 42);
    assert_eq!(activities[0].name, "Morning Run");
}

#[tokio::test]
async fn invalid_access_token_body_is_classified() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/athlete/activities");
        then.status(401)
            .header("content-type", "application/json")
            .header("cache-control", "no-cache")
            .json_body(serde_json::json!({
                "message": "Authorization Error",
                "errors": [{"resource": "Athlete", "field": "access_token", "code": "invalid"}]
            }));
    });

    let client = adapter(&server.base_url());
    let err = client
        .list_activities("bad-token", ListActivitiesParams::default())
        .await
        .expect_err("expected a classified auth error");

    assert!(matches!(err, PollError::InvalidAthleteAccessToken { .. }));
}

#[tokio::test]
async fn server_error_is_classified_as_upstream() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/athlete/activities");
        then.status(503).body("service unavailable");
    });

    let client = adapter(&server.base_url());
    let err = client
        .list_activities("tok", ListActivitiesParams::default())
        .await
        .expect_err("expected an upstream error");

    assert!(matches!(err, PollError::Upstream(_)));
}

#[tokio::test]
async fn slow_response_past_the_configured_timeout_is_a_timeout_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/athlete/activities");
        then.status(200).delay(Duration::from_secs(2)).json_body(
            serde_json::json!([]),
        );
    });

    let client = adapter(&server.base_url());
    let err = client
        .list_activities("tok", ListActivitiesParams::default())
        .await
        .expect_err("expected a timeout");

    assert!(matches!(err, PollError::Timeout(_)));
}

#[tokio::test]
async fn activity_photos_requests_requested_size_and_photo_sources() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/activities/42/photos")
            .query_param("size", "1024")
            .query_param("photo_sources", "true");
        then.status(200).json_body(serde_json::json!([
            {
                "unique_id": "abc",
                "caption": "summit",
                "urls": {"1024": "https://example.com/p.jpg"},
                "sizes": {"1024": [1024, 768]}
            }
        ]));
    });

    let client = adapter(&server.base_url());
    let photos = client
        .activity_photos("tok", 42, 1024)
        .await
        .expect("activity_photos succeeds");

    mock.assert();
    assert_eq!(photos.len(), 1);
    assert_eq!(photos[0].caption.as_deref(), Some("summit"));
}
