// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the polling core.

pub mod activity;
pub mod poll_state;
pub mod user;

pub use activity::{Activity, ActivityPhotos, PhotoEntry};
pub use poll_state::{PollState, PollStateUpdate};
pub use user::{Token, User};
