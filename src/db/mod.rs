// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer (Postgres via `sqlx`).

pub mod store;

pub use store::{ActivityInfo, Store};
