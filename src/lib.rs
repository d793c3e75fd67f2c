// Copyright 2026 Quarry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Quarry library — resilient page harvesting under adversarial
//! conditions.
//!
//! The pipeline is: URL list → [`batch::Scheduler`] → per URL
//! [`fetch::Fetcher`] (plain HTTP with browser fallback, or browser-only
//! human mode) → [`extract::extract`] → [`record::PageRecord`] → the
//! configured [`output::RecordSink`].

pub mod backoff;
pub mod batch;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod identity;
pub mod output;
pub mod record;
pub mod timing;
