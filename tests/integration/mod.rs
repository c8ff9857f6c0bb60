//! Integration tests for tokio_shedder
//!
//! These tests drive the public API only. Time-dependent scenarios use a
//! `ManualClock` and a `FixedCpu`, so no real load is needed.
//!
//! Run with: cargo test --test integration

mod helpers;

mod group;
mod middleware;
mod overload;
mod stress;
mod window;
