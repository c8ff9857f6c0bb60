//! Time-bucketed statistics collections.

mod rolling_window;

pub use rolling_window::{Bucket, RollingWindow};
