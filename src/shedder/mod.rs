//! Load shedders.
//!
//! A [`Shedder`] decides per request whether to admit work. Admitted requests
//! get a [`Promise`] that must be resolved once the work is done:
//!
//! ```rust,ignore
//! use tokio_shedder::{ShedderContext, ShedderOptions};
//!
//! let ctx = ShedderContext::system();
//! let shedder = ctx.new_shedder(ShedderOptions::default())?;
//!
//! match shedder.allow() {
//!     Ok(promise) => match handle(request) {
//!         Ok(res) => { promise.pass(); Ok(res) }
//!         Err(e) => { promise.fail(); Err(e) }
//!     },
//!     Err(e) => Err(e.into()), // 503
//! }
//! ```

mod adaptive;
mod alert;
mod group;
mod nop;
mod options;
mod promise;
mod stat;

pub use adaptive::{AdaptiveShedder, COOL_OFF_DURATION, DEFAULT_MIN_RT};
pub use alert::{AlertSink, LogAlertSink, ShedAlert};
pub use group::ShedderGroup;
pub use nop::NopShedder;
pub use options::{ShedderOptions, DEFAULT_BUCKETS, DEFAULT_CPU_THRESHOLD, DEFAULT_WINDOW};
pub use promise::Promise;
pub use stat::{ShedderStat, StatSnapshot, STAT_INTERVAL};

use crate::error::Result;

/// Admission decision for one request.
///
/// Implementations must be cheap and never block: `allow` runs on every
/// request path.
pub trait Shedder: Send + Sync {
    /// Admit the request, or fail with
    /// [`Error::ServiceOverloaded`](crate::Error::ServiceOverloaded).
    fn allow(&self) -> Result<Promise>;

    /// Whether this shedder admits everything unconditionally.
    fn is_noop(&self) -> bool {
        false
    }
}
