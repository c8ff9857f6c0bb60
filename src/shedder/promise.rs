//! Admission tokens.

use std::sync::Arc;
use std::time::Instant;

use super::adaptive::Core;

/// Handle for an admitted request.
///
/// Resolve it with [`pass`](Promise::pass) when the work succeeded or
/// [`fail`](Promise::fail) when it did not. Both consume the promise, so a
/// request is resolved at most once. A promise dropped without a verdict is
/// counted as a failure, which keeps the in-flight counter balanced when a
/// handler panics or returns early.
#[must_use = "a promise must be resolved with pass() or fail()"]
pub struct Promise {
    pending: Option<Pending>,
}

struct Pending {
    start: Instant,
    core: Arc<Core>,
}

impl Promise {
    pub(super) fn new(start: Instant, core: Arc<Core>) -> Self {
        Self {
            pending: Some(Pending { start, core }),
        }
    }

    /// Promise that records nothing.
    pub(super) fn noop() -> Self {
        Self { pending: None }
    }

    /// The request completed successfully.
    ///
    /// Records its latency and one pass into the shedder's windows.
    pub fn pass(mut self) {
        if let Some(p) = self.pending.take() {
            p.core.on_pass(p.start);
        }
    }

    /// The request failed.
    ///
    /// Only releases the in-flight slot: failures do not count as throughput
    /// and their latency is not recorded.
    pub fn fail(mut self) {
        if let Some(p) = self.pending.take() {
            p.core.on_fail();
        }
    }
}

impl Drop for Promise {
    fn drop(&mut self) {
        if let Some(p) = self.pending.take() {
            p.core.on_fail();
        }
    }
}

impl std::fmt::Debug for Promise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("start", &self.pending.as_ref().map(|p| p.start))
            .finish()
    }
}
