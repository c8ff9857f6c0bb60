//! Load shedding middleware.
//!
//! Rejects requests with 503 Service Unavailable while the shedder reports
//! overload, and feeds handler outcomes back into it.

use std::future::Future;
use std::sync::Arc;

use http::{header, Request, Response, StatusCode};
use tracing::warn;

use crate::config::ShedderConfig;
use crate::context::ShedderContext;
use crate::error::Result;
use crate::shedder::{Promise, Shedder, ShedderStat};

/// Load shedding middleware.
///
/// A handler response of 503 resolves the promise as failed. Every other
/// status counts as a pass, including other 5xx codes: they still consumed
/// capacity and their latency is informative.
pub struct SheddingMiddleware {
    shedder: Arc<dyn Shedder>,
    stat: Arc<ShedderStat>,
}

impl SheddingMiddleware {
    /// Create a new shedding middleware.
    pub fn new(shedder: Arc<dyn Shedder>, stat: Arc<ShedderStat>) -> Self {
        Self { shedder, stat }
    }

    /// Create from shedder configuration.
    ///
    /// `priority` selects the raised threshold of
    /// [`ShedderConfig::priority_options`]. When called inside a tokio
    /// runtime, periodic stat reporting starts at `config.stat_interval`.
    pub fn from_config(
        name: &str,
        ctx: Arc<ShedderContext>,
        config: &ShedderConfig,
        priority: bool,
    ) -> Result<Self> {
        let options = if priority {
            config.priority_options()
        } else {
            config.options()
        };
        let shedder = ctx.new_shedder(options)?;
        let stat = Arc::new(ShedderStat::new(name, ctx));

        if tokio::runtime::Handle::try_current().is_ok() {
            // Detached; the task exits once the stat is dropped.
            let _ = stat.start(config.stat_interval);
        }

        Ok(Self::new(shedder, stat))
    }

    pub fn shedder(&self) -> &Arc<dyn Shedder> {
        &self.shedder
    }

    pub fn stat(&self) -> &Arc<ShedderStat> {
        &self.stat
    }

    /// Run `next` unless the request is shed.
    pub fn handle<B, R, F>(&self, req: Request<B>, next: F) -> Response<R>
    where
        R: Default,
        F: FnOnce(Request<B>) -> Response<R>,
    {
        let promise = match self.admit(&req) {
            Some(promise) => promise,
            None => return unavailable(),
        };

        let res = next(req);
        self.resolve(promise, res.status());
        res
    }

    /// Async variant of [`handle`](Self::handle).
    ///
    /// If the returned future is dropped before the handler completes, the
    /// promise is released as failed.
    pub async fn handle_async<B, R, F, Fut>(&self, req: Request<B>, next: F) -> Response<R>
    where
        R: Default,
        F: FnOnce(Request<B>) -> Fut,
        Fut: Future<Output = Response<R>>,
    {
        let promise = match self.admit(&req) {
            Some(promise) => promise,
            None => return unavailable(),
        };

        let res = next(req).await;
        self.resolve(promise, res.status());
        res
    }

    fn admit<B>(&self, req: &Request<B>) -> Option<Promise> {
        self.stat.incr_total();

        match self.shedder.allow() {
            Ok(promise) => Some(promise),
            Err(_) => {
                self.stat.incr_drop();
                let ua = req
                    .headers()
                    .get(header::USER_AGENT)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                warn!(
                    method = %req.method(),
                    path = req.uri().path(),
                    ua,
                    "[http] dropped, {} - {} - {}",
                    req.method(),
                    req.uri().path(),
                    ua
                );
                None
            }
        }
    }

    fn resolve(&self, promise: Promise, status: StatusCode) {
        if status == StatusCode::SERVICE_UNAVAILABLE {
            promise.fail();
        } else {
            self.stat.incr_pass();
            promise.pass();
        }
    }
}

fn unavailable<R: Default>() -> Response<R> {
    let mut res = Response::new(R::default());
    *res.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
    res
}
