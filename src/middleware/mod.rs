//! HTTP middleware built on the shedders.
//!
//! The middleware wraps a handler working on [`http`] types, so it can sit
//! in front of any server stack that speaks `http::Request`/`http::Response`:
//!
//! ```rust,ignore
//! use tokio_shedder::middleware::SheddingMiddleware;
//!
//! let shedding = SheddingMiddleware::from_config("api", ctx, &config.shedder, false)?;
//!
//! let res = shedding
//!     .handle_async(req, |req| async move { router.call(req).await })
//!     .await;
//! ```
//!
//! # Lifecycle
//!
//! ```text
//! Request → allow() ──shed──→ 503 (drop counted)
//!              │
//!              └─admitted─→ Handler → status 503 ? fail() : pass()
//! ```

mod shedding;

pub use shedding::SheddingMiddleware;
