//! Handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! The router holds handlers of *different* types in a single
//! `HashMap<Method, Tree>`. Rust collections can only hold one concrete type,
//! so every handler sits behind the [`Handler`] trait object and the map
//! stores `Arc<dyn Handler>` uniformly.
//!
//! ```text
//! fn hello(w: &mut dyn ResponseWriter, req: &Request) { … }   ← user writes this
//!        ↓ router.get("/", hello)
//! Arc::new(hello)                                          ← BoxedHandler
//!        ↓
//! handler.call(&mut response, &req)  at request time       ← one vtable dispatch
//! ```
//!
//! Handlers are synchronous. The server runs each call on tokio's blocking
//! pool and flushes the response once it returns. [`MetricsHandler`](crate::middleware::MetricsHandler)
//! implements the same trait, which is how an instrumented route ends up in
//! the same tree as a plain function.

use std::sync::Arc;

use crate::request::Request;
use crate::response::ResponseWriter;

/// Implemented for every valid route handler.
///
/// Satisfied automatically by any function or closure with the signature:
///
/// ```text
/// fn name(w: &mut dyn ResponseWriter, req: &Request)
/// ```
pub trait Handler: Send + Sync + 'static {
    fn call(&self, w: &mut dyn ResponseWriter, req: &Request);
}

impl<F> Handler for F
where
    F: Fn(&mut dyn ResponseWriter, &Request) + Send + Sync + 'static,
{
    fn call(&self, w: &mut dyn ResponseWriter, req: &Request) {
        self(w, req)
    }
}

/// A type-erased handler shared across concurrent requests.
///
/// `Arc` gives cheap, thread-safe shared ownership (one atomic reference
/// count increment per request) without copying the handler.
pub type BoxedHandler = Arc<dyn Handler>;
