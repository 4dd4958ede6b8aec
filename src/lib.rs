//! # routemeter
//!
//! A minimal HTTP framework whose routes can count themselves.
//!
//! Wrap any handler in a [`MetricsHandler`](middleware::MetricsHandler) and
//! the route gets three Prometheus instruments, with no change to the
//! handler's code:
//!
//! - `<path>_<methods>_total_requests`: every request served
//! - `<path>_<methods>_total_errors`: requests that failed (non-2xx status,
//!   no status at all, or a body write that did not reach the client)
//! - `<path>_<methods>_response_time_ms`: summary of handler durations
//!
//! Success or failure is decided from the outside: the handler writes to a
//! decorating [`CaptureWriter`](middleware::CaptureWriter) that forwards every
//! call to the real response and remembers what went through.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use routemeter::middleware::MetricsHandler;
//! use routemeter::{metrics, Request, ResponseWriter, Router, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> routemeter::Result<()> {
//!     let registry = prometheus::default_registry().clone();
//!     let hello = Arc::new(MetricsHandler::new(&registry, "/test", &["GET"], hello)?);
//!
//!     let app = Router::new()
//!         .instrument(Arc::clone(&hello))
//!         .get("/metrics", metrics::exporter(registry));
//!
//!     Server::bind("0.0.0.0:8081").serve(app).await?;
//!     hello.cleanup()
//! }
//!
//! fn hello(w: &mut dyn ResponseWriter, _req: &Request) {
//!     w.write_head(StatusCode::OK);
//!     let _ = w.write(b"Hello, world!");
//! }
//! ```

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod health;
pub mod metrics;
pub mod middleware;

pub use error::{Error, Result};
pub use handler::{BoxedHandler, Handler};
pub use http::{HeaderMap, Method, StatusCode};
pub use request::Request;
pub use response::{Response, ResponseWriter};
pub use router::Router;
pub use server::Server;
