//! Middleware layer.
//!
//! Middleware sits between the router and a route's handler and is the place
//! for cross-cutting concerns. The one shipped here is per-route metrics:
//!
//! - [`MetricsHandler`] wraps a handler and keeps request count, error count
//!   and response time for its route in a Prometheus registry.
//! - [`CaptureWriter`] is the response decorator it uses to see what the
//!   handler actually sent, without changing a byte of it.

mod capture;
mod metrics;

pub use capture::CaptureWriter;
pub use metrics::{MetricsConfig, MetricsHandler};
