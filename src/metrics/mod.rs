//! Metric instruments and the scrape endpoint.
//!
//! Counters come straight from `prometheus`; the response-time distribution
//! uses this module's [`Summary`]. Everything is registered against an
//! explicit [`prometheus::Registry`]. Pass `prometheus::default_registry()`
//! for the process-wide one, or a fresh `Registry::new()` per test.
//!
//! ```rust,no_run
//! use routemeter::{metrics, Router};
//!
//! let registry = prometheus::default_registry().clone();
//! let app = Router::new().get("/metrics", metrics::exporter(registry));
//! ```

mod summary;

pub use summary::{DEFAULT_MAX_SAMPLES, DEFAULT_QUANTILES, Summary, SummaryOpts};

use http::header::{CONTENT_TYPE, HeaderValue};
use http::StatusCode;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::error;

use crate::request::Request;
use crate::response::ResponseWriter;

/// Returns a handler that renders every metric in `registry` in the
/// Prometheus text exposition format.
pub fn exporter(
    registry: Registry,
) -> impl Fn(&mut dyn ResponseWriter, &Request) + Send + Sync + 'static {
    move |w: &mut dyn ResponseWriter, _req: &Request| {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
            error!("failed to encode metrics: {e}");
            w.write_head(StatusCode::INTERNAL_SERVER_ERROR);
            return;
        }
        if let Ok(content_type) = HeaderValue::from_str(encoder.format_type()) {
            w.headers_mut().insert(CONTENT_TYPE, content_type);
        }
        w.write_head(StatusCode::OK);
        if let Err(e) = w.write(&buffer) {
            error!("failed to write metrics: {e}");
        }
    }
}
