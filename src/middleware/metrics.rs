//! Per-route request metrics.
//!
//! A [`MetricsHandler`] wraps one route's handler and keeps three instruments
//! for it in a Prometheus registry:
//!
//! | Metric | Kind | Meaning |
//! |---|---|---|
//! | `<path>_<methods>_total_requests` | counter | every completed request |
//! | `<path>_<methods>_total_errors` | counter | requests classified as failed |
//! | `<path>_<methods>_response_time_ms` | summary | handler duration in ms |
//!
//! `<path>` is the route path split on `/`, lower-cased and joined with `_`;
//! `<methods>` is the sorted method list lower-cased and joined with `_`. So
//! `("/Test/Error", ["POST", "GET"])` yields `test_error_get_post_total_requests`.
//! These names are what dashboards and alerts query, so they never change
//! for a given path and method set.
//!
//! A request is failed when a body write to the client failed, or when the
//! handler finished with a status outside `200..300`. A handler that never
//! sends a status or body counts as failed.
//!
//! ```rust
//! use routemeter::middleware::MetricsHandler;
//! use routemeter::{Request, Response, ResponseWriter, StatusCode};
//!
//! let registry = prometheus::Registry::new();
//! let handler = MetricsHandler::new(&registry, "/test", &["GET"], |w: &mut dyn ResponseWriter, _req: &Request| {
//!     w.write_head(StatusCode::OK);
//!     let _ = w.write(b"Hello, world!");
//! })?;
//!
//! let req: Request = http::Request::get("/test").body(bytes::Bytes::new()).unwrap().into();
//! handler.handle(&mut Response::new(), &req);
//!
//! assert_eq!(handler.total_requests().get(), 1);
//! assert_eq!(handler.total_errors().get(), 0);
//! handler.cleanup()?;
//! # Ok::<(), routemeter::Error>(())
//! ```

use std::sync::Arc;
use std::time::Instant;

use prometheus::core::Collector;
use prometheus::{IntCounter, Registry};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::handler::{BoxedHandler, Handler};
use crate::metrics::{Summary, SummaryOpts, DEFAULT_MAX_SAMPLES, DEFAULT_QUANTILES};
use crate::request::Request;
use crate::response::ResponseWriter;

use super::capture::CaptureWriter;

// ── Configuration ─────────────────────────────────────────────────────────────

/// Tuning for the response-time summary.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Quantiles exported for the response time, each in `[0, 1]`.
    pub quantiles: Vec<f64>,
    /// Number of most recent durations the quantiles are computed over.
    pub max_samples: usize,
}

impl MetricsConfig {
    pub fn quantiles(mut self, quantiles: &[f64]) -> Self {
        self.quantiles = quantiles.to_vec();
        self
    }

    pub fn max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
        self
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            quantiles: DEFAULT_QUANTILES.to_vec(),
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }
}

// ── MetricsHandler ────────────────────────────────────────────────────────────

/// A route handler that records request count, error count and response time.
///
/// Build it once at startup, mount it with
/// [`Router::instrument`](crate::Router::instrument), and call
/// [`cleanup`](MetricsHandler::cleanup) exactly once before dropping it:
/// the registry otherwise keeps the three instruments for the life of the
/// process.
pub struct MetricsHandler {
    path: String,
    methods: Vec<String>,
    handler: BoxedHandler,
    registry: Registry,
    instruments: Instruments,
}

impl MetricsHandler {
    /// Wraps `handler` for `path` + `methods` and registers its instruments in
    /// `registry` with the default [`MetricsConfig`].
    ///
    /// Fails with [`Error::RegistrationConflict`] if any derived name is
    /// already registered, e.g. by an earlier handler for the same path and
    /// method set (order and case of `methods` do not matter). The registry
    /// remembers a name's help text even after [`cleanup`](Self::cleanup), so
    /// re-using a name with a different path spelling (`/Test` after `/test`)
    /// is a conflict too.
    pub fn new<F>(registry: &Registry, path: &str, methods: &[&str], handler: F) -> Result<Self>
    where
        F: Fn(&mut dyn ResponseWriter, &Request) + Send + Sync + 'static,
    {
        Self::with_config(registry, path, methods, MetricsConfig::default(), handler)
    }

    pub fn with_config<F>(
        registry: &Registry,
        path: &str,
        methods: &[&str],
        config: MetricsConfig,
        handler: F,
    ) -> Result<Self>
    where
        F: Fn(&mut dyn ResponseWriter, &Request) + Send + Sync + 'static,
    {
        let mut methods: Vec<String> = methods.iter().map(|m| m.to_ascii_uppercase()).collect();
        methods.sort();

        let prefix = metric_prefix(path, &methods);
        let about = format!("{path} {}", methods.join(", "));

        let total_requests = counter(
            format!("{prefix}_total_requests"),
            format!("{about} total number of requests"),
        )?;
        let total_errors = counter(
            format!("{prefix}_total_errors"),
            format!("{about} total number of errors"),
        )?;
        let name = format!("{prefix}_response_time_ms");
        let response_time = Summary::with_opts(
            SummaryOpts::new(name.clone(), format!("{about} response time in ms"))
                .quantiles(&config.quantiles)
                .max_samples(config.max_samples),
        )
        .map_err(|source| Error::InvalidMetric { name, source })?;

        let instruments = Instruments { total_requests, total_errors, response_time };
        instruments.register(registry)?;

        info!(%path, methods = %methods.join(","), metrics = %prefix, "instrumented route");

        Ok(Self {
            path: path.to_owned(),
            methods,
            handler: Arc::new(handler),
            registry: registry.clone(),
            instruments,
        })
    }

    /// Runs the wrapped handler against `w` and records the outcome.
    ///
    /// Never fails: whatever goes wrong inside the handler ends up in the
    /// metrics, not in the caller. The duration is recorded even if the
    /// handler panics; the counters are only updated on a normal return.
    pub fn handle(&self, w: &mut dyn ResponseWriter, req: &Request) {
        let _timer = ObserveOnDrop { summary: &self.instruments.response_time, start: Instant::now() };

        let mut proxy = CaptureWriter::new(w);
        self.handler.call(&mut proxy, req);

        if proxy.is_error() {
            debug!(
                path = %self.path,
                status = ?proxy.status().map(|s| s.as_u16()),
                write_failed = proxy.error().is_some(),
                "request classified as error"
            );
            self.instruments.total_errors.inc();
        }
        self.instruments.total_requests.inc();
    }

    /// Unregisters the three instruments.
    ///
    /// Call exactly once. A second call fails with
    /// [`Error::UnregisterFailure`] because the instruments are already gone.
    /// Every instrument is attempted; the first failure is returned.
    pub fn cleanup(&self) -> Result<()> {
        let results: Vec<Result<()>> = self
            .instruments
            .collectors()
            .into_iter()
            .map(|collector| unregister(&self.registry, collector))
            .collect();
        results.into_iter().collect::<Result<Vec<()>>>()?;
        info!(path = %self.path, "removed route metrics");
        Ok(())
    }

    /// Route path exactly as given at construction.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Methods in sorted order, as given at construction.
    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    pub fn total_requests(&self) -> &IntCounter {
        &self.instruments.total_requests
    }

    pub fn total_errors(&self) -> &IntCounter {
        &self.instruments.total_errors
    }

    pub fn response_time(&self) -> &Summary {
        &self.instruments.response_time
    }
}

impl Handler for MetricsHandler {
    fn call(&self, w: &mut dyn ResponseWriter, req: &Request) {
        self.handle(w, req)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// The three instruments owned by one route.
struct Instruments {
    total_requests: IntCounter,
    total_errors: IntCounter,
    response_time: Summary,
}

impl Instruments {
    /// Fresh handles sharing state with the originals, in registration order.
    fn collectors(&self) -> [Box<dyn Collector>; 3] {
        [
            Box::new(self.total_requests.clone()),
            Box::new(self.total_errors.clone()),
            Box::new(self.response_time.clone()),
        ]
    }

    /// Registers all three or none: on failure, the ones already registered
    /// are taken out again.
    fn register(&self, registry: &Registry) -> Result<()> {
        for (i, collector) in self.collectors().into_iter().enumerate() {
            let name = collector_name(collector.as_ref());
            if let Err(e) = registry.register(collector) {
                for done in self.collectors().into_iter().take(i) {
                    let _ = registry.unregister(done);
                }
                return Err(Error::registration(&name, e));
            }
        }
        Ok(())
    }
}

/// Records the elapsed time into the summary when dropped, unwinding included.
struct ObserveOnDrop<'a> {
    summary: &'a Summary,
    start: Instant,
}

impl Drop for ObserveOnDrop<'_> {
    fn drop(&mut self) {
        self.summary.observe(self.start.elapsed().as_secs_f64() * 1000.0);
    }
}

/// Flattened `<path>_<methods>` prefix. `methods` must already be sorted.
fn metric_prefix(path: &str, methods: &[String]) -> String {
    let path = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_");
    let methods = methods.join("_").to_lowercase();
    format!("{path}_{methods}")
}

fn counter(name: String, help: String) -> Result<IntCounter> {
    IntCounter::new(name.clone(), help).map_err(|source| Error::InvalidMetric { name, source })
}

fn unregister(registry: &Registry, collector: Box<dyn Collector>) -> Result<()> {
    let name = collector_name(collector.as_ref());
    registry
        .unregister(collector)
        .map_err(|source| Error::UnregisterFailure { name, source })
}

fn collector_name(collector: &dyn Collector) -> String {
    collector.desc().first().map(|d| d.fq_name.clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::panic::{self, AssertUnwindSafe};

    use bytes::Bytes;
    use http::{HeaderMap, StatusCode};

    use super::*;
    use crate::response::Response;

    fn get(path: &str) -> Request {
        http::Request::get(path).body(Bytes::new()).unwrap().into()
    }

    fn respond_with(status: u16) -> impl Fn(&mut dyn ResponseWriter, &Request) + Send + Sync + 'static {
        move |w: &mut dyn ResponseWriter, _req: &Request| {
            w.write_head(StatusCode::from_u16(status).unwrap());
        }
    }

    fn noop(_w: &mut dyn ResponseWriter, _req: &Request) {}

    struct BrokenPipe(HeaderMap);

    impl ResponseWriter for BrokenPipe {
        fn headers_mut(&mut self) -> &mut HeaderMap {
            &mut self.0
        }

        fn write_head(&mut self, _status: StatusCode) {}

        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
    }

    #[test]
    fn successful_request() {
        let registry = Registry::new();
        let h = MetricsHandler::new(&registry, "/test", &["GET"], |w: &mut dyn ResponseWriter, _req: &Request| {
            w.write_head(StatusCode::OK);
            let _ = w.write(b"Hello, world!");
        })
        .unwrap();

        let mut res = Response::new();
        h.handle(&mut res, &get("/test"));

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body(), b"Hello, world!");
        assert_eq!(h.total_requests().get(), 1);
        assert_eq!(h.total_errors().get(), 0);
        assert_eq!(h.response_time().sample_count(), 1);
        h.cleanup().unwrap();
    }

    #[test]
    fn error_status_is_counted() {
        let registry = Registry::new();
        let h = MetricsHandler::new(&registry, "/test/error", &["GET"], respond_with(400)).unwrap();

        let mut res = Response::new();
        h.handle(&mut res, &get("/test/error"));

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.total_requests().get(), 1);
        assert_eq!(h.total_errors().get(), 1);
    }

    #[test]
    fn status_counted_is_the_one_the_client_got() {
        let registry = Registry::new();
        let h = MetricsHandler::new(&registry, "/flip", &["GET"], |w: &mut dyn ResponseWriter, _: &Request| {
            w.write_head(StatusCode::BAD_REQUEST);
            w.write_head(StatusCode::OK);
        })
        .unwrap();

        let mut res = Response::new();
        h.handle(&mut res, &get("/flip"));

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.total_requests().get(), 1);
        assert_eq!(h.total_errors().get(), 1);
    }

    #[test]
    fn classification_follows_status_class() {
        let registry = Registry::new();
        for (i, code) in [100, 102, 200, 204, 299, 301, 404, 503].into_iter().enumerate() {
            let path = format!("/status/s{i}");
            let h = MetricsHandler::new(&registry, &path, &["GET"], respond_with(code)).unwrap();
            h.handle(&mut Response::new(), &get(&path));

            let expected_errors = if (200..300).contains(&code) { 0 } else { 1 };
            assert_eq!(h.total_requests().get(), 1, "status {code}");
            assert_eq!(h.total_errors().get(), expected_errors, "status {code}");
            h.cleanup().unwrap();
        }
    }

    #[test]
    fn body_without_status_counts_as_success() {
        let registry = Registry::new();
        let h = MetricsHandler::new(&registry, "/path", &["GET"], |w: &mut dyn ResponseWriter, _req: &Request| {
            let _ = w.write(b"Hello, world!");
        })
        .unwrap();

        let mut res = Response::new();
        h.handle(&mut res, &get("/path"));

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body(), b"Hello, world!");
        assert_eq!(h.total_errors().get(), 0);
    }

    #[test]
    fn silent_handler_counts_as_error() {
        let registry = Registry::new();
        let h = MetricsHandler::new(&registry, "/path", &["GET"], noop).unwrap();
        h.handle(&mut Response::new(), &get("/path"));

        assert_eq!(h.total_requests().get(), 1);
        assert_eq!(h.total_errors().get(), 1);
    }

    #[test]
    fn write_failure_counts_as_error_despite_ok_status() {
        let registry = Registry::new();
        let h = MetricsHandler::new(&registry, "/path", &["GET"], |w: &mut dyn ResponseWriter, _req: &Request| {
            w.write_head(StatusCode::OK);
            let _ = w.write(b"Hello, world!");
        })
        .unwrap();

        h.handle(&mut BrokenPipe(HeaderMap::new()), &get("/path"));

        assert_eq!(h.total_requests().get(), 1);
        assert_eq!(h.total_errors().get(), 1);
    }

    #[test]
    fn one_duration_sample_per_request() {
        let registry = Registry::new();
        let h = MetricsHandler::new(&registry, "/path", &["GET"], respond_with(200)).unwrap();
        for _ in 0..5 {
            h.handle(&mut Response::new(), &get("/path"));
        }

        assert_eq!(h.response_time().sample_count(), 5);
        assert!(h.response_time().sample_sum() >= 0.0);
    }

    #[test]
    fn panicking_handler_still_records_duration() {
        let registry = Registry::new();
        let h = MetricsHandler::new(&registry, "/panic", &["GET"], |_w: &mut dyn ResponseWriter, _req: &Request| {
            panic!("handler blew up");
        })
        .unwrap();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            h.handle(&mut Response::new(), &get("/panic"));
        }));

        assert!(outcome.is_err());
        assert_eq!(h.response_time().sample_count(), 1);
        assert_eq!(h.total_requests().get(), 0);
        assert_eq!(h.total_errors().get(), 0);
    }

    #[test]
    fn concurrent_requests_are_all_counted() {
        let registry = Registry::new();
        let h = MetricsHandler::new(&registry, "/busy", &["GET"], respond_with(500)).unwrap();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..250 {
                        h.handle(&mut Response::new(), &get("/busy"));
                    }
                });
            }
        });

        assert_eq!(h.total_requests().get(), 1000);
        assert_eq!(h.total_errors().get(), 1000);
        assert_eq!(h.response_time().sample_count(), 1000);
    }

    #[test]
    fn different_methods_on_same_path_coexist() {
        let registry = Registry::new();
        let h1 = MetricsHandler::new(&registry, "/path", &["GET"], noop).unwrap();
        let h2 = MetricsHandler::new(&registry, "/path", &["POST"], noop).unwrap();
        h1.cleanup().unwrap();
        h2.cleanup().unwrap();
    }

    #[test]
    fn same_route_twice_conflicts() {
        let registry = Registry::new();
        let _first = MetricsHandler::new(&registry, "/path", &["GET"], noop).unwrap();
        let err = MetricsHandler::new(&registry, "/path", &["GET"], noop).err().unwrap();

        assert!(matches!(err, Error::RegistrationConflict { ref name } if name == "path_get_total_requests"));
    }

    #[test]
    fn method_order_and_case_do_not_matter_for_conflicts() {
        let registry = Registry::new();
        let first = MetricsHandler::new(&registry, "/test", &["POST", "GET"], noop).unwrap();
        assert_eq!(first.methods(), ["GET", "POST"]);

        let err = MetricsHandler::new(&registry, "/test", &["get", "post"], noop).err().unwrap();
        assert!(matches!(err, Error::RegistrationConflict { .. }));
    }

    #[test]
    fn cleanup_releases_names() {
        let registry = Registry::new();
        let h = MetricsHandler::new(&registry, "/path", &["GET", "POST"], noop).unwrap();
        h.cleanup().unwrap();

        registry.register(Box::new(h.total_errors().clone())).unwrap();
        registry.register(Box::new(h.total_requests().clone())).unwrap();
        registry.register(Box::new(h.response_time().clone())).unwrap();
    }

    #[test]
    fn route_can_be_rebuilt_after_cleanup() {
        let registry = Registry::new();
        MetricsHandler::new(&registry, "/path", &["GET"], noop).unwrap().cleanup().unwrap();
        let again = MetricsHandler::new(&registry, "/path", &["GET"], noop).unwrap();
        again.cleanup().unwrap();
    }

    #[test]
    fn route_can_be_rebuilt_with_other_method_spelling() {
        let registry = Registry::new();
        MetricsHandler::new(&registry, "/test", &["POST", "GET"], noop).unwrap().cleanup().unwrap();

        let again = MetricsHandler::new(&registry, "/test", &["get", "post"], noop).unwrap();
        assert_eq!(again.methods(), ["GET", "POST"]);
        again.cleanup().unwrap();
    }

    #[test]
    fn stale_help_text_is_a_conflict() {
        let registry = Registry::new();
        MetricsHandler::new(&registry, "/test", &["GET"], noop).unwrap().cleanup().unwrap();

        let err = MetricsHandler::new(&registry, "/Test", &["GET"], noop).err().unwrap();
        assert!(matches!(err, Error::RegistrationConflict { ref name } if name == "test_get_total_requests"));
    }

    #[test]
    fn second_cleanup_fails() {
        let registry = Registry::new();
        let h = MetricsHandler::new(&registry, "/path", &["GET"], noop).unwrap();
        h.cleanup().unwrap();

        let err = h.cleanup().unwrap_err();
        assert!(matches!(err, Error::UnregisterFailure { ref name, .. } if name == "path_get_total_requests"));
    }

    #[test]
    fn failed_registration_leaves_nothing_behind() {
        let registry = Registry::new();
        let blocker = IntCounter::new("path_get_total_errors", "/path GET total number of errors").unwrap();
        registry.register(Box::new(blocker.clone())).unwrap();

        let err = MetricsHandler::new(&registry, "/path", &["GET"], noop).err().unwrap();
        assert!(matches!(err, Error::RegistrationConflict { ref name } if name == "path_get_total_errors"));
        assert!(registry.gather().iter().all(|mf| mf.get_name() != "path_get_total_requests"));

        registry.unregister(Box::new(blocker)).unwrap();
        MetricsHandler::new(&registry, "/path", &["GET"], noop).unwrap();
    }

    #[test]
    fn unrepresentable_path_is_invalid_metric() {
        let registry = Registry::new();
        let err = MetricsHandler::new(&registry, "/users/{id}", &["GET"], noop).err().unwrap();
        assert!(matches!(err, Error::InvalidMetric { .. }));
    }

    #[test]
    fn custom_quantiles_are_exported() {
        let registry = Registry::new();
        let config = MetricsConfig::default().quantiles(&[0.75]).max_samples(16);
        let h = MetricsHandler::with_config(&registry, "/q", &["GET"], config, respond_with(200)).unwrap();
        h.handle(&mut Response::new(), &get("/q"));

        let families = registry.gather();
        let summary = families
            .iter()
            .find(|mf| mf.get_name() == "q_get_response_time_ms")
            .unwrap();
        let quantiles = summary.get_metric()[0].get_summary().get_quantile();
        assert_eq!(quantiles.len(), 1);
        assert_eq!(quantiles[0].get_quantile(), 0.75);
    }

    #[test]
    fn help_strings_keep_the_original_route() {
        let registry = Registry::new();
        let _h = MetricsHandler::new(&registry, "/Test/Error", &["POST", "GET"], noop).unwrap();

        let families = registry.gather();
        let requests = families
            .iter()
            .find(|mf| mf.get_name() == "test_error_get_post_total_requests")
            .unwrap();
        assert_eq!(requests.get_help(), "/Test/Error GET, POST total number of requests");
        assert!(families.iter().any(|mf| mf.get_name() == "test_error_get_post_total_errors"));
        assert!(families.iter().any(|mf| mf.get_name() == "test_error_get_post_response_time_ms"));
    }

    #[test]
    fn prefix_flattening() {
        let methods = |ms: &[&str]| ms.iter().map(|m| (*m).to_owned()).collect::<Vec<_>>();

        assert_eq!(metric_prefix("/test", &methods(&["GET"])), "test_get");
        assert_eq!(metric_prefix("/Test/Error/", &methods(&["GET", "POST"])), "test_error_get_post");
        assert_eq!(metric_prefix("//api//v1", &methods(&["PUT"])), "api_v1_put");
        assert_eq!(metric_prefix("/", &methods(&["GET"])), "_get");
    }
}
