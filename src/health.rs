//! Built-in Kubernetes health-check handlers.
//!
//! | Check | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! ```rust
//! use routemeter::{Router, health};
//!
//! let app = Router::new()
//!     .get("/healthz", health::liveness)
//!     .get("/readyz", health::readiness);
//! ```
//!
//! Health checks are usually left uninstrumented so their steady traffic does
//! not drown out the application routes.

use http::header::{CONTENT_TYPE, HeaderValue};
use http::StatusCode;

use crate::{Request, ResponseWriter};

/// Liveness check. Always `200 OK` with body `"ok"`.
pub fn liveness(w: &mut dyn ResponseWriter, _req: &Request) {
    plain(w, "ok");
}

/// Readiness check (default implementation). `200 OK` with body `"ready"`.
///
/// Replace with your own handler if the application must warm up or verify
/// its dependencies before taking traffic.
pub fn readiness(w: &mut dyn ResponseWriter, _req: &Request) {
    plain(w, "ready");
}

fn plain(w: &mut dyn ResponseWriter, body: &str) {
    w.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    w.write_head(StatusCode::OK);
    let _ = w.write(body.as_bytes());
}
