//! Response capture proxy.
//!
//! [`CaptureWriter`] decorates the real [`ResponseWriter`] for the span of one
//! request. Every call is forwarded unchanged; on the way through, the proxy
//! remembers the status that reached the client and the first write failure,
//! so the request can be classified from the outside once the handler returns.

use std::io;

use http::{HeaderMap, StatusCode};
use tracing::{debug, warn};

use crate::response::ResponseWriter;

/// Observes one response on its way to the real sink.
pub struct CaptureWriter<'a> {
    inner: &'a mut dyn ResponseWriter,
    status: Option<StatusCode>,
    error: Option<io::Error>,
    wrote_header: bool,
}

impl<'a> CaptureWriter<'a> {
    pub fn new(inner: &'a mut dyn ResponseWriter) -> Self {
        Self { inner, status: None, error: None, wrote_header: false }
    }

    /// Status sent through this proxy, `None` if the handler never sent one.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// First failure returned by the real sink, if any.
    pub fn error(&self) -> Option<&io::Error> {
        self.error.as_ref()
    }

    /// Whether the request counts as failed: a write failed, or the status is
    /// outside `200..300`. A missing status counts as failed too.
    pub fn is_error(&self) -> bool {
        self.error.is_some() || !self.status.is_some_and(|s| s.is_success())
    }
}

impl ResponseWriter for CaptureWriter<'_> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_head(&mut self, status: StatusCode) {
        // Later calls still reach the sink, which ignores them as well.
        if self.status.is_none() {
            self.status = Some(status);
        }
        self.wrote_header = true;
        self.inner.write_head(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.inner.write(buf) {
            Ok(n) => {
                if !self.wrote_header {
                    debug!("body written before status, assuming 200 OK");
                    self.write_head(StatusCode::OK);
                }
                Ok(n)
            }
            Err(e) => {
                warn!(error = %e, "response write failed");
                if self.error.is_none() {
                    self.error = Some(io::Error::new(e.kind(), e.to_string()));
                }
                Err(e)
            }
        }
    }
}
