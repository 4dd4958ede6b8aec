//! The response-writing capability and its buffered implementation.
//!
//! Handlers do not return a response; they write one. Everything a handler
//! can do to the client goes through [`ResponseWriter`]: touch the headers,
//! send a status line, write body bytes. That narrow surface is what lets the
//! metrics middleware slip a decorator between a handler and the real sink
//! without the handler noticing.

use std::io;

use bytes::{Bytes, BytesMut};
use http::header::HeaderMap;
use http::StatusCode;
use http_body_util::Full;
use tracing::warn;

// ── ResponseWriter ────────────────────────────────────────────────────────────

/// Destination for one HTTP response.
///
/// Object safe on purpose: handlers receive `&mut dyn ResponseWriter`, so the
/// server's buffered [`Response`], a test double, or a decorating proxy can
/// all be handed to the same handler.
///
/// ```rust
/// use routemeter::{Request, ResponseWriter};
/// use http::StatusCode;
///
/// fn hello(w: &mut dyn ResponseWriter, _req: &Request) {
///     w.write_head(StatusCode::OK);
///     let _ = w.write(b"Hello, world!");
/// }
/// ```
pub trait ResponseWriter {
    /// Header map that will be sent with the status line.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Sends the status line. Only the first call has an effect on the wire.
    fn write_head(&mut self, status: StatusCode);

    /// Writes body bytes. Implies `200 OK` if no status was sent yet.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

// ── Response ─────────────────────────────────────────────────────────────────

/// Buffered response: the real sink the server hands to every handler.
///
/// Follows the usual HTTP server rules: the first status wins, writing a body
/// before a status sends `200 OK`, and a response finished without any status
/// goes out as `200 OK`. Also useful in tests as a response recorder.
///
/// ```rust
/// use routemeter::{Response, ResponseWriter};
/// use http::StatusCode;
///
/// let mut res = Response::new();
/// res.write(b"hi").unwrap();
/// assert_eq!(res.status(), StatusCode::OK);
/// assert_eq!(res.body(), b"hi");
/// ```
#[derive(Debug, Default)]
pub struct Response {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Response with no body.
    pub fn with_status(code: StatusCode) -> Self {
        Self { status: Some(code), ..Self::default() }
    }

    /// Status that was (or will be) sent. Unset means `200 OK`.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// Whether a status line has been sent, explicitly or implicitly.
    pub fn status_written(&self) -> bool {
        self.status.is_some()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let status = self.status();
        let mut res = http::Response::new(Full::new(self.body.freeze()));
        *res.status_mut() = status;
        *res.headers_mut() = self.headers;
        res
    }
}

impl ResponseWriter for Response {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_head(&mut self, status: StatusCode) {
        if let Some(sent) = self.status {
            if sent != status {
                warn!(%sent, ignored = %status, "superfluous write_head call");
            }
            return;
        }
        self.status = Some(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.write_head(StatusCode::OK);
        }
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }
}
