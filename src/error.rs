//! Unified error type.

/// Result alias used by routemeter's fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by routemeter's fallible operations.
///
/// Application-level failures (a handler answering 400, a broken client
/// connection mid-body) are never surfaced as `Error`s: they are folded into
/// the route's metrics. This type covers infrastructure failures and the
/// construction / cleanup of instrumented handlers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Binding to a port or accepting a connection failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// A derived metric name is already held by the registry, usually because
    /// a handler for the same path and methods was never cleaned up. Also
    /// raised when the registry still remembers the name with other help text.
    #[error("metric `{name}` is already registered")]
    RegistrationConflict { name: String },

    /// Unregistering a metric failed because the registry no longer holds it.
    #[error("failed to unregister metric `{name}`: {source}")]
    UnregisterFailure {
        name: String,
        #[source]
        source: prometheus::Error,
    },

    /// Prometheus rejected the metric definition (e.g. a path segment with
    /// characters that are not valid in a metric name).
    #[error("invalid metric `{name}`: {source}")]
    InvalidMetric {
        name: String,
        #[source]
        source: prometheus::Error,
    },
}

const KNOWN_NAME_MISMATCH: &str = "a previously registered descriptor with the same fully-qualified name";

impl Error {
    /// Maps a registry error for `name` raised during registration.
    pub(crate) fn registration(name: &str, source: prometheus::Error) -> Self {
        match source {
            prometheus::Error::AlreadyReg => Self::RegistrationConflict { name: name.to_owned() },
            // The registry keeps each name's help text and labels after unregister.
            prometheus::Error::Msg(ref msg) if msg.starts_with(KNOWN_NAME_MISMATCH) => {
                Self::RegistrationConflict { name: name.to_owned() }
            }
            source => Self::InvalidMetric { name: name.to_owned(), source },
        }
    }
}
