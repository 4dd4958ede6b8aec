//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. You register a path, you
//! get a handler. Instrumented routes go in through the same door.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use matchit::Router as MatchitRouter;

use crate::handler::{BoxedHandler, Handler};
use crate::middleware::MetricsHandler;

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Every registration returns `self` so calls chain naturally.
///
/// # Panics
///
/// Registration panics on an invalid or duplicate route: a broken routing
/// table is a startup bug, not a runtime condition.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax and are read with `req.param("name")`:
    ///
    /// ```rust
    /// # use routemeter::{Request, ResponseWriter, Router};
    /// # fn get_user(_: &mut dyn ResponseWriter, _: &Request) {}
    /// # fn create_user(_: &mut dyn ResponseWriter, _: &Request) {}
    /// Router::new()
    ///     .on(http::Method::GET,  "/users/{id}", get_user)
    ///     .on(http::Method::POST, "/users",      create_user);
    /// ```
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.add(method, path, Arc::new(handler))
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    /// Mounts an instrumented handler at its own path, once per method.
    ///
    /// Method names are matched case-insensitively, so a handler built with
    /// `["get"]` serves `GET`. The router shares the handler; keep your own
    /// `Arc` to call [`MetricsHandler::cleanup`] later.
    pub fn instrument(mut self, handler: Arc<MetricsHandler>) -> Self {
        let path = handler.path().to_owned();
        for name in handler.methods() {
            let method = Method::from_bytes(name.to_ascii_uppercase().as_bytes())
                .unwrap_or_else(|e| panic!("invalid method `{name}` for `{path}`: {e}"));
            self = self.add(method, &path, handler.clone());
        }
        self
    }

    fn add(mut self, method: Method, path: &str, handler: BoxedHandler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}
