//! Application-facing route registration.
//!
//! A [`Router`] collects routes before they are loaded into a dispatcher.
//! Patterns are compiled and duplicates rejected at registration, so a
//! mistake surfaces where the route is declared.
//!
//! ```
//! use conduit_core::Endpoint;
//! use conduit_middleware::from_fn;
//! use conduit_router::Router;
//!
//! # fn main() -> conduit_core::ConduitResult<()> {
//! let mut router = Router::with_prefix("/api");
//!
//! router
//!     .get(r"/user/{id}(\d+)", Endpoint::new(|req, res, _deps| {
//!         Box::pin(async move {
//!             res.json(&serde_json::json!({ "id": req.param("id") }))?;
//!             Ok(())
//!         })
//!     }))?
//!     .middleware(
//!         from_fn(|_req, _res, next| {
//!             Box::pin(async move {
//!                 next.advance();
//!                 Ok(())
//!             })
//!         }),
//!         250,
//!         false,
//!     );
//!
//! assert_eq!(router.len(), 1);
//! assert!(router.contains(conduit_core::HttpMethod::Get, r"/api/user/{id}(\d+)"));
//! # Ok(())
//! # }
//! ```

use crate::pattern::{normalize_path, PathMatcher};
use conduit_core::{ConduitError, ConduitResult, Endpoint, HttpMethod};
use conduit_middleware::stages::Validation;
use conduit_middleware::{Middleware, MiddlewareEntry};
use indexmap::IndexMap;

/// A route as declared on a [`Router`], before binding.
#[derive(Debug, Clone)]
pub struct RouteDefinition {
    matcher: PathMatcher,
    endpoint: Endpoint,
    validations: Vec<MiddlewareEntry>,
    middlewares: Vec<MiddlewareEntry>,
}

impl RouteDefinition {
    /// Returns the compiled pattern.
    pub const fn matcher(&self) -> &PathMatcher {
        &self.matcher
    }

    /// Returns the endpoint.
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Returns the route-layer entries: validations first, then middleware in
    /// the order they were added.
    pub fn entries(&self) -> Vec<MiddlewareEntry> {
        self.validations
            .iter()
            .chain(&self.middlewares)
            .cloned()
            .collect()
    }
}

/// Chainable handle returned when a route is registered.
#[derive(Debug)]
pub struct RouteHandle<'r> {
    definition: &'r mut RouteDefinition,
}

impl RouteHandle<'_> {
    /// Adds a route middleware.
    ///
    /// `timeout_ms` of `0` uses the dispatcher's default timeout.
    #[must_use]
    pub fn middleware<M: Middleware>(self, middleware: M, timeout_ms: u64, critical: bool) -> Self {
        self.entry(MiddlewareEntry::new(middleware).timeout_ms(timeout_ms).critical(critical))
    }

    /// Adds a prepared middleware entry.
    #[must_use]
    pub fn entry(self, entry: MiddlewareEntry) -> Self {
        self.definition.middlewares.push(entry);
        self
    }

    /// Adds a validation. Validations always run before route middleware.
    #[must_use]
    pub fn validate(self, validation: Validation) -> Self {
        self.definition.validations.push(validation.into_entry());
        self
    }
}

/// A set of routes, grouped by method, optionally under a path prefix.
#[derive(Debug, Clone, Default)]
pub struct Router {
    prefix: Option<String>,
    routes: [IndexMap<String, RouteDefinition>; 6],
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a router whose paths are joined onto `prefix`.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..Self::default()
        }
    }

    /// Returns the prefix, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Registers a `GET` route.
    pub fn get(&mut self, path: &str, endpoint: Endpoint) -> ConduitResult<RouteHandle<'_>> {
        self.add(HttpMethod::Get, path, endpoint, [])
    }

    /// Registers a `POST` route.
    pub fn post(&mut self, path: &str, endpoint: Endpoint) -> ConduitResult<RouteHandle<'_>> {
        self.add(HttpMethod::Post, path, endpoint, [])
    }

    /// Registers a `PUT` route.
    pub fn put(&mut self, path: &str, endpoint: Endpoint) -> ConduitResult<RouteHandle<'_>> {
        self.add(HttpMethod::Put, path, endpoint, [])
    }

    /// Registers a `PATCH` route.
    pub fn patch(&mut self, path: &str, endpoint: Endpoint) -> ConduitResult<RouteHandle<'_>> {
        self.add(HttpMethod::Patch, path, endpoint, [])
    }

    /// Registers a `DELETE` route.
    pub fn delete(&mut self, path: &str, endpoint: Endpoint) -> ConduitResult<RouteHandle<'_>> {
        self.add(HttpMethod::Delete, path, endpoint, [])
    }

    /// Registers an `OPTIONS` route. It takes precedence over the mirror that
    /// other methods install for the same path.
    pub fn options(&mut self, path: &str, endpoint: Endpoint) -> ConduitResult<RouteHandle<'_>> {
        self.add(HttpMethod::Options, path, endpoint, [])
    }

    /// Registers a route with validations.
    ///
    /// Fails with [`ConduitError::RoutingConflict`] if the normalized path is
    /// already registered for `method`, or [`ConduitError::PatternSyntax`] if
    /// the pattern does not compile. The router is unchanged on failure.
    pub fn add<I>(
        &mut self,
        method: HttpMethod,
        path: &str,
        endpoint: Endpoint,
        validations: I,
    ) -> ConduitResult<RouteHandle<'_>>
    where
        I: IntoIterator<Item = Validation>,
    {
        let path = normalize_path(self.prefix.as_deref(), path);
        let table = &mut self.routes[method as usize];
        if table.contains_key(&path) {
            return Err(ConduitError::routing_conflict(method.as_str(), path));
        }

        let matcher = PathMatcher::compile(&path)?;
        tracing::trace!(%method, path = %path, endpoint = %endpoint.describe(), "route declared");

        let definition = RouteDefinition {
            matcher,
            endpoint,
            validations: validations.into_iter().map(Validation::into_entry).collect(),
            middlewares: Vec::new(),
        };
        let (index, _) = table.insert_full(path, definition);
        let definition = &mut table[index];
        Ok(RouteHandle { definition })
    }

    /// Returns `true` if the normalized `path` is registered for `method`.
    pub fn contains(&self, method: HttpMethod, path: &str) -> bool {
        self.routes[method as usize].contains_key(&normalize_path(None, path))
    }

    /// Iterates over `(method, path, definition)` in method then insertion order.
    pub fn routes(&self) -> impl Iterator<Item = (HttpMethod, &str, &RouteDefinition)> {
        HttpMethod::ALL.into_iter().flat_map(move |method| {
            self.routes[method as usize]
                .iter()
                .map(move |(path, definition)| (method, path.as_str(), definition))
        })
    }

    /// Returns the number of routes across all methods.
    pub fn len(&self) -> usize {
        self.routes.iter().map(IndexMap::len).sum()
    }

    /// Returns `true` if no route is registered.
    pub fn is_empty(&self) -> bool {
        self.routes.iter().all(IndexMap::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_middleware::stages::validator_fn;

    fn endpoint() -> Endpoint {
        Endpoint::new(|_req, res, _deps| {
            Box::pin(async move {
                res.end()?;
                Ok(())
            })
        })
    }

    struct Pass(&'static str);

    impl Middleware for Pass {
        fn name(&self) -> &'static str {
            self.0
        }

        fn handle<'a>(
            &'a self,
            _req: &'a mut conduit_core::Request,
            _res: &'a mut conduit_core::Response,
            next: conduit_middleware::Next,
        ) -> conduit_core::BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async move {
                next.advance();
                Ok(())
            })
        }
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let mut router = Router::new();
        router.get("/users", endpoint()).unwrap();
        let err = router.get("/users/", endpoint()).unwrap_err();
        assert_eq!(err.to_string(), "route \"GET /users\" is duplicated");
        assert_eq!(router.len(), 1);

        router.post("/users", endpoint()).unwrap();
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn test_bad_pattern_leaves_router_unchanged() {
        let mut router = Router::new();
        assert!(router.get("/users/{id", endpoint()).is_err());
        assert!(router.is_empty());
    }

    #[test]
    fn test_prefix_is_applied() {
        let mut router = Router::with_prefix("v1/");
        router.get("items", endpoint()).unwrap();
        let paths: Vec<_> = router.routes().map(|(_, path, _)| path.to_string()).collect();
        assert_eq!(paths, ["/v1/items"]);
        assert_eq!(router.prefix(), Some("v1/"));
    }

    #[test]
    fn test_validations_precede_middleware() {
        let mut router = Router::new();
        let accept_all = Validation::new(validator_fn(|_, _| Ok(())));
        router
            .add(HttpMethod::Post, "/users", endpoint(), [accept_all.clone()])
            .unwrap()
            .middleware(Pass("first"), 0, false)
            .validate(accept_all)
            .middleware(Pass("second"), 100, true);

        let (_, _, definition) = router.routes().next().unwrap();
        let names: Vec<_> = definition.entries().iter().map(MiddlewareEntry::name).collect();
        assert_eq!(names, ["validation", "validation", "first", "second"]);
        assert!(definition.entries()[0].is_critical());
        assert!(definition.entries()[3].is_critical());
    }

    #[test]
    fn test_routes_iterate_by_method() {
        let mut router = Router::new();
        router.delete("/b", endpoint()).unwrap();
        router.get("/a", endpoint()).unwrap();
        router.options("/a", endpoint()).unwrap();

        let order: Vec<_> = router.routes().map(|(m, p, _)| format!("{m} {p}")).collect();
        assert_eq!(order, ["GET /a", "DELETE /b", "OPTIONS /a"]);
        assert!(router.contains(HttpMethod::Options, "/a/"));
    }
}
