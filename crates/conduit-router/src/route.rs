//! Routes bound and ready for dispatch.

use crate::pattern::PathMatcher;
use crate::router::RouteDefinition;
use conduit_core::{
    ConduitResult, ControllerRegistry, Dependencies, DependencyContainer, HandlerFn, HttpMethod,
};
use conduit_middleware::MiddlewareEntry;
use std::fmt;
use tokio::sync::OnceCell;

/// A loaded route: compiled matcher, bound handler and its middleware entries.
pub struct Route {
    method: HttpMethod,
    path: String,
    matcher: PathMatcher,
    handler: HandlerFn,
    label: String,
    dependencies: Vec<String>,
    entries: Vec<MiddlewareEntry>,
    cached: OnceCell<Dependencies>,
}

impl Route {
    /// Binds a router definition, creating the controller singleton if the
    /// endpoint targets a controller.
    pub fn bind(
        method: HttpMethod,
        path: &str,
        definition: &RouteDefinition,
        registry: &ControllerRegistry,
    ) -> Self {
        let endpoint = definition.endpoint();
        Self {
            method,
            path: path.to_string(),
            matcher: definition.matcher().clone(),
            handler: endpoint.bind(registry),
            label: endpoint.describe(),
            dependencies: endpoint.dependencies().to_vec(),
            entries: definition.entries(),
            cached: OnceCell::new(),
        }
    }

    /// Returns the method the route was registered under.
    pub const fn method(&self) -> HttpMethod {
        self.method
    }

    /// Returns the normalized path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the compiled matcher.
    pub const fn matcher(&self) -> &PathMatcher {
        &self.matcher
    }

    /// Returns the bound handler.
    pub const fn handler(&self) -> &HandlerFn {
        &self.handler
    }

    /// Returns the endpoint label used in logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the declared dependency keys.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Returns the route-layer middleware entries.
    pub fn entries(&self) -> &[MiddlewareEntry] {
        &self.entries
    }

    /// Resolves the route's dependencies once and reuses the result.
    ///
    /// The first call resolves under `scope`, so a scoped dependency built for
    /// that request is the one every later request sees. Later overrides on the
    /// container are not observed either.
    pub async fn cached_dependencies(
        &self,
        container: &DependencyContainer,
        scope: Option<&str>,
    ) -> ConduitResult<Dependencies> {
        self.cached
            .get_or_try_init(|| container.resolve_many(&self.dependencies, scope))
            .await
            .cloned()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("endpoint", &self.label)
            .field("dependencies", &self.dependencies)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}
