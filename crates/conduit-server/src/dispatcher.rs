//! The request dispatcher.
//!
//! [`Dispatcher`] owns the route table, the global middleware list, the CORS
//! stage, the dependency container and the controller registry. Each request
//! goes through:
//!
//! ```text
//! method check ─405─▶ lookup ─404─▶ params + query ─▶ dependencies
//!      ─▶ pipeline [cors] [global] [route] ─▶ handler
//! ```
//!
//! Any fault after the lookup becomes a 500 unless a response was already
//! sent. Nothing a single request does can take the process down.

use crate::cors::cors_entry;
use crate::query::parse_query;
use bytes::Bytes;
use conduit_config::ConduitConfig;
use conduit_core::{
    ConduitResult, ControllerRegistry, DependencyContainer, DependencyKeys, HttpMethod, Lifecycle, Request,
    Response,
};
use conduit_middleware::{Layer, Middleware, MiddlewareEntry, Pipeline, PipelineOutcome};
use conduit_router::{Lookup, Route, RouteTable, Router, UnloadRoute};
use conduit_telemetry::{log_request, record_request, InFlightGuard, RequestLog};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Routes requests through the middleware pipeline to their handlers.
///
/// The dispatcher is shared behind an `Arc`; registration methods take
/// `&self` so routes and middleware can be changed while serving. Such
/// changes are not atomic with respect to requests already past the lookup.
///
/// # Example
///
/// ```
/// use conduit_config::ConduitConfig;
/// use conduit_core::{Endpoint, HttpMethod, Request};
/// use conduit_router::Router;
/// use conduit_server::Dispatcher;
///
/// # tokio_test::block_on(async {
/// let dispatcher = Dispatcher::new(ConduitConfig::default()).unwrap();
///
/// let mut router = Router::new();
/// router
///     .get("/ping", Endpoint::new(|_req, res, _deps| Box::pin(async move {
///         res.text("pong")?;
///         Ok(())
///     })))
///     .unwrap();
/// dispatcher.load_router(&router).unwrap();
///
/// let res = dispatcher.handle(Request::new(HttpMethod::Get, "/ping")).await;
/// assert_eq!(res.body().as_ref(), b"pong");
/// # });
/// ```
pub struct Dispatcher {
    config: ConduitConfig,
    routes: RwLock<RouteTable>,
    global: RwLock<Vec<MiddlewareEntry>>,
    cors: MiddlewareEntry,
    container: Arc<DependencyContainer>,
    controllers: ControllerRegistry,
    pipeline: Pipeline,
}

impl Dispatcher {
    /// Creates a dispatcher with an empty route table and container.
    ///
    /// # Errors
    ///
    /// Fails if a configured CORS origin expression does not compile.
    pub fn new(config: ConduitConfig) -> ConduitResult<Self> {
        Self::with_container(config, Arc::new(DependencyContainer::new()))
    }

    /// Creates a dispatcher that resolves from an existing container.
    pub fn with_container(config: ConduitConfig, container: Arc<DependencyContainer>) -> ConduitResult<Self> {
        let cors = cors_entry(&config.cors)?;
        let pipeline = Pipeline::new(Duration::from_millis(config.middleware_timeout_ms));
        Ok(Self {
            config,
            routes: RwLock::new(RouteTable::new()),
            global: RwLock::new(Vec::new()),
            cors,
            container,
            controllers: ControllerRegistry::new(),
            pipeline,
        })
    }

    /// Returns the configuration.
    pub const fn config(&self) -> &ConduitConfig {
        &self.config
    }

    /// Returns the dependency container.
    pub fn container(&self) -> &Arc<DependencyContainer> {
        &self.container
    }

    /// Binds every route of `router` and adds them to the table.
    ///
    /// Controller singletons are created here. Nothing is added if any route
    /// is already registered for the same method and path.
    ///
    /// # Errors
    ///
    /// Returns [`conduit_core::ConduitError::RoutingConflict`] on a duplicate.
    pub fn load_router(&self, router: &Router) -> ConduitResult<()> {
        let routes: Vec<Route> = router
            .routes()
            .map(|(method, path, definition)| Route::bind(method, path, definition, &self.controllers))
            .collect();
        let count = routes.len();

        self.routes.write().insert_all(routes)?;
        tracing::debug!(routes = count, prefix = router.prefix(), "router loaded");
        Ok(())
    }

    /// Removes the routes selected by `target` and returns how many went.
    pub fn unload_route(&self, target: UnloadRoute<'_>) -> usize {
        let removed = self.routes.write().unload(target);
        tracing::debug!(removed, "routes unloaded");
        removed
    }

    /// Removes every route.
    pub fn unload_routes(&self) {
        self.routes.write().clear();
        tracing::debug!("all routes unloaded");
    }

    /// Returns the number of registered routes, OPTIONS mirrors included.
    pub fn route_count(&self) -> usize {
        self.routes.read().len()
    }

    /// Appends a global middleware.
    ///
    /// A `timeout_ms` of 0 uses the configured default.
    pub fn global_middleware<M: Middleware>(&self, middleware: M, timeout_ms: u64, critical: bool) {
        self.global_entry(MiddlewareEntry::new(middleware).timeout_ms(timeout_ms).critical(critical));
    }

    /// Appends a prepared global entry.
    pub fn global_entry(&self, entry: MiddlewareEntry) {
        tracing::debug!(middleware = entry.name(), critical = entry.is_critical(), "global middleware added");
        self.global.write().push(entry);
    }

    /// Appends several global entries, keeping their order.
    pub fn global_entries<I>(&self, entries: I)
    where
        I: IntoIterator<Item = MiddlewareEntry>,
    {
        self.global.write().extend(entries);
    }

    /// Removes every global middleware.
    pub fn clear_global_middlewares(&self) {
        self.global.write().clear();
    }

    /// Registers a singleton value.
    pub fn register_dependency_value<T: Send + Sync + 'static>(&self, keys: impl Into<DependencyKeys>, value: T) {
        self.container.register_value(keys, value);
    }

    /// Registers a value under an explicit lifecycle.
    pub fn register_dependency_value_with<T: Send + Sync + 'static>(
        &self,
        keys: impl Into<DependencyKeys>,
        value: T,
        lifecycle: Lifecycle,
    ) {
        self.container.register_value_with(keys, value, lifecycle);
    }

    /// Registers a singleton factory.
    pub fn register_dependency_factory<T, F, Fut>(&self, keys: impl Into<DependencyKeys>, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.container.register_factory(keys, factory);
    }

    /// Registers a factory under an explicit lifecycle.
    pub fn register_dependency_factory_with<T, F, Fut>(
        &self,
        keys: impl Into<DependencyKeys>,
        factory: F,
        lifecycle: Lifecycle,
    ) where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.container.register_factory_with(keys, factory, lifecycle);
    }

    /// Handles a wire request whose body has been buffered.
    ///
    /// Methods outside the supported six are answered with 405 here, before a
    /// [`Request`] is built.
    pub async fn handle_http(
        &self,
        request: http::Request<Bytes>,
        remote_addr: Option<SocketAddr>,
    ) -> http::Response<Full<Bytes>> {
        let (parts, body) = request.into_parts();
        let raw_url = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_string(), |pq| pq.as_str().to_string());

        let Some(method) = HttpMethod::from_http(&parts.method) else {
            let started = Instant::now();
            let mut res = Response::new();
            let message = self
                .config
                .response_messages
                .method_not_allowed_for(parts.method.as_str());
            reply(&mut res, StatusCode::METHOD_NOT_ALLOWED, &message);

            let body = Request::parse_body(&body);
            self.log(&Access {
                remote_addr,
                method: parts.method.as_str(),
                url: &raw_url,
                status: res.status(),
                headers: &parts.headers,
                body: &body,
            });
            record_request(parts.method.as_str(), res.status().as_u16(), started.elapsed());
            return res.into_http();
        };

        let req = Request::new(method, raw_url)
            .with_headers(parts.headers)
            .with_remote_addr(remote_addr)
            .with_body(Request::parse_body(&body));

        self.handle(req).await.into_http()
    }

    /// Dispatches a request and returns the response it produced.
    ///
    /// Emits the access log and request metrics.
    pub async fn handle(&self, mut req: Request) -> Response {
        let started = Instant::now();
        let _in_flight = InFlightGuard::new();

        let res = self.dispatch(&mut req).await;

        self.log(&Access {
            remote_addr: req.remote_addr(),
            method: req.method().as_str(),
            url: req.raw_url(),
            status: res.status(),
            headers: req.headers(),
            body: req.body(),
        });
        record_request(req.method().as_str(), res.status().as_u16(), started.elapsed());
        res
    }

    async fn dispatch(&self, req: &mut Request) -> Response {
        let mut res = Response::new();

        let lookup = self.routes.read().find(req.method(), req.pathname());
        let route = match lookup {
            Lookup::Found { route, params } => {
                *req.params_mut() = params;
                route
            }
            Lookup::Empty | Lookup::NotFound => {
                let message = self.config.response_messages.not_found_for(req.pathname());
                reply(&mut res, StatusCode::NOT_FOUND, &message);
                return res;
            }
        };

        let scope = req.id().to_string();
        if let Err(err) = self.run_route(&route, req, &mut res, &scope).await {
            tracing::error!(
                request_id = %scope,
                route = %route.label(),
                path = route.path(),
                kind = err.kind(),
                error = %err,
                "request failed"
            );
            if !res.is_sent() {
                reply(
                    &mut res,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &self.config.response_messages.server_error,
                );
            }
        }
        self.container.clear_scope(&scope);

        res
    }

    async fn run_route(
        &self,
        route: &Route,
        req: &mut Request,
        res: &mut Response,
        scope: &str,
    ) -> ConduitResult<()> {
        let query = parse_query(req.raw_url())?;
        *req.query_mut() = query;

        let deps = if self.config.dependency_cache {
            route.cached_dependencies(&self.container, Some(scope)).await?
        } else {
            self.container
                .resolve_many(route.dependencies(), Some(scope))
                .await?
        };

        let global = self.global.read().clone();
        let layers = [
            Layer::new("cors", std::slice::from_ref(&self.cors)),
            Layer::new("global", &global),
            Layer::new("route", route.entries()),
        ];

        match self.pipeline.run(&layers, req, res, route.handler(), deps).await {
            PipelineOutcome::Failed(err) => Err(err),
            PipelineOutcome::Completed | PipelineOutcome::Halted => Ok(()),
        }
    }

    fn log(&self, access: &Access<'_>) {
        let settings = &self.config.logger;
        if !settings.enabled {
            return;
        }

        let ip = access
            .remote_addr
            .map_or_else(|| "-".to_string(), |addr| addr.ip().to_string());
        let user_agent = access
            .headers
            .get(http::header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("-");
        let (headers, body) = if settings.verbose {
            (headers_to_json(access.headers), access.body.clone())
        } else {
            (Value::Null, Value::Null)
        };

        log_request(
            &RequestLog {
                ip: &ip,
                method: access.method,
                url: access.url,
                status: access.status.as_u16(),
                user_agent,
                headers,
                body,
            },
            settings.verbose,
        );
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.routes.read().len())
            .field("global", &self.global.read().len())
            .field("container", &self.container)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

struct Access<'a> {
    remote_addr: Option<SocketAddr>,
    method: &'a str,
    url: &'a str,
    status: StatusCode,
    headers: &'a HeaderMap,
    body: &'a Value,
}

fn reply(res: &mut Response, status: StatusCode, message: &str) {
    // A content type set earlier in the pipeline would mislabel the JSON body.
    let written = res
        .remove_header("content-type")
        .and_then(|res| res.set_status(status))
        .and_then(|res| res.json(&json!({ "message": message })));
    if let Err(err) = written {
        tracing::error!(status = status.as_u16(), error = %err, "failed to write error response");
    }
}

fn headers_to_json(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        match map.get_mut(name.as_str()) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            _ => {
                map.insert(name.as_str().to_string(), Value::String(value));
            }
        }
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::Endpoint;
    use http_body_util::BodyExt;

    fn ok_endpoint() -> Endpoint {
        Endpoint::new(|_req, res, _deps| {
            Box::pin(async move {
                res.text("ok")?;
                Ok(())
            })
        })
    }

    #[test]
    fn test_headers_to_json_joins_repeats() {
        let mut headers = HeaderMap::new();
        headers.append("accept", "text/html".parse().unwrap());
        headers.append("accept", "application/json".parse().unwrap());
        headers.insert("host", "example.test".parse().unwrap());

        assert_eq!(
            headers_to_json(&headers),
            json!({"accept": "text/html, application/json", "host": "example.test"})
        );
    }

    #[test]
    fn test_load_router_conflict_leaves_table_unchanged() {
        let dispatcher = Dispatcher::new(ConduitConfig::default()).unwrap();

        let mut first = Router::new();
        first.get("/a", ok_endpoint()).unwrap();
        dispatcher.load_router(&first).unwrap();
        let before = dispatcher.route_count();

        let mut second = Router::new();
        second.get("/b", ok_endpoint()).unwrap();
        second.get("/a", ok_endpoint()).unwrap();
        let err = dispatcher.load_router(&second).unwrap_err();

        assert_eq!(err.to_string(), r#"route "GET /a" is duplicated"#);
        assert_eq!(dispatcher.route_count(), before);
    }

    #[tokio::test]
    async fn test_handle_http_preserves_raw_target() {
        let dispatcher = Dispatcher::new(ConduitConfig::default()).unwrap();
        let mut router = Router::new();
        router
            .get(
                "/echo",
                Endpoint::new(|req, res, _deps| {
                    Box::pin(async move {
                        let url = req.raw_url().to_string();
                        res.text(url)?;
                        Ok(())
                    })
                }),
            )
            .unwrap();
        dispatcher.load_router(&router).unwrap();

        let request = http::Request::get("/echo?a=1").body(Bytes::new()).unwrap();
        let response = dispatcher.handle_http(request, None).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.as_ref(), b"/echo?a=1");
    }
}
