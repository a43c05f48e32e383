//! Handler normalization.
//!
//! Every route ultimately runs a [`HandlerFn`]: an async function of
//! `(request, response, dependencies)`. An [`Endpoint`] is the registration
//! form of a handler. It is either a plain function or a controller action
//! that is bound to the controller's singleton when routes are loaded.

use crate::controller::{Controller, ControllerRegistry};
use crate::di::Dependencies;
use crate::error::{ConduitError, ConduitResult};
use crate::request::Request;
use crate::response::Response;
use crate::signature::keys_from_signature;
use std::any::type_name;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The uniform handler signature.
pub type HandlerFn = Arc<
    dyn for<'a> Fn(&'a mut Request, &'a mut Response, Dependencies) -> BoxFuture<'a, anyhow::Result<()>>
        + Send
        + Sync,
>;

/// Boxes a closure into a [`HandlerFn`].
pub fn handler_fn<F>(f: F) -> HandlerFn
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response, Dependencies) -> BoxFuture<'a, anyhow::Result<()>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

type Binder = Arc<dyn Fn(&ControllerRegistry) -> HandlerFn + Send + Sync>;

#[derive(Clone)]
enum Target {
    Function(HandlerFn),
    Action {
        controller: &'static str,
        method: String,
        bind: Binder,
    },
}

/// A handler as registered on a route, plus its declared dependency keys.
///
/// # Example
///
/// ```
/// use conduit_core::Endpoint;
/// use serde_json::json;
///
/// let endpoint = Endpoint::new(|req, res, deps| {
///     Box::pin(async move {
///         let id = req.param("id").unwrap_or_default().to_string();
///         res.json(&json!({ "id": id, "deps": deps.len() }))?;
///         Ok(())
///     })
/// })
/// .with_dependencies(["db"]);
///
/// assert_eq!(endpoint.dependencies(), ["db".to_string()]);
/// ```
#[derive(Clone)]
pub struct Endpoint {
    target: Target,
    dependencies: Vec<String>,
}

impl Endpoint {
    /// Wraps a plain handler function.
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Request, &'a mut Response, Dependencies) -> BoxFuture<'a, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        Self::from_handler(handler_fn(f))
    }

    /// Wraps an already boxed handler.
    #[must_use]
    pub fn from_handler(handler: HandlerFn) -> Self {
        Self {
            target: Target::Function(handler),
            dependencies: Vec::new(),
        }
    }

    /// Wraps a handler and derives its dependency keys from a textual
    /// parameter list, e.g. `"(req, res, { db, cache })"`.
    ///
    /// See [`keys_from_signature`] for the extraction rules.
    pub fn from_signature<F>(signature: &str, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Request, &'a mut Response, Dependencies) -> BoxFuture<'a, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        Self::new(f).with_dependencies(keys_from_signature(signature))
    }

    /// Targets a controller method.
    ///
    /// The method name is checked immediately; the controller instance is
    /// created lazily, once per controller type, when the route is loaded.
    pub fn action<C: Controller>(method: &str) -> ConduitResult<Self> {
        let action = C::method(method).ok_or_else(|| ConduitError::ControllerMethod {
            controller: type_name::<C>(),
            method: method.to_string(),
        })?;

        let bind: Binder = Arc::new(move |registry: &ControllerRegistry| -> HandlerFn {
            let instance = registry.instance::<C>();
            handler_fn(move |req, res, deps| {
                let instance = Arc::clone(&instance);
                Box::pin(async move { action(&instance, req, res, deps).await })
            })
        });

        Ok(Self {
            target: Target::Action {
                controller: type_name::<C>(),
                method: method.to_string(),
                bind,
            },
            dependencies: Vec::new(),
        })
    }

    /// Declares the dependency keys resolved before the handler runs.
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the declared dependency keys.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Returns `true` when this endpoint targets a controller method.
    #[must_use]
    pub const fn is_action(&self) -> bool {
        matches!(self.target, Target::Action { .. })
    }

    /// Returns a label for logs: `"handler"` or `"Controller::method"`.
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.target {
            Target::Function(_) => "handler".to_string(),
            Target::Action {
                controller, method, ..
            } => format!("{controller}::{method}"),
        }
    }

    /// Produces the invocable handler, creating the controller singleton if needed.
    #[must_use]
    pub fn bind(&self, registry: &ControllerRegistry) -> HandlerFn {
        match &self.target {
            Target::Function(handler) => Arc::clone(handler),
            Target::Action { bind, .. } => bind(registry),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("target", &self.describe())
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::HttpMethod;
    use crate::ControllerMethod;
    use http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static CREATED: AtomicUsize = AtomicUsize::new(0);

    struct Greeter {
        greeting: &'static str,
    }

    impl Default for Greeter {
        fn default() -> Self {
            CREATED.fetch_add(1, Ordering::SeqCst);
            Self { greeting: "hello" }
        }
    }

    fn greet<'a>(
        this: &'a Greeter,
        _req: &'a mut Request,
        res: &'a mut Response,
        _deps: Dependencies,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            res.text(this.greeting)?;
            Ok(())
        })
    }

    impl Controller for Greeter {
        fn method(name: &str) -> Option<ControllerMethod<Self>> {
            match name {
                "greet" => Some(greet),
                _ => None,
            }
        }
    }

    #[tokio::test]
    async fn test_function_endpoint() {
        let endpoint = Endpoint::new(|_req, res, _deps| {
            Box::pin(async move {
                res.set_status(StatusCode::ACCEPTED)?;
                res.end()?;
                Ok(())
            })
        });
        assert!(!endpoint.is_action());

        let handler = endpoint.bind(&ControllerRegistry::new());
        let mut req = Request::new(HttpMethod::Get, "/");
        let mut res = Response::new();
        handler(&mut req, &mut res, Dependencies::new()).await.unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_action_binds_singleton() {
        let registry = ControllerRegistry::new();
        let endpoint = Endpoint::action::<Greeter>("greet").unwrap();
        assert!(endpoint.is_action());
        assert!(endpoint.describe().ends_with("Greeter::greet"));

        let before = CREATED.load(Ordering::SeqCst);
        let first = endpoint.bind(&registry);
        let _second = endpoint.bind(&registry);
        assert_eq!(CREATED.load(Ordering::SeqCst), before + 1);

        let mut req = Request::new(HttpMethod::Get, "/");
        let mut res = Response::new();
        first(&mut req, &mut res, Dependencies::new()).await.unwrap();
        assert_eq!(res.body().as_ref(), b"hello");
    }

    #[test]
    fn test_unknown_action_fails_fast() {
        let err = Endpoint::action::<Greeter>("wave").unwrap_err();
        assert!(matches!(err, ConduitError::ControllerMethod { .. }));
        assert!(err.to_string().contains("Method wave is not bound"));
    }

    #[test]
    fn test_from_signature() {
        let endpoint = Endpoint::from_signature("(req, res, { db, cache = new Map() })", |_, _, _| {
            Box::pin(async { Ok(()) })
        });
        assert_eq!(endpoint.dependencies(), ["db".to_string(), "cache".to_string()]);
    }
}
