//! Controller capability and the per-type instance registry.
//!
//! A controller is any type that can look up its async methods by name. The
//! registry hands out one lazily created instance per controller type; it is
//! owned by the dispatcher rather than being process-global, so every
//! application (and every test) gets a fresh set of controllers.
//!
//! # Example
//!
//! ```
//! use conduit_core::{BoxFuture, Controller, ControllerMethod, Dependencies, Request, Response};
//!
//! #[derive(Default)]
//! struct HealthController;
//!
//! fn status<'a>(
//!     _this: &'a HealthController,
//!     _req: &'a mut Request,
//!     res: &'a mut Response,
//!     _deps: Dependencies,
//! ) -> BoxFuture<'a, anyhow::Result<()>> {
//!     Box::pin(async move {
//!         res.text("ok")?;
//!         Ok(())
//!     })
//! }
//!
//! impl Controller for HealthController {
//!     fn method(name: &str) -> Option<ControllerMethod<Self>> {
//!         match name {
//!             "status" => Some(status),
//!             _ => None,
//!         }
//!     }
//! }
//! ```

use crate::di::Dependencies;
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;
use parking_lot::Mutex;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A controller method: borrows the controller instance for the call.
pub type ControllerMethod<C> = for<'a> fn(
    &'a C,
    &'a mut Request,
    &'a mut Response,
    Dependencies,
) -> BoxFuture<'a, anyhow::Result<()>>;

/// A type whose methods can be routed to.
pub trait Controller: Default + Send + Sync + 'static {
    /// Looks up a method by name.
    fn method(name: &str) -> Option<ControllerMethod<Self>>;
}

/// Lazily created controller singletons keyed by type.
#[derive(Default)]
pub struct ControllerRegistry {
    instances: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl ControllerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the instance for `C`, creating it on first use.
    pub fn instance<C: Controller>(&self) -> Arc<C> {
        let mut instances = self.instances.lock();
        let entry = instances.entry(TypeId::of::<C>()).or_insert_with(|| {
            tracing::debug!(controller = type_name::<C>(), "creating controller instance");
            let instance: Arc<dyn Any + Send + Sync> = Arc::new(C::default());
            instance
        });
        // Entries are keyed by TypeId, so the downcast always succeeds.
        Arc::clone(entry)
            .downcast::<C>()
            .unwrap_or_else(|_| Arc::new(C::default()))
    }

    /// Returns `true` if an instance of `C` has been created.
    #[must_use]
    pub fn contains<C: Controller>(&self) -> bool {
        self.instances.lock().contains_key(&TypeId::of::<C>())
    }

    /// Returns the number of controller instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.lock().len()
    }

    /// Returns `true` if no controller has been instantiated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.lock().is_empty()
    }
}

impl fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerRegistry")
            .field("instance_count", &self.len())
            .finish()
    }
}
