//! The dispatcher's route table.
//!
//! Routes are kept per method in insertion order and matched first-match-wins.
//! Every non-`OPTIONS` route is also mirrored under `OPTIONS` for the same path
//! so that preflight requests reach the middleware chain. An explicitly
//! registered `OPTIONS` route always takes precedence over a mirror.

use crate::pattern::normalize_path;
use crate::route::Route;
use crate::router::Router;
use conduit_core::{ConduitError, ConduitResult, HttpMethod, ParamMap};
use indexmap::IndexMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Slot {
    route: Arc<Route>,
    mirror: bool,
}

/// Result of looking up a request in the table.
#[derive(Debug)]
pub enum Lookup {
    /// The method has no routes at all.
    Empty,
    /// Routes exist for the method but none matched.
    NotFound,
    /// The first matching route and its captured parameters.
    Found {
        /// The matched route.
        route: Arc<Route>,
        /// Captured path parameters, raw.
        params: ParamMap,
    },
}

/// Selects what [`RouteTable::unload`] removes.
///
/// | Fields set | Removes |
/// |---|---|
/// | `router` | every path the router declares, per method |
/// | `method` + `route` | that one route (and its mirror) |
/// | `method` | every route of that method |
/// | `route` | that path under every method |
///
/// `router` takes precedence over the other fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnloadRoute<'a> {
    /// A path, normalized before comparison.
    pub route: Option<&'a str>,
    /// A method.
    pub method: Option<HttpMethod>,
    /// A router previously loaded.
    pub router: Option<&'a Router>,
}

/// Routes grouped by method.
#[derive(Debug, Default)]
pub struct RouteTable {
    methods: [IndexMap<String, Slot>; 6],
}

impl RouteTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a batch of routes.
    ///
    /// Fails with [`ConduitError::RoutingConflict`] if any route's path is
    /// already present for its method. Conflicts are detected before anything
    /// is inserted, so the table is unchanged on failure.
    pub fn insert_all(&mut self, routes: Vec<Route>) -> ConduitResult<()> {
        for route in &routes {
            if self.occupied(route.method(), route.path()) {
                return Err(ConduitError::routing_conflict(
                    route.method().as_str(),
                    route.path(),
                ));
            }
        }
        for route in routes {
            self.insert_unchecked(Arc::new(route));
        }
        Ok(())
    }

    /// Inserts one route. See [`insert_all`](Self::insert_all).
    pub fn insert(&mut self, route: Route) -> ConduitResult<()> {
        self.insert_all(vec![route])
    }

    fn occupied(&self, method: HttpMethod, path: &str) -> bool {
        match self.methods[method as usize].get(path) {
            Some(slot) => !slot.mirror,
            None => false,
        }
    }

    fn insert_unchecked(&mut self, route: Arc<Route>) {
        let method = route.method();
        let path = route.path().to_string();

        if method == HttpMethod::Options {
            self.options_mut().insert(path, Slot { route, mirror: false });
            return;
        }

        self.methods[method as usize].insert(
            path.clone(),
            Slot {
                route: Arc::clone(&route),
                mirror: false,
            },
        );
        if !self.occupied(HttpMethod::Options, &path) {
            self.options_mut().insert(path, Slot { route, mirror: true });
        }
    }

    fn options_mut(&mut self) -> &mut IndexMap<String, Slot> {
        &mut self.methods[HttpMethod::Options as usize]
    }

    /// Finds the first route for `method` whose pattern matches `pathname`.
    pub fn find(&self, method: HttpMethod, pathname: &str) -> Lookup {
        let routes = &self.methods[method as usize];
        if routes.is_empty() {
            return Lookup::Empty;
        }
        routes
            .values()
            .find_map(|slot| {
                slot.route.matcher().captures(pathname).map(|params| Lookup::Found {
                    route: Arc::clone(&slot.route),
                    params,
                })
            })
            .unwrap_or(Lookup::NotFound)
    }

    /// Returns the route registered at exactly `path` for `method`.
    pub fn get(&self, method: HttpMethod, path: &str) -> Option<Arc<Route>> {
        self.methods[method as usize]
            .get(&normalize_path(None, path))
            .map(|slot| Arc::clone(&slot.route))
    }

    /// Returns `true` if `path` under `OPTIONS` is a mirror of another method.
    pub fn is_mirror(&self, path: &str) -> bool {
        self.methods[HttpMethod::Options as usize]
            .get(&normalize_path(None, path))
            .is_some_and(|slot| slot.mirror)
    }

    /// Returns the number of routes for `method`, mirrors included.
    pub fn len_of(&self, method: HttpMethod) -> usize {
        self.methods[method as usize].len()
    }

    /// Returns the number of routes, mirrors included.
    pub fn len(&self) -> usize {
        self.methods.iter().map(IndexMap::len).sum()
    }

    /// Returns `true` if the table holds no route.
    pub fn is_empty(&self) -> bool {
        self.methods.iter().all(IndexMap::is_empty)
    }

    /// Removes routes as selected by `target`. Returns the number removed,
    /// mirrors included.
    pub fn unload(&mut self, target: UnloadRoute<'_>) -> usize {
        let before = self.len();
        match target {
            UnloadRoute {
                router: Some(router),
                ..
            } => {
                for (method, path, _) in router.routes() {
                    self.remove(method, path);
                }
            }
            UnloadRoute {
                method: Some(method),
                route: Some(path),
                ..
            } => self.remove(method, &normalize_path(None, path)),
            UnloadRoute {
                method: Some(method),
                route: None,
                ..
            } => self.clear_method(method),
            UnloadRoute {
                method: None,
                route: Some(path),
                ..
            } => {
                let path = normalize_path(None, path);
                for routes in &mut self.methods {
                    routes.shift_remove(&path);
                }
            }
            UnloadRoute { .. } => {}
        }
        before - self.len()
    }

    /// Removes every route.
    pub fn clear(&mut self) {
        for routes in &mut self.methods {
            routes.clear();
        }
    }

    fn remove(&mut self, method: HttpMethod, path: &str) {
        self.methods[method as usize].shift_remove(path);
        if method == HttpMethod::Options {
            self.refresh_mirror(path);
        } else if self.is_mirror(path) {
            self.options_mut().shift_remove(path);
            self.refresh_mirror(path);
        }
    }

    fn clear_method(&mut self, method: HttpMethod) {
        let paths: Vec<String> = self.methods[method as usize].keys().cloned().collect();
        for path in paths {
            self.remove(method, &path);
        }
    }

    /// Re-points the `OPTIONS` mirror for `path` at a remaining route, if any.
    fn refresh_mirror(&mut self, path: &str) {
        if self.methods[HttpMethod::Options as usize].contains_key(path) {
            return;
        }
        let survivor = HttpMethod::ALL
            .into_iter()
            .filter(|m| *m != HttpMethod::Options)
            .filter_map(|m| self.methods[m as usize].get(path))
            .last()
            .map(|slot| Arc::clone(&slot.route));
        if let Some(route) = survivor {
            self.options_mut()
                .insert(path.to_string(), Slot { route, mirror: true });
        }
    }
}
