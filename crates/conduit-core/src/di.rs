//! Dependency injection container.
//!
//! Dependencies are registered under a canonical key plus optional aliases,
//! either as a ready value or as an async factory, and resolved by key with a
//! [`Lifecycle`]:
//!
//! | Lifecycle | Instances |
//! |---|---|
//! | `Singleton` | at most one for the container's lifetime |
//! | `Scoped` | at most one per scope id, until [`DependencyContainer::clear_scope`] |
//! | `Transient` | a fresh one on every resolve |
//!
//! # Example
//!
//! ```rust
//! use conduit_core::di::{DependencyContainer, Lifecycle};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! # tokio_test::block_on(async {
//! let container = DependencyContainer::new();
//! container.register_value(["db", "database"], Database { url: "postgres://localhost".into() });
//! container.register_factory_with("request_log", || async { anyhow::Ok(Vec::<String>::new()) }, Lifecycle::Scoped);
//!
//! let db: Arc<Database> = container.resolve("database", None).await.unwrap();
//! assert_eq!(db.url, "postgres://localhost");
//! # });
//! ```

use crate::error::{ConduitError, ConduitResult};
use crate::handler::BoxFuture;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// A resolved dependency instance.
pub type Resolved = Arc<dyn Any + Send + Sync>;

type Factory = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<Resolved>> + Send + Sync>;

/// Instance caching policy for a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// One instance for the container's lifetime.
    #[default]
    Singleton,
    /// A new instance on every resolve.
    Transient,
    /// One instance per scope id.
    Scoped,
}

impl Lifecycle {
    /// Parses a lifecycle name. Unrecognized names fall back to `Transient`.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "singleton" => Self::Singleton,
            "scoped" => Self::Scoped,
            _ => Self::Transient,
        }
    }

    /// Returns the lower-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Singleton => "singleton",
            Self::Transient => "transient",
            Self::Scoped => "scoped",
        }
    }
}

/// How a dependency produces its instance.
#[derive(Clone)]
pub enum Provider {
    /// A ready value, shared by every resolve.
    Value(Resolved),
    /// An async factory invoked whenever the lifecycle requires a new instance.
    Factory(Factory),
}

impl Provider {
    /// Wraps a ready value.
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Self::Value(Arc::new(value))
    }

    /// Wraps an async factory.
    pub fn factory<T, F, Fut>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::Factory(Arc::new(move || -> BoxFuture<'static, anyhow::Result<Resolved>> {
            let fut = factory();
            Box::pin(async move { fut.await.map(|v| Arc::new(v) as Resolved) })
        }))
    }

    /// Returns `true` for factories.
    #[must_use]
    pub const fn is_factory(&self) -> bool {
        matches!(self, Self::Factory(_))
    }

    async fn instantiate(&self) -> ConduitResult<Resolved> {
        match self {
            Self::Value(value) => Ok(Arc::clone(value)),
            Self::Factory(factory) => factory().await.map_err(ConduitError::Handler),
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(_) => f.write_str("Value"),
            Self::Factory(_) => f.write_str("Factory"),
        }
    }
}

/// A canonical key plus aliases.
///
/// Built from a single key or from an array whose first element is the
/// canonical key and the rest are aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyKeys {
    main: String,
    aliases: Vec<String>,
}

impl DependencyKeys {
    /// Creates keys with no aliases.
    #[must_use]
    pub fn new(main: impl Into<String>) -> Self {
        Self {
            main: main.into(),
            aliases: Vec::new(),
        }
    }

    /// Adds an alias.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Returns the canonical key.
    #[must_use]
    pub fn main(&self) -> &str {
        &self.main
    }

    fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut keys = keys.into_iter().map(Into::into);
        Self {
            main: keys.next().unwrap_or_default(),
            aliases: keys.collect(),
        }
    }
}

impl From<&str> for DependencyKeys {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for DependencyKeys {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

impl<const N: usize> From<[&str; N]> for DependencyKeys {
    fn from(keys: [&str; N]) -> Self {
        Self::from_keys(keys)
    }
}

impl From<Vec<String>> for DependencyKeys {
    fn from(keys: Vec<String>) -> Self {
        Self::from_keys(keys)
    }
}

struct DependencyRecord {
    provider: Provider,
    lifecycle: Lifecycle,
    instance: OnceCell<Resolved>,
}

impl DependencyRecord {
    fn new(provider: Provider, lifecycle: Lifecycle) -> Self {
        Self {
            provider,
            lifecycle,
            instance: OnceCell::new(),
        }
    }
}

/// Snapshot returned by [`DependencyContainer::inspect`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyInfo {
    /// Canonical key.
    pub key: String,
    /// Caching policy.
    pub lifecycle: Lifecycle,
    /// Whether a singleton instance has been created.
    pub resolved: bool,
    /// Whether the dependency is produced by a factory.
    pub is_factory: bool,
}

type ScopeCells = HashMap<String, Arc<OnceCell<Resolved>>>;

/// Key-based dependency registry with lifecycle-scoped resolution.
///
/// All methods take `&self`; the container is shared behind an `Arc` by the
/// dispatcher. Locks are never held across an await point, so factories may
/// themselves resolve other dependencies.
#[derive(Default)]
pub struct DependencyContainer {
    records: RwLock<IndexMap<String, Arc<DependencyRecord>>>,
    aliases: RwLock<HashMap<String, String>>,
    scopes: Mutex<HashMap<String, ScopeCells>>,
}

impl DependencyContainer {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider. Re-registering a canonical key replaces its record.
    pub fn register(&self, keys: impl Into<DependencyKeys>, provider: Provider, lifecycle: Lifecycle) {
        let keys = keys.into();
        tracing::debug!(
            key = %keys.main,
            aliases = ?keys.aliases,
            lifecycle = lifecycle.as_str(),
            factory = provider.is_factory(),
            "registering dependency"
        );
        {
            let mut aliases = self.aliases.write();
            for alias in &keys.aliases {
                aliases.insert(alias.clone(), keys.main.clone());
            }
        }
        self.records
            .write()
            .insert(keys.main, Arc::new(DependencyRecord::new(provider, lifecycle)));
    }

    /// Registers a value as a singleton.
    pub fn register_value<T: Send + Sync + 'static>(&self, keys: impl Into<DependencyKeys>, value: T) {
        self.register(keys, Provider::value(value), Lifecycle::Singleton);
    }

    /// Registers a value with an explicit lifecycle.
    pub fn register_value_with<T: Send + Sync + 'static>(
        &self,
        keys: impl Into<DependencyKeys>,
        value: T,
        lifecycle: Lifecycle,
    ) {
        self.register(keys, Provider::value(value), lifecycle);
    }

    /// Registers an async factory as a singleton.
    pub fn register_factory<T, F, Fut>(&self, keys: impl Into<DependencyKeys>, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.register(keys, Provider::factory(factory), Lifecycle::Singleton);
    }

    /// Registers an async factory with an explicit lifecycle.
    pub fn register_factory_with<T, F, Fut>(
        &self,
        keys: impl Into<DependencyKeys>,
        factory: F,
        lifecycle: Lifecycle,
    ) where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.register(keys, Provider::factory(factory), lifecycle);
    }

    /// Resolves a key to its type-erased instance.
    ///
    /// Aliases are mapped to their canonical key first.
    pub async fn resolve_any(&self, key: &str, scope: Option<&str>) -> ConduitResult<Resolved> {
        let main = self.canonical(key);
        let record = self
            .records
            .read()
            .get(&main)
            .cloned()
            .ok_or_else(|| ConduitError::dependency_not_found(key))?;

        match record.lifecycle {
            Lifecycle::Singleton => record
                .instance
                .get_or_try_init(|| record.provider.instantiate())
                .await
                .cloned(),
            Lifecycle::Scoped => {
                let scope = scope
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| ConduitError::ScopeRequired {
                        key: key.to_string(),
                    })?;
                let cell = Arc::clone(
                    self.scopes
                        .lock()
                        .entry(scope.to_string())
                        .or_default()
                        .entry(main)
                        .or_default(),
                );
                cell.get_or_try_init(|| record.provider.instantiate())
                    .await
                    .cloned()
            }
            Lifecycle::Transient => record.provider.instantiate().await,
        }
    }

    /// Resolves a key and downcasts it to `T`.
    pub async fn resolve<T: Send + Sync + 'static>(
        &self,
        key: &str,
        scope: Option<&str>,
    ) -> ConduitResult<Arc<T>> {
        self.resolve_any(key, scope)
            .await?
            .downcast::<T>()
            .map_err(|_| ConduitError::DependencyType {
                key: key.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Resolves every key in order into a [`Dependencies`] map keyed as requested.
    pub async fn resolve_many(&self, keys: &[String], scope: Option<&str>) -> ConduitResult<Dependencies> {
        let mut resolved = Dependencies::new();
        for key in keys {
            let instance = self.resolve_any(key, scope).await?;
            resolved.insert(key.clone(), instance);
        }
        Ok(resolved)
    }

    /// Replaces a registered dependency with an already-resolved singleton value.
    pub fn override_value<T: Send + Sync + 'static>(&self, key: &str, value: T) -> ConduitResult<()> {
        let main = self.canonical(key);
        let mut records = self.records.write();
        let slot = records
            .get_mut(&main)
            .ok_or_else(|| ConduitError::OverrideUnregistered {
                key: key.to_string(),
            })?;
        let value: Resolved = Arc::new(value);
        *slot = Arc::new(DependencyRecord {
            provider: Provider::Value(Arc::clone(&value)),
            lifecycle: Lifecycle::Singleton,
            instance: OnceCell::new_with(Some(value)),
        });
        Ok(())
    }

    /// Returns canonical keys in registration order.
    #[must_use]
    pub fn list_dependencies(&self) -> Vec<String> {
        self.records.read().keys().cloned().collect()
    }

    /// Describes a dependency without resolving it.
    #[must_use]
    pub fn inspect(&self, key: &str) -> Option<DependencyInfo> {
        let main = self.canonical(key);
        self.records.read().get(&main).map(|record| DependencyInfo {
            key: main.clone(),
            lifecycle: record.lifecycle,
            resolved: record.instance.initialized(),
            is_factory: record.provider.is_factory(),
        })
    }

    /// Returns `true` if the key or alias is registered.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.records.read().contains_key(&self.canonical(key))
    }

    /// Drops every instance cached for `scope`.
    pub fn clear_scope(&self, scope: &str) {
        self.scopes.lock().remove(scope);
    }

    /// Returns the number of scopes currently holding instances.
    #[must_use]
    pub fn active_scopes(&self) -> usize {
        self.scopes.lock().len()
    }

    /// Creates an independent copy of the registrations.
    ///
    /// Singleton instances already created are carried over; scoped caches are not.
    #[must_use]
    pub fn fork(&self) -> Self {
        let records = self
            .records
            .read()
            .iter()
            .map(|(key, record)| {
                let copy = DependencyRecord {
                    provider: record.provider.clone(),
                    lifecycle: record.lifecycle,
                    instance: OnceCell::new_with(record.instance.get().cloned()),
                };
                (key.clone(), Arc::new(copy))
            })
            .collect();
        Self {
            records: RwLock::new(records),
            aliases: RwLock::new(self.aliases.read().clone()),
            scopes: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the number of canonical registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn canonical(&self, key: &str) -> String {
        self.aliases
            .read()
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

impl fmt::Debug for DependencyContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyContainer")
            .field("keys", &self.list_dependencies())
            .field("active_scopes", &self.active_scopes())
            .finish()
    }
}

/// Dependencies resolved for one handler invocation.
///
/// # Example
///
/// ```rust
/// use conduit_core::di::Dependencies;
/// use std::sync::Arc;
///
/// let mut deps = Dependencies::new();
/// deps.insert("greeting", Arc::new(String::from("hello")));
///
/// let greeting: Arc<String> = deps.require("greeting").unwrap();
/// assert_eq!(greeting.as_str(), "hello");
/// assert!(deps.get::<u32>("greeting").is_none());
/// ```
#[derive(Clone, Default)]
pub struct Dependencies {
    values: IndexMap<String, Resolved>,
}

impl Dependencies {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an instance.
    pub fn insert(&mut self, key: impl Into<String>, value: Resolved) {
        self.values.insert(key.into(), value);
    }

    /// Returns the instance for `key` when it exists and is a `T`.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.values
            .get(key)
            .and_then(|v| Arc::clone(v).downcast::<T>().ok())
    }

    /// Returns the instance for `key` or an error naming what is missing.
    pub fn require<T: Send + Sync + 'static>(&self, key: &str) -> ConduitResult<Arc<T>> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| ConduitError::dependency_not_found(key))?;
        Arc::clone(value)
            .downcast::<T>()
            .map_err(|_| ConduitError::DependencyType {
                key: key.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Returns `true` if `key` was resolved.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns the resolved keys in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Returns the number of resolved dependencies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing was resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.values.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Counter(usize);

    fn counting_factory(
        container: &DependencyContainer,
        key: &str,
        lifecycle: Lifecycle,
    ) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        container.register_factory_with(
            key,
            move || {
                let n = seen.fetch_add(1, Ordering::SeqCst);
                async move { anyhow::Ok(Counter(n)) }
            },
            lifecycle,
        );
        calls
    }

    #[tokio::test]
    async fn test_singleton_resolves_once() {
        let container = DependencyContainer::new();
        let calls = counting_factory(&container, "counter", Lifecycle::Singleton);

        let a: Arc<Counter> = container.resolve("counter", None).await.unwrap();
        let b: Arc<Counter> = container.resolve("counter", None).await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_resolves_every_time() {
        let container = DependencyContainer::new();
        let calls = counting_factory(&container, "counter", Lifecycle::Transient);

        let a: Arc<Counter> = container.resolve("counter", None).await.unwrap();
        let b: Arc<Counter> = container.resolve("counter", None).await.unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_scoped_per_scope_id() {
        let container = DependencyContainer::new();
        let calls = counting_factory(&container, "counter", Lifecycle::Scoped);

        let a1: Arc<Counter> = container.resolve("counter", Some("a")).await.unwrap();
        let a2: Arc<Counter> = container.resolve("counter", Some("a")).await.unwrap();
        let b: Arc<Counter> = container.resolve("counter", Some("b")).await.unwrap();

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(container.active_scopes(), 2);

        container.clear_scope("a");
        assert_eq!(container.active_scopes(), 1);
        let a3: Arc<Counter> = container.resolve("counter", Some("a")).await.unwrap();
        assert!(!Arc::ptr_eq(&a1, &a3));
    }

    #[tokio::test]
    async fn test_scoped_requires_scope_id() {
        let container = DependencyContainer::new();
        counting_factory(&container, "counter", Lifecycle::Scoped);

        let missing = container.resolve::<Counter>("counter", None).await;
        assert!(matches!(missing, Err(ConduitError::ScopeRequired { .. })));

        let empty = container.resolve::<Counter>("counter", Some("")).await;
        assert!(matches!(empty, Err(ConduitError::ScopeRequired { .. })));
    }

    #[tokio::test]
    async fn test_missing_dependency() {
        let container = DependencyContainer::new();
        let err = container.resolve_any("nope", None).await.unwrap_err();
        assert_eq!(err.to_string(), "Dependency 'nope' not found");
    }

    #[tokio::test]
    async fn test_aliases_resolve_to_main_record() {
        let container = DependencyContainer::new();
        container.register_value(["db", "database", "store"], String::from("pg"));

        let a: Arc<String> = container.resolve("db", None).await.unwrap();
        let b: Arc<String> = container.resolve("store", None).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(container.list_dependencies(), vec!["db".to_string()]);
        assert!(container.contains("database"));
    }

    #[tokio::test]
    async fn test_reregister_overwrites() {
        let container = DependencyContainer::new();
        container.register_value("port", 80_u16);
        container.register_value("port", 8080_u16);

        let port: Arc<u16> = container.resolve("port", None).await.unwrap();
        assert_eq!(*port, 8080);
        assert_eq!(container.len(), 1);
    }

    #[tokio::test]
    async fn test_override() {
        let container = DependencyContainer::new();
        counting_factory(&container, "counter", Lifecycle::Transient);

        container.override_value("counter", Counter(99)).unwrap();
        let a: Arc<Counter> = container.resolve("counter", None).await.unwrap();
        let b: Arc<Counter> = container.resolve("counter", None).await.unwrap();
        assert_eq!(a.0, 99);
        assert!(Arc::ptr_eq(&a, &b));

        let err = container.override_value("unknown", 1_u8).unwrap_err();
        assert!(err.to_string().contains("Cannot override unregistered dependency"));
    }

    #[tokio::test]
    async fn test_inspect_and_fork() {
        let container = DependencyContainer::new();
        counting_factory(&container, "counter", Lifecycle::Singleton);

        let info = container.inspect("counter").unwrap();
        assert!(!info.resolved);
        assert!(info.is_factory);
        assert_eq!(info.lifecycle, Lifecycle::Singleton);

        let original: Arc<Counter> = container.resolve("counter", None).await.unwrap();
        assert!(container.inspect("counter").unwrap().resolved);

        let forked = container.fork();
        let copied: Arc<Counter> = forked.resolve("counter", None).await.unwrap();
        assert!(Arc::ptr_eq(&original, &copied));

        forked.register_value("extra", 1_u8);
        assert!(!container.contains("extra"));
    }

    #[tokio::test]
    async fn test_factory_error_is_handler_error() {
        let container = DependencyContainer::new();
        container.register_factory("broken", || async {
            Err::<u8, _>(anyhow::anyhow!("connection refused"))
        });

        let err = container.resolve_any("broken", None).await.unwrap_err();
        assert!(matches!(err, ConduitError::Handler(_)));
        assert!(!container.inspect("broken").unwrap().resolved);
    }

    #[tokio::test]
    async fn test_type_mismatch() {
        let container = DependencyContainer::new();
        container.register_value("name", String::from("conduit"));
        let err = container.resolve::<u32>("name", None).await.unwrap_err();
        assert!(matches!(err, ConduitError::DependencyType { .. }));
    }

    #[tokio::test]
    async fn test_resolve_many_keeps_requested_keys() {
        let container = DependencyContainer::new();
        container.register_value(["db", "database"], 1_u8);
        container.register_value("cache", 2_u8);

        let deps = container
            .resolve_many(&["database".to_string(), "cache".to_string()], None)
            .await
            .unwrap();
        assert_eq!(deps.keys().collect::<Vec<_>>(), vec!["database", "cache"]);
        assert_eq!(*deps.require::<u8>("database").unwrap(), 1);
    }

    #[test]
    fn test_lifecycle_parse() {
        assert_eq!(Lifecycle::parse("singleton"), Lifecycle::Singleton);
        assert_eq!(Lifecycle::parse("scoped"), Lifecycle::Scoped);
        assert_eq!(Lifecycle::parse("request"), Lifecycle::Transient);
        assert_eq!(Lifecycle::default(), Lifecycle::Singleton);
    }
}
