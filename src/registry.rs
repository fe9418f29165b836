//! Name and arity keyed function registries.
use std::fmt;
use std::sync::Arc;

use hashlink::LinkedHashMap;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::config::{DuplicatePolicy, RegistryConfig};
use crate::functions::{Arity, Context, FunctionFlags, ScalarFunction, SqlFnOutput};
use crate::types::{ToSqlOutput, ValueRef};
use crate::{Connection, Error, Result};

/// Registry key: a function name, folded to ASCII lowercase, and its arity.
///
/// SQLite compares function names case-insensitively, and so does the
/// registry: `FunctionKey::new("YO", a) == FunctionKey::new("yo", a)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionKey {
    name: String,
    arity: Arity,
}

impl FunctionKey {
    /// Build a key for `name` and `arity`.
    #[must_use]
    pub fn new(name: &str, arity: Arity) -> FunctionKey {
        FunctionKey {
            name: name.to_ascii_lowercase(),
            arity,
        }
    }

    /// Normalized (lowercase) name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arity part of the key.
    #[inline]
    #[must_use]
    pub fn arity(&self) -> Arity {
        self.arity
    }
}

impl fmt::Display for FunctionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.arity {
            Arity::Exact(n) => write!(f, "{}/{n}", self.name),
            Arity::Variadic => write!(f, "{}/*", self.name),
        }
    }
}

/// A set of scalar functions keyed by `(name, arity)`.
///
/// Mutation needs `&mut self`; for a registry shared between threads use
/// [`SharedRegistry`]. Iteration follows registration order.
pub struct FunctionRegistry {
    functions: LinkedHashMap<FunctionKey, Arc<ScalarFunction>>,
    config: RegistryConfig,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        FunctionRegistry::new()
    }
}

impl FunctionRegistry {
    /// An empty registry with the default configuration.
    #[must_use]
    pub fn new() -> FunctionRegistry {
        FunctionRegistry::with_config(RegistryConfig::default())
    }

    /// An empty registry with `config`.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> FunctionRegistry {
        FunctionRegistry {
            functions: LinkedHashMap::new(),
            config,
        }
    }

    /// Configuration this registry was built with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register `f` under `(name, arity)`.
    ///
    /// Returns the descriptor it replaced, if the duplicate policy is
    /// [`DuplicatePolicy::Replace`] and one existed.
    ///
    /// # Failure
    ///
    /// Will return Err if the name or arity is invalid, or if the pair is
    /// already registered and the duplicate policy is
    /// [`DuplicatePolicy::Reject`].
    pub fn register<F, T>(
        &mut self,
        name: &str,
        arity: Arity,
        flags: FunctionFlags,
        f: F,
    ) -> Result<Option<Arc<ScalarFunction>>>
    where
        F: Fn(&Context<'_>) -> Result<T> + Send + Sync + 'static,
        T: SqlFnOutput,
    {
        self.register_function(ScalarFunction::new(name, arity, flags, f)?)
    }

    /// Register a prebuilt descriptor. See [`register`](FunctionRegistry::register).
    ///
    /// # Failure
    ///
    /// Will return Err if the pair is already registered and the duplicate
    /// policy is [`DuplicatePolicy::Reject`].
    pub fn register_function(
        &mut self,
        function: ScalarFunction,
    ) -> Result<Option<Arc<ScalarFunction>>> {
        let key = function.key();
        if self.functions.contains_key(&key) {
            match self.config.duplicate_policy() {
                DuplicatePolicy::Reject => {
                    debug!(%key, "rejected duplicate registration");
                    return Err(Error::DuplicateRegistration(
                        function.name().to_owned(),
                        function.arity(),
                    ));
                }
                DuplicatePolicy::Replace => {
                    debug!(%key, "replacing registered function");
                    // replace keeps the original slot in registration order
                    return Ok(self.functions.replace(key, Arc::new(function)));
                }
            }
        }
        debug!(%key, deterministic = function.is_deterministic(), "registered function");
        self.functions.insert(key, Arc::new(function));
        Ok(None)
    }

    /// Remove the binding for `(name, arity)` and return it.
    ///
    /// Removing a binding that does not exist is a no-op returning `None`.
    /// Connections the function was bound to keep their own reference.
    pub fn unregister(&mut self, name: &str, arity: Arity) -> Option<Arc<ScalarFunction>> {
        let key = FunctionKey::new(name, arity);
        let removed = self.functions.remove(&key);
        if removed.is_some() {
            debug!(%key, "unregistered function");
        } else {
            trace!(%key, "unregister of absent function");
        }
        removed
    }

    /// Find the function a call to `name` with `n_args` arguments resolves
    /// to: the exact arity first, then the variadic variant.
    ///
    /// # Failure
    ///
    /// Will return [`Error::UnknownFunction`] if no function has this name,
    /// and [`Error::ArityMismatch`] if the name exists for other arities
    /// only.
    pub fn lookup(&self, name: &str, n_args: usize) -> Result<Arc<ScalarFunction>> {
        if let Ok(n) = u8::try_from(n_args) {
            if let Some(f) = self.functions.get(&FunctionKey::new(name, Arity::Exact(n))) {
                trace!(function = name, n_args, "exact arity hit");
                return Ok(Arc::clone(f));
            }
        }
        if let Some(f) = self.functions.get(&FunctionKey::new(name, Arity::Variadic)) {
            trace!(function = name, n_args, "variadic hit");
            return Ok(Arc::clone(f));
        }
        trace!(function = name, n_args, "lookup miss");
        if self
            .functions
            .keys()
            .any(|k| k.name.eq_ignore_ascii_case(name))
        {
            Err(Error::ArityMismatch {
                name: name.to_owned(),
                given: n_args,
            })
        } else {
            Err(Error::UnknownFunction(name.to_owned()))
        }
    }

    /// Call the function `name` resolves to with `args`.
    ///
    /// The output never borrows from the callable: transient results have
    /// been copied, static ones are returned without copying.
    ///
    /// # Failure
    ///
    /// Lookup errors as in [`lookup`](FunctionRegistry::lookup), and
    /// whatever error the function itself raises.
    pub fn invoke(&self, name: &str, args: &[ValueRef<'_>]) -> Result<ToSqlOutput<'static>> {
        self.lookup(name, args.len())?.call(args)
    }

    /// Whether `(name, arity)` is registered.
    #[must_use]
    pub fn contains(&self, name: &str, arity: Arity) -> bool {
        self.functions.contains_key(&FunctionKey::new(name, arity))
    }

    /// Number of registered functions.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether the registry is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Registered functions, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ScalarFunction>> {
        self.functions.values()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}

/// A [`FunctionRegistry`] that can be shared between threads.
///
/// Registration takes a write lock. Invocation holds the read lock only long
/// enough to resolve the function, which then runs unlocked.
#[derive(Clone, Default)]
pub struct SharedRegistry {
    inner: Arc<RwLock<FunctionRegistry>>,
}

impl SharedRegistry {
    /// An empty shared registry with the default configuration.
    #[must_use]
    pub fn new() -> SharedRegistry {
        SharedRegistry::default()
    }

    /// An empty shared registry with `config`.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> SharedRegistry {
        SharedRegistry {
            inner: Arc::new(RwLock::new(FunctionRegistry::with_config(config))),
        }
    }

    /// See [`FunctionRegistry::register`].
    ///
    /// # Failure
    ///
    /// As [`FunctionRegistry::register`].
    pub fn register<F, T>(
        &self,
        name: &str,
        arity: Arity,
        flags: FunctionFlags,
        f: F,
    ) -> Result<Option<Arc<ScalarFunction>>>
    where
        F: Fn(&Context<'_>) -> Result<T> + Send + Sync + 'static,
        T: SqlFnOutput,
    {
        // build outside the lock
        let function = ScalarFunction::new(name, arity, flags, f)?;
        self.inner.write().register_function(function)
    }

    /// See [`FunctionRegistry::unregister`].
    pub fn unregister(&self, name: &str, arity: Arity) -> Option<Arc<ScalarFunction>> {
        self.inner.write().unregister(name, arity)
    }

    /// See [`FunctionRegistry::lookup`].
    ///
    /// # Failure
    ///
    /// As [`FunctionRegistry::lookup`].
    pub fn lookup(&self, name: &str, n_args: usize) -> Result<Arc<ScalarFunction>> {
        self.inner.read().lookup(name, n_args)
    }

    /// See [`FunctionRegistry::invoke`].
    ///
    /// # Failure
    ///
    /// As [`FunctionRegistry::invoke`].
    pub fn invoke(&self, name: &str, args: &[ValueRef<'_>]) -> Result<ToSqlOutput<'static>> {
        let function = self.lookup(name, args.len())?;
        function.call(args)
    }

    /// Whether `(name, arity)` is registered.
    #[must_use]
    pub fn contains(&self, name: &str, arity: Arity) -> bool {
        self.inner.read().contains(name, arity)
    }

    /// Number of registered functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// The currently registered functions, in registration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<ScalarFunction>> {
        self.inner.read().iter().cloned().collect()
    }

    /// Bind a snapshot of the registry onto `db`.
    ///
    /// Later registrations are not seen by `db` until `bind` runs again.
    ///
    /// # Failure
    ///
    /// Will return Err on the first function SQLite refuses.
    pub fn bind(&self, db: &Connection) -> Result<()> {
        for function in self.snapshot() {
            db.bind_function(&function)?;
        }
        Ok(())
    }
}

impl fmt::Debug for SharedRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedRegistry").field(&*self.inner.read()).finish()
    }
}

impl Connection {
    /// Bind every function of `registry` onto this connection, in
    /// registration order.
    ///
    /// The connection keeps its own reference to each descriptor, so
    /// unregistering from `registry` afterwards does not affect it.
    ///
    /// # Failure
    ///
    /// Will return Err on the first function SQLite refuses.
    pub fn bind_registry(&self, registry: &FunctionRegistry) -> Result<()> {
        for function in registry.iter() {
            self.bind_function(function)?;
        }
        Ok(())
    }
}
