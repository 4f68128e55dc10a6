/*!
Per-library-context provider store.

The store owns the canonical [`ProviderObject`] for every registered name
and hands out counted [`ProviderHandle`]s. Creation, lookup and the final
release all go through the map lock, so they are linearizable with each
other; the reference count itself is atomic and reports threshold
crossings to exactly one releasing thread.
*/

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::core::config::RegistryConfig;
use crate::core::constants::INITIAL_REFERENCES;
use crate::core::error::{Error, Result};
use crate::core::module::{resolver, LibLoader, ModuleLoader};
use crate::core::params::{Param, ParamDescriptor};
use crate::core::provider::dispatch::{AlgorithmTable, OperationId};
use crate::core::provider::dispatcher;
use crate::core::provider::fallback;
use crate::core::provider::init::ProviderInitFn;
use crate::core::provider::object::{InitSource, ProviderObject, ProviderStatus};
use crate::core::provider::refcount::Crossing;

/// A counted reference to a registered provider
///
/// Obtained from [`ProviderStore::find`] or [`ProviderStore::new_or_get`]
/// and given back with [`ProviderStore::release`]. Handles passed to
/// iteration callbacks are borrowed and carry no reference of their own.
pub struct ProviderHandle {
    object: Arc<ProviderObject>,
}

impl ProviderHandle {
    fn new(object: Arc<ProviderObject>) -> Self {
        Self { object }
    }

    pub(crate) fn object(&self) -> &ProviderObject {
        &self.object
    }

    pub fn name(&self) -> &str {
        self.object.name()
    }

    pub fn status(&self) -> ProviderStatus {
        self.object.status()
    }

    pub fn is_activated(&self) -> bool {
        self.status() == ProviderStatus::Activated
    }

    pub fn activation_count(&self) -> usize {
        self.object.activation_count()
    }

    /// Current reference count, including the store's own slot
    pub fn ref_count(&self) -> usize {
        self.object.refcount().get()
    }

    pub fn is_fallback(&self) -> bool {
        self.object.is_fallback()
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self.object.init_source(), InitSource::Builtin(_))
    }

    /// Explicit module path, if one was set
    pub fn module_path(&self) -> Option<PathBuf> {
        self.object.module_path()
    }

    /// Path of the module currently loaded for this provider
    pub fn loaded_module(&self) -> Option<PathBuf> {
        self.object.loaded_module()
    }

    /// Mark the provider for automatic activation when nothing else is active
    pub fn set_fallback(&self) {
        self.object.set_fallback();
    }

    /// Record an explicit module path
    ///
    /// Fails if a path was already recorded or the provider is activated.
    pub fn set_module_path(&self, path: impl AsRef<Path>) -> Result<()> {
        self.object.set_module_path(path.as_ref())
    }

    /// Append a parameter for the provider's initializer
    pub fn add_parameter(&self, name: &str, value: &str) {
        self.object.add_parameter(name, value);
    }

    pub fn get_param_types(&self) -> Option<Vec<ParamDescriptor>> {
        dispatcher::get_param_types(self)
    }

    pub fn get_params(&self, params: &mut [Param]) -> bool {
        dispatcher::get_params(self, params)
    }

    pub fn query_operation(&self, operation_id: OperationId, no_cache: &mut bool) -> Option<AlgorithmTable> {
        dispatcher::query_operation(self, operation_id, no_cache)
    }

    /// Whether both handles refer to the same provider object
    pub fn same_provider(&self, other: &ProviderHandle) -> bool {
        Arc::ptr_eq(&self.object, &other.object)
    }
}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProviderHandle").field(&self.object).finish()
    }
}

/// Registry of the providers of one library context
pub struct ProviderStore {
    config: RegistryConfig,
    search_path: RwLock<Option<PathBuf>>,
    loader: Arc<dyn ModuleLoader>,
    providers: Mutex<HashMap<String, Arc<ProviderObject>>>,
    builtins: Mutex<HashMap<String, ProviderInitFn>>,
    fallback_guard: Mutex<()>,
    use_fallbacks: AtomicBool,
}

impl ProviderStore {
    /// Create a store loading modules as shared libraries
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_loader(config, Arc::new(LibLoader))
    }

    /// Create a store using a custom module loader
    pub fn with_loader(config: RegistryConfig, loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            config,
            search_path: RwLock::new(None),
            loader,
            providers: Mutex::new(HashMap::new()),
            builtins: Mutex::new(HashMap::new()),
            fallback_guard: Mutex::new(()),
            use_fallbacks: AtomicBool::new(true),
        }
    }

    fn lock_providers(&self) -> MutexGuard<'_, HashMap<String, Arc<ProviderObject>>> {
        self.providers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_builtins(&self) -> MutexGuard<'_, HashMap<String, ProviderInitFn>> {
        self.builtins.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub(crate) fn loader(&self) -> &dyn ModuleLoader {
        self.loader.as_ref()
    }

    pub(crate) fn fallback_guard(&self) -> MutexGuard<'_, ()> {
        self.fallback_guard.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop activating fallback providers automatically
    ///
    /// Permanent for the store. Set by loading a provider without retaining
    /// fallbacks.
    pub fn disable_fallbacks(&self) {
        if self.use_fallbacks.swap(false, Ordering::AcqRel) {
            log::debug!("Fallback providers disabled");
        }
    }

    /// Whether fallback providers are still activated automatically
    pub fn fallbacks_enabled(&self) -> bool {
        self.use_fallbacks.load(Ordering::Acquire)
    }

    /// Replace the built-in module directory for this store
    ///
    /// The environment override still takes precedence. `None` restores
    /// the configured default.
    pub fn set_default_search_path(&self, path: Option<PathBuf>) {
        *self.search_path.write().unwrap_or_else(PoisonError::into_inner) = path;
    }

    /// Where the module for `name` would be loaded from
    pub fn resolve_module_path(&self, name: &str, explicit: Option<&Path>) -> PathBuf {
        let env_dir = self.config.env_module_dir();
        let search_path = self.search_path.read().unwrap_or_else(PoisonError::into_inner);
        let builtin_dir = search_path
            .as_deref()
            .unwrap_or(self.config.default_module_dir.as_path());
        resolver::resolve_module_path(name, explicit, env_dir.as_deref(), builtin_dir)
    }

    /// Record a built-in initializer under `name`
    ///
    /// Later `new_or_get(name, None)` calls use it instead of loading a
    /// module. A fallback built-in is registered right away, held only by
    /// the store.
    pub fn add_builtin(&self, name: &str, init: ProviderInitFn, fallback: bool) -> Result<()> {
        self.lock_builtins().insert(name.to_string(), init.clone());
        log::debug!("Added built-in provider {}", name);

        if fallback {
            let handle = self.new_or_get(name, Some(init))?;
            handle.set_fallback();
            self.release(&handle);
        }
        Ok(())
    }

    /// Look up a provider, taking a reference on success
    pub fn find(&self, name: &str) -> Option<ProviderHandle> {
        let providers = self.lock_providers();
        let object = providers.get(name)?;
        object.refcount().try_upref()?;
        Some(ProviderHandle::new(Arc::clone(object)))
    }

    /// Look up a provider, registering it if absent
    ///
    /// An existing provider is returned with one more reference and `init`
    /// is ignored. A new one starts with two references, the store's slot
    /// and the returned handle. Without `init`, a built-in recorded with
    /// [`add_builtin`](Self::add_builtin) is used, and otherwise the
    /// provider is loaded from a module on activation.
    pub fn new_or_get(&self, name: &str, init: Option<ProviderInitFn>) -> Result<ProviderHandle> {
        let init = init.or_else(|| self.lock_builtins().get(name).cloned());

        let mut providers = self.lock_providers();
        if let Some(object) = providers.get(name) {
            if object.refcount().try_upref().is_some() {
                return Ok(ProviderHandle::new(Arc::clone(object)));
            }
            // Last reference already dropped; the dying object is replaced
        }

        providers
            .try_reserve(1)
            .map_err(|e| Error::ResourceExhausted(format!("registering provider {}: {}", name, e)))?;

        let source = match init {
            Some(init) => InitSource::Builtin(init),
            None => InitSource::Module,
        };
        let object = Arc::new(ProviderObject::new(name, source, INITIAL_REFERENCES));
        providers.insert(name.to_string(), Arc::clone(&object));
        log::debug!("Registered provider {}", name);

        Ok(ProviderHandle::new(object))
    }

    /// Take another reference, returning the new count
    ///
    /// Returns 0 for a provider that has already been destroyed.
    pub fn upref(&self, handle: &ProviderHandle) -> usize {
        handle.object.refcount().try_upref().unwrap_or(0)
    }

    /// Give back one reference, returning the remaining count
    ///
    /// Falling below two references tears the provider down; reaching zero
    /// removes it from the store and unloads its module.
    pub fn release(&self, handle: &ProviderHandle) -> usize {
        let object = &handle.object;
        let (remaining, crossing) = object.refcount().release();

        match crossing {
            Crossing::None => {}
            Crossing::FellOutOfUse => {
                object.deactivate();
            }
            Crossing::ReachedZero => {
                {
                    let mut providers = self.lock_providers();
                    let registered = providers
                        .get(object.name())
                        .is_some_and(|current| Arc::ptr_eq(current, object));
                    if registered {
                        providers.remove(object.name());
                    }
                }
                object.destroy();
            }
        }
        remaining
    }

    /// Activate a provider, running its initializer on first use
    pub fn activate(&self, handle: &ProviderHandle) -> Result<()> {
        match handle.object.activate(self) {
            Ok(count) => {
                log::debug!("Provider {} activation count {}", handle.name(), count);
                Ok(())
            }
            Err(e) => {
                log::warn!("Failed to activate provider {}: {}", handle.name(), e);
                Err(e)
            }
        }
    }

    /// Call `callback` for every activated provider
    ///
    /// When nothing is activated, the fallback providers are activated and
    /// the scan is repeated once. Each provider holds an extra reference
    /// while its callback runs, so a concurrent release cannot tear it down
    /// underneath the callback. Iteration stops when the callback returns
    /// `false`; the return value says whether every callback was run.
    pub fn forall_loaded<F>(&self, mut callback: F) -> bool
    where
        F: FnMut(&ProviderHandle) -> bool,
    {
        let mut active = self.activated();
        if active.is_empty() {
            let count = fallback::activate_fallbacks(self);
            log::debug!("No active providers, activated {} fallback providers", count);
            active = self.activated();
        }

        for handle in &active {
            if self.upref(handle) == 0 {
                continue;
            }
            // Torn down between the scan and the pin
            if !handle.is_activated() {
                self.release(handle);
                continue;
            }
            let keep_going = callback(handle);
            self.release(handle);
            if !keep_going {
                return false;
            }
        }
        true
    }

    /// Whether any provider is currently activated
    pub fn has_active(&self) -> bool {
        self.snapshot().iter().any(|h| h.is_activated())
    }

    /// Names of all registered providers, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock_providers().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.lock_providers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_providers().is_empty()
    }

    /// Uncounted handles to every live provider
    ///
    /// Object state is inspected after the map lock is dropped, since an
    /// initializer holding an object lock may call back into the store.
    /// Callers pin a handle with `upref` before handing it out.
    pub(crate) fn snapshot(&self) -> Vec<ProviderHandle> {
        let mut handles: Vec<ProviderHandle> = self
            .lock_providers()
            .values()
            .filter(|object| object.refcount().get() > 0)
            .map(|object| ProviderHandle::new(Arc::clone(object)))
            .collect();
        handles.sort_by(|a, b| a.name().cmp(b.name()));
        handles
    }

    fn activated(&self) -> Vec<ProviderHandle> {
        self.snapshot()
            .into_iter()
            .filter(|h| h.activation_count() > 0)
            .collect()
    }
}

impl Drop for ProviderStore {
    fn drop(&mut self) {
        let providers: Vec<Arc<ProviderObject>> = self
            .providers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, object)| object)
            .collect();

        if !providers.is_empty() {
            log::debug!("Tearing down provider store with {} providers", providers.len());
        }
        for object in providers {
            object.destroy();
        }
    }
}

impl fmt::Debug for ProviderStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderStore")
            .field("config", &self.config)
            .field("providers", &self.names())
            .finish()
    }
}
