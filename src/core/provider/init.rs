/*!
Provider initialization surface.

An initializer receives a [`CoreHandle`] through which it reads its own
parameters, and returns the context and dispatch table the registry caches
for the rest of the provider's lifetime.
*/

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::core::constants::{core_params, VERSION};
use crate::core::params::{locate, ParamValue, Param};
use crate::core::provider::dispatch::{DispatchTable, ProviderContext};
use crate::core::provider::store::ProviderStore;

/// What a successful initializer hands back
#[derive(Debug)]
pub struct ProviderInit {
    /// Provider-owned state, threaded back into every capability call
    pub context: ProviderContext,
    /// Capabilities the provider implements
    pub dispatch: DispatchTable,
}

impl ProviderInit {
    pub fn new(context: ProviderContext, dispatch: DispatchTable) -> Self {
        Self { context, dispatch }
    }
}

type InitCallback = dyn Fn(&CoreHandle<'_>) -> Option<ProviderInit> + Send + Sync;

/// Initializer of a built-in provider
///
/// Returning `None` reports initialization failure.
#[derive(Clone)]
pub struct ProviderInitFn(Arc<InitCallback>);

impl ProviderInitFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&CoreHandle<'_>) -> Option<ProviderInit> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub(crate) fn call(&self, core: &CoreHandle<'_>) -> Option<ProviderInit> {
        (self.0)(core)
    }
}

impl fmt::Debug for ProviderInitFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProviderInitFn")
    }
}

/// Core services offered to a provider while it initializes
pub struct CoreHandle<'a> {
    name: &'a str,
    module_path: Option<&'a Path>,
    parameters: &'a [(String, String)],
    store: &'a ProviderStore,
}

impl<'a> CoreHandle<'a> {
    pub(crate) fn new(
        name: &'a str,
        module_path: Option<&'a Path>,
        parameters: &'a [(String, String)],
        store: &'a ProviderStore,
    ) -> Self {
        Self {
            name,
            module_path,
            parameters,
            store,
        }
    }

    /// Name the provider is registered under
    pub fn provider_name(&self) -> &str {
        self.name
    }

    /// Module the provider was loaded from, if any
    pub fn module_path(&self) -> Option<&Path> {
        self.module_path
    }

    /// Value of a parameter added with `add_parameter`
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// All parameters added with `add_parameter`, in insertion order
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parameters.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Answer parameter requests from the core parameter set
    ///
    /// Unknown keys are left unset.
    pub fn get_params(&self, params: &mut [Param]) -> bool {
        if let Some(p) = locate(params, core_params::PROVIDER_NAME) {
            p.value = ParamValue::Utf8String(self.name.to_string());
        }
        if let Some(p) = locate(params, core_params::LIBRARY_VERSION) {
            p.value = ParamValue::Utf8String(VERSION.to_string());
        }
        if let Some(path) = self.module_path {
            if let Some(p) = locate(params, core_params::MODULE_FILENAME) {
                p.value = ParamValue::Utf8String(path.display().to_string());
            }
        }
        for (key, value) in self.parameters {
            if let Some(p) = locate(params, key) {
                p.value = ParamValue::Utf8String(value.clone());
            }
        }
        true
    }

    /// Store of the library context the provider is being loaded into
    ///
    /// Activating the provider currently being initialized, or iterating the
    /// loaded providers, from here blocks.
    pub fn store(&self) -> &ProviderStore {
        self.store
    }
}
