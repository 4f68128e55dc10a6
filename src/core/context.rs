/*!
Library context owning a provider store.

The store is created lazily on first use and dropped with the context,
which tears down and unloads every provider still registered.
*/

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::core::config::{ProviderConfig, RegistryConfig};
use crate::core::error::Result;
use crate::core::module::{LibLoader, ModuleLoader};
use crate::core::provider::{ProviderHandle, ProviderStore};

/// Independent scope of providers
pub struct LibraryContext {
    config: RegistryConfig,
    loader: Arc<dyn ModuleLoader>,
    store: OnceCell<ProviderStore>,
}

impl LibraryContext {
    /// Create a context with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a context with the given module search configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self::with_loader(config, Arc::new(LibLoader))
    }

    /// Create a context loading modules through `loader`
    pub fn with_loader(config: RegistryConfig, loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            config,
            loader,
            store: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// The context's provider store, created on first access
    pub fn store(&self) -> &ProviderStore {
        self.store.get_or_init(|| {
            log::debug!("Creating provider store");
            ProviderStore::with_loader(self.config.clone(), Arc::clone(&self.loader))
        })
    }

    /// Whether the store has been created yet
    pub fn has_store(&self) -> bool {
        self.store.get().is_some()
    }

    /// Register providers from declarative configuration
    ///
    /// Providers marked `activate` stay activated and keep the reference
    /// taken here; the others are only registered. Stops at the first
    /// failure.
    pub fn configure(&self, providers: &[ProviderConfig]) -> Result<()> {
        let store = self.store();

        for config in providers {
            let handle = store.new_or_get(&config.name, None)?;

            match apply(store, &handle, config) {
                Ok(()) if config.activate => {
                    log::info!("Configured and activated provider {}", config.name);
                }
                Ok(()) => {
                    store.release(&handle);
                    log::info!("Configured provider {}", config.name);
                }
                Err(e) => {
                    store.release(&handle);
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

fn apply(store: &ProviderStore, handle: &ProviderHandle, config: &ProviderConfig) -> Result<()> {
    if let Some(module) = &config.module {
        handle.set_module_path(module)?;
    }
    for (name, value) in &config.parameters {
        handle.add_parameter(name, value);
    }
    if config.fallback {
        handle.set_fallback();
    }
    if config.activate {
        store.activate(handle)?;
    }
    Ok(())
}

impl Default for LibraryContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LibraryContext {
    fn drop(&mut self) {
        if let Some(store) = self.store.take() {
            log::debug!("Freeing library context with {} providers", store.len());
        }
    }
}

impl fmt::Debug for LibraryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryContext")
            .field("config", &self.config)
            .field("store", &self.store.get())
            .finish()
    }
}
