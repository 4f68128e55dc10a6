/*!
Dynamic module loading.

The registry depends only on the [`ModuleLoader`] trait; [`LibLoader`] is
the platform implementation backed by `libloading`. A [`ModuleHandle`]
keeps its library mapped and unloads it when dropped.
*/

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use crate::core::constants::PROVIDER_ENTRY_SYMBOL;
use crate::core::error::LoadError;
use crate::ffi::abi::ProviderEntryFn;

/// Opens provider modules and locates their entry point
pub trait ModuleLoader: Send + Sync {
    /// Load the module at `path` and resolve its entry point
    fn load(&self, path: &Path) -> Result<ModuleHandle, LoadError>;
}

/// A loaded provider module
///
/// Owned by exactly one provider object. Dropping it unloads the module.
pub struct ModuleHandle {
    path: PathBuf,
    entry: ProviderEntryFn,
    _library: Box<dyn Any + Send + Sync>,
}

impl ModuleHandle {
    /// Wrap a loaded library and its entry point
    ///
    /// # Safety
    /// `entry` must remain callable for as long as `library` is alive.
    pub unsafe fn new<L>(path: PathBuf, entry: ProviderEntryFn, library: L) -> Self
    where
        L: Send + Sync + 'static,
    {
        Self {
            path,
            entry,
            _library: Box::new(library),
        }
    }

    /// Path the module was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The module's provider entry point
    pub fn entry(&self) -> ProviderEntryFn {
        self.entry
    }
}

impl Drop for ModuleHandle {
    fn drop(&mut self) {
        log::debug!("Unloading provider module {}", self.path.display());
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle").field("path", &self.path).finish()
    }
}

/// Loads modules as shared libraries
#[derive(Debug, Default, Clone, Copy)]
pub struct LibLoader;

impl ModuleLoader for LibLoader {
    fn load(&self, path: &Path) -> Result<ModuleHandle, LoadError> {
        // Safety: loading a provider module runs its initializers; the
        // module directory is trusted the same way the library itself is.
        let library = unsafe { Library::new(path) }.map_err(|e| LoadError::ModuleNotFound {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let entry: ProviderEntryFn = unsafe {
            let symbol: Symbol<ProviderEntryFn> = library
                .get(PROVIDER_ENTRY_SYMBOL.as_bytes())
                .map_err(|_| LoadError::SymbolNotFound {
                    path: path.to_path_buf(),
                    symbol: PROVIDER_ENTRY_SYMBOL.to_string(),
                })?;
            *symbol
        };

        log::debug!("Loaded provider module {}", path.display());
        Ok(unsafe { ModuleHandle::new(path.to_path_buf(), entry, library) })
    }
}
