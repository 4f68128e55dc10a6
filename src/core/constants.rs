/*!
Constants for the provider registry.

This module contains the environment and naming conventions every
provider module has to honor.
*/

/// Library version reported to providers through the core parameters
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable overriding the module search directory
pub const MODULES_ENV: &str = "PQC_MODULES";

/// Built-in module directory, fixed at compile time
pub const DEFAULT_MODULES_DIR: &str = match option_env!("PQC_MODULES_DIR") {
    Some(dir) => dir,
    None => "/usr/local/lib/pqc-modules",
};

/// Entry point every loadable provider module exports
pub const PROVIDER_ENTRY_SYMBOL: &str = "pqc_provider_init";

/// Reference count of a freshly registered provider: the store's slot plus the caller
pub const INITIAL_REFERENCES: usize = 2;

/// Names of the parameters the core hands to every provider
pub mod core_params {
    /// Name the provider was registered under
    pub const PROVIDER_NAME: &str = "provider-name";

    /// Path of the loaded module (module providers only)
    pub const MODULE_FILENAME: &str = "module-filename";

    /// Version of this library
    pub const LIBRARY_VERSION: &str = "library-version";
}
