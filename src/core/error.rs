/*!
Error handling for the provider registry.

Lookup, creation and activation report failure to the immediate caller
through [`Result`]. A capability a provider does not implement is not an
error: the dispatch layer answers `None` or `false` for it.
*/

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for the provider registry
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the provider registry
#[derive(Error, Debug)]
pub enum Error {
    /// No provider is registered under this name
    #[error("Provider not found: {0}")]
    NotFound(String),

    /// An explicit module path was already recorded for the provider
    #[error("Module path already set for provider {0}")]
    ModulePathAlreadySet(String),

    /// The provider was activated before the change was requested
    #[error("Provider {0} is already activated")]
    AlreadyActivated(String),

    /// The provider module could not be loaded
    #[error("Module load failed: {0}")]
    Load(#[from] LoadError),

    /// The provider's own initializer reported failure
    #[error("Provider initialization failed: {0}")]
    InitFailed(String),

    /// The handle refers to a provider whose last reference was released
    #[error("Provider {0} has been destroyed")]
    Destroyed(String),

    /// Allocation failed while registering a provider
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
}

/// Module loading errors
#[derive(Error, Debug)]
pub enum LoadError {
    /// The shared object could not be opened
    #[error("module not found at {}: {reason}", path.display())]
    ModuleNotFound {
        path: PathBuf,
        reason: String,
    },

    /// The shared object does not export the provider entry point
    #[error("symbol {symbol} not found in {}", path.display())]
    SymbolNotFound {
        path: PathBuf,
        symbol: String,
    },
}

impl Error {
    /// Whether the error came from a module that could not be opened
    pub fn is_module_not_found(&self) -> bool {
        matches!(self, Error::Load(LoadError::ModuleNotFound { .. }))
    }

    /// Whether the error came from a module missing its entry point
    pub fn is_symbol_not_found(&self) -> bool {
        matches!(self, Error::Load(LoadError::SymbolNotFound { .. }))
    }
}

/// Create an initializer failure error for a provider
#[macro_export]
macro_rules! init_err {
    ($name:expr) => {
        Err($crate::core::error::Error::InitFailed($name.to_string()))
    };
    ($fmt:expr, $($arg:tt)*) => {
        Err($crate::core::error::Error::InitFailed(format!($fmt, $($arg)*)))
    };
}

/// Convert from Error to io::Error (for compatibility)
impl From<Error> for io::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::NotFound(name) => io::Error::new(io::ErrorKind::NotFound, name),
            Error::ModulePathAlreadySet(name) => io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("Module path already set for provider {}", name),
            ),
            Error::AlreadyActivated(name) => io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("Provider {} is already activated", name),
            ),
            Error::Load(LoadError::ModuleNotFound { path, reason }) => io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}: {}", path.display(), reason),
            ),
            Error::Load(err @ LoadError::SymbolNotFound { .. }) => {
                io::Error::new(io::ErrorKind::InvalidData, err.to_string())
            }
            Error::InitFailed(msg) => io::Error::new(io::ErrorKind::Other, msg),
            Error::Destroyed(name) => io::Error::new(io::ErrorKind::NotConnected, name),
            Error::ResourceExhausted(msg) => io::Error::new(io::ErrorKind::OutOfMemory, msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("alpha".to_string());
        assert_eq!(format!("{}", err), "Provider not found: alpha");

        let err = Error::ModulePathAlreadySet("alpha".to_string());
        assert_eq!(format!("{}", err), "Module path already set for provider alpha");

        let err = Error::from(LoadError::SymbolNotFound {
            path: PathBuf::from("/opt/alpha.so"),
            symbol: "pqc_provider_init".to_string(),
        });
        assert_eq!(
            format!("{}", err),
            "Module load failed: symbol pqc_provider_init not found in /opt/alpha.so"
        );
    }

    #[test]
    fn test_load_error_predicates() {
        let err = Error::from(LoadError::ModuleNotFound {
            path: PathBuf::from("/bad/path"),
            reason: "no such file".to_string(),
        });
        assert!(err.is_module_not_found());
        assert!(!err.is_symbol_not_found());
    }

    #[test]
    fn test_init_err_macro() {
        fn fails() -> Result<()> {
            init_err!("provider {} refused", "beta")
        }

        match fails() {
            Err(Error::InitFailed(msg)) => assert_eq!(msg, "provider beta refused"),
            other => panic!("Expected InitFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let err = Error::NotFound("gamma".to_string());
        let io_err = io::Error::from(err);

        assert_eq!(io_err.kind(), io::ErrorKind::NotFound);
        assert!(format!("{}", io_err).contains("gamma"));
    }
}
