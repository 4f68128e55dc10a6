//! Core components of the provider registry.
//!
//! This module contains the provider store and its objects, module
//! resolution and loading, parameters, configuration and error handling.

// Provider objects, store and dispatch
pub mod provider;

// Locating and loading provider modules
pub mod module;

// Parameters exchanged with providers
pub mod params;

// Library context owning a store
pub mod context;

// Registry configuration
pub mod config;

// Naming and environment constants
pub mod constants;

// Error handling
pub mod error;

// Re-exports for convenience
pub use self::error::{Error, LoadError, Result};
pub use self::context::LibraryContext;
pub use self::provider::{ProviderHandle, ProviderStatus, ProviderStore};
pub use self::constants::VERSION;
