/*!
# PQC Provider

Provider registry for the PQC protocol library: a per-context store of
named providers that supply post-quantum algorithm implementations.

## Overview

This library manages the lifetime of providers:

- Registration by name, built in or loaded from a shared module
- Two-tier reference counting that tears providers down when they fall
  out of use and destroys them when the last reference goes
- Exactly-once initialization under concurrent activation
- Fallback providers activated automatically when nothing else is active
- Capability-checked dispatch of parameter and operation queries
- A C ABI for providers shipped as loadable modules

## Example

```no_run
use pqc_provider::{LibraryContext, api};

let ctx = LibraryContext::new();
let provider = api::load_provider(&ctx, "default")?;

let mut no_cache = false;
let kems = provider.query_operation(pqc_provider::OperationId::KEM, &mut no_cache);
println!("{} KEM algorithms", kems.map_or(0, |t| t.len()));

api::unload_provider(&ctx, provider);
# Ok::<(), pqc_provider::Error>(())
```
*/

// Core registry components
pub mod core;

// High-level API
pub mod api;

// Foreign module ABI
pub mod ffi;

// Re-export commonly used types for convenience
pub use self::core::error::{Error, LoadError, Result};
pub use self::core::constants::VERSION;
pub use self::core::config::{ProviderConfig, RegistryConfig};
pub use self::core::context::LibraryContext;
pub use self::core::module::{LibLoader, ModuleHandle, ModuleLoader};
pub use self::core::params::{Param, ParamDescriptor, ParamType, ParamValue};
pub use self::core::provider::{
    AlgorithmDescriptor, AlgorithmTable, CoreHandle, DispatchTable, ImplementationRef, OperationId,
    ProviderContext, ProviderHandle, ProviderInit, ProviderInitFn, ProviderStatus, ProviderStore,
};
