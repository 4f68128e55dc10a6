/*!
C ABI spoken by loadable provider modules.

A module exports one entry point, `pqc_provider_init`, matching
[`ProviderEntryFn`]. The core hands it a table of upcalls and receives a
dispatch table of nullable function pointers plus an opaque context.
*/

pub mod abi;

pub use abi::{
    FfiAlgorithm, FfiCoreDispatch, FfiDispatchTable, FfiParamDescriptor, ProviderEntryFn,
};
