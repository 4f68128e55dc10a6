/*!
Provider objects, their store and capability dispatch.
*/

pub mod dispatch;
pub mod dispatcher;
pub(crate) mod fallback;
pub mod init;
pub mod object;
pub mod refcount;
pub mod store;

pub use dispatch::{
    AlgorithmDescriptor, AlgorithmTable, DispatchTable, ImplementationRef, OperationId, ProviderContext,
};
pub use init::{CoreHandle, ProviderInit, ProviderInitFn};
pub use object::{InitSource, ProviderObject, ProviderStatus};
pub use refcount::{Crossing, RefCount};
pub use store::{ProviderHandle, ProviderStore};
