/*!
Dispatch tables and the opaque values that flow through them.

A provider answers capability calls through a [`DispatchTable`] whose
slots are independently optional. The registry threads the provider's own
[`ProviderContext`] back into every call without ever looking inside it.
*/

use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;

use crate::core::params::{Param, ParamDescriptor};

/// Opaque provider context returned by a provider's initializer
///
/// The registry never dereferences the pointer; only the provider that
/// produced it gives it meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderContext(*mut c_void);

// Safety: the registry only stores and hands back the pointer. Providers
// that share their context between threads are responsible for its contents.
unsafe impl Send for ProviderContext {}
unsafe impl Sync for ProviderContext {}

impl ProviderContext {
    /// A context carrying no provider state
    pub const fn null() -> Self {
        Self(std::ptr::null_mut())
    }

    pub fn from_raw(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// Move provider state into a context
    pub fn from_box<T>(state: Box<T>) -> Self {
        Self(Box::into_raw(state) as *mut c_void)
    }

    /// Borrow the provider state behind the context
    ///
    /// # Safety
    /// The context must have been created by [`ProviderContext::from_box`]
    /// with the same `T`, and not yet reclaimed with `into_box`.
    pub unsafe fn as_ref<'a, T>(&self) -> &'a T {
        unsafe { &*(self.0 as *const T) }
    }

    /// Take the provider state back out of the context
    ///
    /// # Safety
    /// Same as [`ProviderContext::as_ref`]; the context must not be used again.
    pub unsafe fn into_box<T>(self) -> Box<T> {
        unsafe { Box::from_raw(self.0 as *mut T) }
    }
}

/// Category of algorithms a provider is asked to supply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(pub i32);

impl OperationId {
    pub const DIGEST: OperationId = OperationId(1);
    pub const CIPHER: OperationId = OperationId(2);
    pub const MAC: OperationId = OperationId(3);
    pub const KDF: OperationId = OperationId(4);
    pub const RAND: OperationId = OperationId(5);
    pub const KEYMGMT: OperationId = OperationId(10);
    pub const KEYEXCH: OperationId = OperationId(11);
    pub const SIGNATURE: OperationId = OperationId(12);
    pub const ASYM_CIPHER: OperationId = OperationId(13);
    pub const KEM: OperationId = OperationId(14);
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            OperationId::DIGEST => write!(f, "digest"),
            OperationId::CIPHER => write!(f, "cipher"),
            OperationId::MAC => write!(f, "mac"),
            OperationId::KDF => write!(f, "kdf"),
            OperationId::RAND => write!(f, "rand"),
            OperationId::KEYMGMT => write!(f, "keymgmt"),
            OperationId::KEYEXCH => write!(f, "keyexch"),
            OperationId::SIGNATURE => write!(f, "signature"),
            OperationId::ASYM_CIPHER => write!(f, "asym-cipher"),
            OperationId::KEM => write!(f, "kem"),
            OperationId(other) => write!(f, "operation-{}", other),
        }
    }
}

/// Opaque reference to an algorithm implementation inside a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImplementationRef(*const c_void);

// Safety: as for ProviderContext, the pointer is carried, never dereferenced.
unsafe impl Send for ImplementationRef {}
unsafe impl Sync for ImplementationRef {}

impl ImplementationRef {
    pub const fn null() -> Self {
        Self(std::ptr::null())
    }

    pub fn from_raw(ptr: *const c_void) -> Self {
        Self(ptr)
    }

    pub fn as_ptr(&self) -> *const c_void {
        self.0
    }
}

/// One algorithm offered by a provider for an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmDescriptor {
    /// Colon separated algorithm names, e.g. `"ML-KEM-768:KYBER768"`
    pub names: String,
    /// Property definition string, e.g. `"provider=pqc"`
    pub properties: String,
    pub description: Option<String>,
    pub implementation: ImplementationRef,
}

impl AlgorithmDescriptor {
    pub fn new(names: impl Into<String>, properties: impl Into<String>) -> Self {
        Self {
            names: names.into(),
            properties: properties.into(),
            description: None,
            implementation: ImplementationRef::null(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_implementation(mut self, implementation: ImplementationRef) -> Self {
        self.implementation = implementation;
        self
    }

    /// Whether `name` is one of the algorithm's names (case-insensitive)
    pub fn has_name(&self, name: &str) -> bool {
        self.names.split(':').any(|n| n.eq_ignore_ascii_case(name))
    }
}

/// Algorithms returned for one operation query
pub type AlgorithmTable = Arc<[AlgorithmDescriptor]>;

/// Provider teardown
pub type TeardownFn = dyn Fn(&ProviderContext) + Send + Sync;
/// Parameter description
pub type GetParamTypesFn = dyn Fn(&ProviderContext) -> Vec<ParamDescriptor> + Send + Sync;
/// Bulk parameter retrieval
pub type GetParamsFn = dyn Fn(&ProviderContext, &mut [Param]) -> bool + Send + Sync;
/// Per-operation algorithm lookup; the flag tells whether the table may be cached
pub type QueryOperationFn =
    dyn Fn(&ProviderContext, OperationId, &mut bool) -> Option<AlgorithmTable> + Send + Sync;

/// Capability table filled in by a provider's initializer
///
/// Each slot is independent; a provider fills in only what it implements.
#[derive(Clone, Default)]
pub struct DispatchTable {
    pub(crate) teardown: Option<Arc<TeardownFn>>,
    pub(crate) get_param_types: Option<Arc<GetParamTypesFn>>,
    pub(crate) get_params: Option<Arc<GetParamsFn>>,
    pub(crate) query_operation: Option<Arc<QueryOperationFn>>,
}

impl DispatchTable {
    /// An empty table
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_teardown<F>(mut self, f: F) -> Self
    where
        F: Fn(&ProviderContext) + Send + Sync + 'static,
    {
        self.teardown = Some(Arc::new(f));
        self
    }

    pub fn with_get_param_types<F>(mut self, f: F) -> Self
    where
        F: Fn(&ProviderContext) -> Vec<ParamDescriptor> + Send + Sync + 'static,
    {
        self.get_param_types = Some(Arc::new(f));
        self
    }

    pub fn with_get_params<F>(mut self, f: F) -> Self
    where
        F: Fn(&ProviderContext, &mut [Param]) -> bool + Send + Sync + 'static,
    {
        self.get_params = Some(Arc::new(f));
        self
    }

    pub fn with_query_operation<F>(mut self, f: F) -> Self
    where
        F: Fn(&ProviderContext, OperationId, &mut bool) -> Option<AlgorithmTable>
            + Send
            + Sync
            + 'static,
    {
        self.query_operation = Some(Arc::new(f));
        self
    }

    pub fn has_teardown(&self) -> bool {
        self.teardown.is_some()
    }

    pub fn has_get_param_types(&self) -> bool {
        self.get_param_types.is_some()
    }

    pub fn has_get_params(&self) -> bool {
        self.get_params.is_some()
    }

    pub fn has_query_operation(&self) -> bool {
        self.query_operation.is_some()
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("teardown", &self.has_teardown())
            .field("get_param_types", &self.has_get_param_types())
            .field("get_params", &self.has_get_params())
            .field("query_operation", &self.has_query_operation())
            .finish()
    }
}
