/*!
C ABI shared by the registry and loadable provider modules.

A module exports [`PROVIDER_ENTRY_SYMBOL`](crate::core::constants::PROVIDER_ENTRY_SYMBOL)
with the [`ProviderEntryFn`] signature. The registry hands it a
[`FfiCoreDispatch`] for parameter upcalls and receives a
[`FfiDispatchTable`] whose slots may each be null.
*/

use std::ffi::{c_void, CStr, CString};
use std::os::raw::{c_char, c_int, c_uint};
use std::path::Path;
use std::ptr;

use crate::core::constants::{core_params, VERSION};
use crate::core::params::{ParamDescriptor, ParamType, ParamValue};
use crate::core::provider::dispatch::{
    AlgorithmDescriptor, AlgorithmTable, DispatchTable, ImplementationRef, ProviderContext,
};
use crate::core::provider::init::ProviderInit;

/// Entry point exported by every provider module
///
/// Returns non-zero on success, after filling `out` and `provctx`.
pub type ProviderEntryFn = unsafe extern "C" fn(
    core: *const FfiCoreDispatch,
    out: *mut FfiDispatchTable,
    provctx: *mut *mut c_void,
) -> c_int;

/// Upcalls the core offers to a module
#[repr(C)]
pub struct FfiCoreDispatch {
    /// Opaque core handle, passed back into every upcall
    pub handle: *const c_void,
    /// Look up a parameter; the returned string stays valid until teardown
    pub get_param: unsafe extern "C" fn(handle: *const c_void, key: *const c_char) -> *const c_char,
}

/// Capability slots filled in by a module
#[repr(C)]
#[derive(Default)]
pub struct FfiDispatchTable {
    pub teardown: Option<unsafe extern "C" fn(provctx: *mut c_void)>,
    /// Returns an array terminated by an entry with a null key
    pub gettable_params: Option<unsafe extern "C" fn(provctx: *mut c_void) -> *const FfiParamDescriptor>,
    /// Returns the parameter value as a string, or null if unknown
    pub get_param: Option<unsafe extern "C" fn(provctx: *mut c_void, key: *const c_char) -> *const c_char>,
    /// Returns an array terminated by an entry with null names, or null if unsupported
    pub query_operation: Option<
        unsafe extern "C" fn(provctx: *mut c_void, operation_id: c_int, no_cache: *mut c_int) -> *const FfiAlgorithm,
    >,
}

#[repr(C)]
pub struct FfiParamDescriptor {
    pub key: *const c_char,
    pub data_type: c_uint,
}

#[repr(C)]
pub struct FfiAlgorithm {
    pub names: *const c_char,
    pub properties: *const c_char,
    pub implementation: *const c_void,
    pub description: *const c_char,
}

/// Parameters a module provider can read through its core upcall
///
/// Owned by the provider object for one activation lifetime and dropped
/// at teardown. Returned strings stay valid until then; a reactivation
/// gets a fresh core.
pub struct FfiCore {
    params: Vec<(CString, CString)>,
    upcalls: FfiCoreDispatch,
}

// Safety: the core is immutable after construction; the raw handle points
// into the same heap allocation.
unsafe impl Send for FfiCore {}
unsafe impl Sync for FfiCore {}

impl FfiCore {
    pub(crate) fn new(name: &str, module_path: &Path, parameters: &[(String, String)]) -> Box<Self> {
        let mut entries = vec![
            (core_params::PROVIDER_NAME.to_string(), name.to_string()),
            (core_params::MODULE_FILENAME.to_string(), module_path.display().to_string()),
            (core_params::LIBRARY_VERSION.to_string(), VERSION.to_string()),
        ];
        entries.extend(parameters.iter().cloned());

        let params = entries
            .into_iter()
            .filter_map(|(key, value)| match (CString::new(key.as_str()), CString::new(value)) {
                (Ok(k), Ok(v)) => Some((k, v)),
                _ => {
                    log::warn!("Skipping parameter {} for provider {}: embedded NUL", key, name);
                    None
                }
            })
            .collect();

        let mut core = Box::new(Self {
            params,
            upcalls: FfiCoreDispatch {
                handle: ptr::null(),
                get_param: core_get_param,
            },
        });
        core.upcalls.handle = &*core as *const FfiCore as *const c_void;
        core
    }

    fn lookup(&self, key: &CStr) -> *const c_char {
        self.params
            .iter()
            .find(|(k, _)| k.as_c_str() == key)
            .map_or(ptr::null(), |(_, v)| v.as_ptr())
    }
}

unsafe extern "C" fn core_get_param(handle: *const c_void, key: *const c_char) -> *const c_char {
    if handle.is_null() || key.is_null() {
        return ptr::null();
    }
    let core = unsafe { &*(handle as *const FfiCore) };
    let key = unsafe { CStr::from_ptr(key) };
    core.lookup(key)
}

unsafe fn owned_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }
}

/// Run a module's entry point and adapt its table
///
/// # Safety
/// `entry` must come from a module that is still loaded and must honor the
/// [`ProviderEntryFn`] contract. The module and `core` must outlive every
/// closure in the returned dispatch table.
pub(crate) unsafe fn initialize(entry: ProviderEntryFn, core: &FfiCore) -> Option<ProviderInit> {
    let mut table = FfiDispatchTable::default();
    let mut provctx: *mut c_void = ptr::null_mut();

    let ok = unsafe { entry(&core.upcalls, &mut table, &mut provctx) };
    if ok == 0 {
        return None;
    }

    Some(ProviderInit::new(ProviderContext::from_raw(provctx), adapt(&table)))
}

fn adapt(table: &FfiDispatchTable) -> DispatchTable {
    let mut dispatch = DispatchTable::new();

    if let Some(teardown) = table.teardown {
        dispatch = dispatch.with_teardown(move |ctx| unsafe { teardown(ctx.as_ptr()) });
    }

    if let Some(gettable) = table.gettable_params {
        dispatch = dispatch.with_get_param_types(move |ctx| {
            let mut descriptors = Vec::new();
            let mut cursor = unsafe { gettable(ctx.as_ptr()) };
            if cursor.is_null() {
                return descriptors;
            }
            loop {
                let entry = unsafe { &*cursor };
                let Some(key) = (unsafe { owned_str(entry.key) }) else {
                    break;
                };
                match ParamType::from_raw(entry.data_type) {
                    Some(data_type) => descriptors.push(ParamDescriptor::new(key, data_type)),
                    None => log::debug!("Ignoring parameter {} with unknown type {}", key, entry.data_type),
                }
                cursor = unsafe { cursor.add(1) };
            }
            descriptors
        });
    }

    if let Some(get_param) = table.get_param {
        dispatch = dispatch.with_get_params(move |ctx, params| {
            for param in params.iter_mut() {
                let Ok(key) = CString::new(param.key.as_str()) else {
                    return false;
                };
                let value = unsafe { owned_str(get_param(ctx.as_ptr(), key.as_ptr())) };
                if let Some(value) = value {
                    param.value = ParamValue::Utf8String(value);
                }
            }
            true
        });
    }

    if let Some(query) = table.query_operation {
        dispatch = dispatch.with_query_operation(move |ctx, operation_id, no_cache| {
            let mut flag: c_int = 0;
            let mut cursor = unsafe { query(ctx.as_ptr(), operation_id.0, &mut flag) };
            *no_cache = flag != 0;
            if cursor.is_null() {
                return None;
            }
            let mut algorithms = Vec::new();
            loop {
                let entry = unsafe { &*cursor };
                let Some(names) = (unsafe { owned_str(entry.names) }) else {
                    break;
                };
                let mut alg = AlgorithmDescriptor::new(
                    names,
                    unsafe { owned_str(entry.properties) }.unwrap_or_default(),
                )
                .with_implementation(ImplementationRef::from_raw(entry.implementation));
                alg.description = unsafe { owned_str(entry.description) };
                algorithms.push(alg);
                cursor = unsafe { cursor.add(1) };
            }
            Some(AlgorithmTable::from(algorithms))
        });
    }

    dispatch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::params::Param;
    use crate::core::provider::dispatch::OperationId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TEARDOWNS: AtomicUsize = AtomicUsize::new(0);

    const KEM_NAME: &CStr = c"ML-KEM-768:KYBER768";
    const KEM_PROPS: &CStr = c"provider=test";
    const VERSION_KEY: &CStr = c"version";
    const VERSION_VALUE: &CStr = c"1.2.3";

    struct Table<T>([T; 2]);
    // Safety: the tables only hold pointers to static C strings.
    unsafe impl<T> Sync for Table<T> {}

    static ALGORITHMS: Table<FfiAlgorithm> = Table([
        FfiAlgorithm {
            names: KEM_NAME.as_ptr(),
            properties: KEM_PROPS.as_ptr(),
            implementation: ptr::null(),
            description: ptr::null(),
        },
        FfiAlgorithm {
            names: ptr::null(),
            properties: ptr::null(),
            implementation: ptr::null(),
            description: ptr::null(),
        },
    ]);

    static GETTABLE: Table<FfiParamDescriptor> = Table([
        FfiParamDescriptor {
            key: VERSION_KEY.as_ptr(),
            data_type: 4,
        },
        FfiParamDescriptor {
            key: ptr::null(),
            data_type: 0,
        },
    ]);

    unsafe extern "C" fn teardown(_ctx: *mut c_void) {
        TEARDOWNS.fetch_add(1, Ordering::SeqCst);
    }

    unsafe extern "C" fn gettable(_ctx: *mut c_void) -> *const FfiParamDescriptor {
        GETTABLE.0.as_ptr()
    }

    unsafe extern "C" fn get_param(_ctx: *mut c_void, key: *const c_char) -> *const c_char {
        if unsafe { CStr::from_ptr(key) } == VERSION_KEY {
            VERSION_VALUE.as_ptr()
        } else {
            ptr::null()
        }
    }

    unsafe extern "C" fn query(_ctx: *mut c_void, op: c_int, no_cache: *mut c_int) -> *const FfiAlgorithm {
        if op == OperationId::KEM.0 {
            unsafe { *no_cache = 1 };
            ALGORITHMS.0.as_ptr()
        } else {
            ptr::null()
        }
    }

    unsafe extern "C" fn entry(
        core: *const FfiCoreDispatch,
        out: *mut FfiDispatchTable,
        provctx: *mut *mut c_void,
    ) -> c_int {
        let core = unsafe { &*core };
        let name = unsafe { (core.get_param)(core.handle, c"provider-name".as_ptr()) };
        if name.is_null() {
            return 0;
        }
        unsafe {
            (*out).teardown = Some(teardown);
            (*out).gettable_params = Some(gettable);
            (*out).get_param = Some(get_param);
            (*out).query_operation = Some(query);
            *provctx = ptr::null_mut();
        }
        1
    }

    unsafe extern "C" fn refusing_entry(
        _core: *const FfiCoreDispatch,
        _out: *mut FfiDispatchTable,
        _provctx: *mut *mut c_void,
    ) -> c_int {
        0
    }

    #[test]
    fn test_core_upcall_answers_parameters() {
        let params = vec![("security-level".to_string(), "3".to_string())];
        let core = FfiCore::new("alpha", Path::new("/opt/alpha.so"), &params);

        let lookup = |key: &CStr| unsafe { owned_str((core.upcalls.get_param)(core.upcalls.handle, key.as_ptr())) };

        assert_eq!(lookup(c"provider-name").as_deref(), Some("alpha"));
        assert_eq!(lookup(c"module-filename").as_deref(), Some("/opt/alpha.so"));
        assert_eq!(lookup(c"security-level").as_deref(), Some("3"));
        assert_eq!(lookup(c"missing"), None);
    }

    #[test]
    fn test_initialize_adapts_every_slot() {
        let core = FfiCore::new("alpha", Path::new("/opt/alpha.so"), &[]);
        let init = unsafe { initialize(entry, &core) }.expect("entry should succeed");
        let dispatch = init.dispatch;

        let types = (dispatch.get_param_types.as_ref().unwrap())(&init.context);
        assert_eq!(types, vec![ParamDescriptor::new("version", ParamType::Utf8String)]);

        let mut params = vec![Param::request("version"), Param::request("unknown")];
        assert!((dispatch.get_params.as_ref().unwrap())(&init.context, &mut params));
        assert_eq!(params[0].as_str(), Some("1.2.3"));
        assert!(!params[1].is_set());

        let mut no_cache = false;
        let query = dispatch.query_operation.as_ref().unwrap();
        let table = query(&init.context, OperationId::KEM, &mut no_cache).unwrap();
        assert!(no_cache);
        assert_eq!(table.len(), 1);
        assert!(table[0].has_name("kyber768"));
        assert_eq!(table[0].properties, "provider=test");
        assert!(query(&init.context, OperationId::DIGEST, &mut no_cache).is_none());

        let before = TEARDOWNS.load(Ordering::SeqCst);
        (dispatch.teardown.as_ref().unwrap())(&init.context);
        assert_eq!(TEARDOWNS.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn test_initialize_reports_entry_failure() {
        let core = FfiCore::new("beta", Path::new("/opt/beta.so"), &[]);
        assert!(unsafe { initialize(refusing_entry, &core) }.is_none());
    }
}
