// tests/module_test.rs
use std::ffi::{c_void, CStr};
use std::os::raw::{c_char, c_int};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pqc_provider::core::module::module_file_name;
use pqc_provider::ffi::{FfiAlgorithm, FfiCoreDispatch, FfiDispatchTable, ProviderEntryFn};
use pqc_provider::{
    LoadError, ModuleHandle, ModuleLoader, OperationId, Param, ProviderStatus, ProviderStore,
    RegistryConfig, Result,
};

// Names of providers whose module teardown ran, in order
static TORN_DOWN: Mutex<Vec<String>> = Mutex::new(Vec::new());

struct Table<T>(T);
unsafe impl<T> Sync for Table<T> {}

static KEM_TABLE: Table<[FfiAlgorithm; 2]> = Table([
    FfiAlgorithm {
        names: c"ML-KEM-768:KYBER768".as_ptr(),
        properties: c"provider=fake".as_ptr(),
        implementation: ptr::null(),
        description: c"Module-lattice KEM".as_ptr(),
    },
    FfiAlgorithm {
        names: ptr::null(),
        properties: ptr::null(),
        implementation: ptr::null(),
        description: ptr::null(),
    },
]);

unsafe extern "C" fn fake_entry(
    core: *const FfiCoreDispatch,
    out: *mut FfiDispatchTable,
    provctx: *mut *mut c_void,
) -> c_int {
    let core = unsafe { &*core };
    let fail = unsafe { (core.get_param)(core.handle, c"fail".as_ptr()) };
    if !fail.is_null() {
        return 0;
    }
    let name = unsafe { (core.get_param)(core.handle, c"provider-name".as_ptr()) };
    if name.is_null() {
        return 0;
    }
    let name = unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned();

    unsafe {
        (*out).teardown = Some(fake_teardown);
        (*out).get_param = Some(fake_get_param);
        (*out).query_operation = Some(fake_query);
        *provctx = Box::into_raw(Box::new(name)) as *mut c_void;
    }
    1
}

// Keeps the core's provider-name string and only reads it at teardown
unsafe extern "C" fn borrowing_entry(
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
        (*out).teardown = Some(borrowing_teardown);
        *provctx = name as *mut c_void;
    }
    1
}

unsafe extern "C" fn borrowing_teardown(provctx: *mut c_void) {
    let name = unsafe { CStr::from_ptr(provctx as *const c_char) };
    TORN_DOWN.lock().unwrap().push(name.to_string_lossy().into_owned());
}

unsafe extern "C" fn fake_teardown(provctx: *mut c_void) {
    let name = unsafe { Box::from_raw(provctx as *mut String) };
    TORN_DOWN.lock().unwrap().push(*name);
}

unsafe extern "C" fn fake_get_param(_provctx: *mut c_void, key: *const c_char) -> *const c_char {
    if unsafe { CStr::from_ptr(key) } == c"status" {
        c"ok".as_ptr()
    } else {
        ptr::null()
    }
}

unsafe extern "C" fn fake_query(_provctx: *mut c_void, operation_id: c_int, no_cache: *mut c_int) -> *const FfiAlgorithm {
    if operation_id == OperationId::KEM.0 {
        unsafe { *no_cache = 1 };
        KEM_TABLE.0.as_ptr()
    } else {
        ptr::null()
    }
}

fn teardowns_of(name: &str) -> usize {
    TORN_DOWN.lock().unwrap().iter().filter(|n| *n == name).count()
}

// Counts unloads when the module handle drops it
struct LoadedLibrary(Arc<AtomicUsize>);

impl Drop for LoadedLibrary {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Loader serving every path from the fake entry point
///
/// Paths under `/bad` do not exist; files starting with `nosym` lack the
/// entry point and files starting with `borrow` use `borrowing_entry`.
#[derive(Default)]
struct FakeLoader {
    loaded: Mutex<Vec<PathBuf>>,
    unloads: Arc<AtomicUsize>,
}

impl FakeLoader {
    fn loads(&self) -> usize {
        self.loaded.lock().unwrap().len()
    }

    fn unloads(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }
}

impl ModuleLoader for FakeLoader {
    fn load(&self, path: &Path) -> std::result::Result<ModuleHandle, LoadError> {
        if path.starts_with("/bad") {
            return Err(LoadError::ModuleNotFound {
                path: path.to_path_buf(),
                reason: "no such file".to_string(),
            });
        }
        let file_name = path.file_name().and_then(|f| f.to_str()).unwrap_or_default();
        if file_name.starts_with("nosym") {
            return Err(LoadError::SymbolNotFound {
                path: path.to_path_buf(),
                symbol: "pqc_provider_init".to_string(),
            });
        }

        self.loaded.lock().unwrap().push(path.to_path_buf());
        let entry: ProviderEntryFn = if file_name.starts_with("borrow") {
            borrowing_entry
        } else {
            fake_entry
        };
        Ok(unsafe { ModuleHandle::new(path.to_path_buf(), entry, LoadedLibrary(Arc::clone(&self.unloads))) })
    }
}

fn test_config() -> RegistryConfig {
    RegistryConfig::new()
        .with_modules_env("PQC_PROVIDER_MODULE_TEST_UNSET")
        .with_default_module_dir("/opt/pqc-test")
}

fn fake_store() -> (Arc<FakeLoader>, ProviderStore) {
    let loader = Arc::new(FakeLoader::default());
    let store = ProviderStore::with_loader(test_config(), loader.clone());
    (loader, store)
}

#[test]
fn test_bad_path_with_shared_library_loader() -> Result<()> {
    let store = ProviderStore::new(test_config());
    let handle = store.new_or_get("absent", None)?;
    handle.set_module_path("/bad/path")?;

    let err = store.activate(&handle).unwrap_err();
    assert!(err.is_module_not_found(), "unexpected error: {}", err);
    assert_eq!(handle.status(), ProviderStatus::Registered);
    assert!(handle.loaded_module().is_none());
    Ok(())
}

#[test]
fn test_bad_path_then_fresh_provider() -> Result<()> {
    let (loader, store) = fake_store();

    let bad = store.new_or_get("mlkem-bad", None)?;
    bad.set_module_path("/bad/path")?;
    assert!(store.activate(&bad).unwrap_err().is_module_not_found());
    assert_eq!(bad.status(), ProviderStatus::Registered);

    // The failed provider can be retried
    assert!(store.activate(&bad).unwrap_err().is_module_not_found());

    let good = store.new_or_get("mlkem-good", None)?;
    good.set_module_path("/opt/pqc/mlkem.so")?;
    store.activate(&good)?;
    assert_eq!(good.status(), ProviderStatus::Activated);
    assert_eq!(good.loaded_module(), Some(PathBuf::from("/opt/pqc/mlkem.so")));
    assert_eq!(loader.loads(), 1);
    Ok(())
}

#[test]
fn test_symbol_not_found() -> Result<()> {
    let (loader, store) = fake_store();
    let handle = store.new_or_get("nosym-provider", None)?;

    let err = store.activate(&handle).unwrap_err();
    assert!(err.is_symbol_not_found(), "unexpected error: {}", err);
    assert_eq!(handle.status(), ProviderStatus::Registered);
    assert_eq!(loader.loads(), 0);
    Ok(())
}

#[test]
fn test_module_initializer_failure_unloads_module() -> Result<()> {
    let (loader, store) = fake_store();
    let handle = store.new_or_get("refuses", None)?;
    handle.add_parameter("fail", "1");

    let err = store.activate(&handle).unwrap_err();
    assert!(matches!(err, pqc_provider::Error::InitFailed(_)));
    assert_eq!(handle.status(), ProviderStatus::Registered);
    assert_eq!(loader.loads(), 1);
    assert_eq!(loader.unloads(), 1);
    Ok(())
}

#[test]
fn test_module_path_from_search_directory() -> Result<()> {
    let (loader, store) = fake_store();
    let handle = store.new_or_get("mlkem", None)?;
    store.activate(&handle)?;

    let expected = Path::new("/opt/pqc-test").join(module_file_name("mlkem"));
    assert_eq!(loader.loaded.lock().unwrap().as_slice(), &[expected.clone()]);
    assert_eq!(handle.loaded_module(), Some(expected));
    Ok(())
}

#[test]
fn test_runtime_search_path_and_env_override() {
    let (_loader, store) = fake_store();

    store.set_default_search_path(Some(PathBuf::from("/srv/pqc-modules")));
    assert_eq!(
        store.resolve_module_path("hqc", None),
        Path::new("/srv/pqc-modules").join(module_file_name("hqc"))
    );

    store.set_default_search_path(None);
    assert_eq!(
        store.resolve_module_path("hqc", None),
        Path::new("/opt/pqc-test").join(module_file_name("hqc"))
    );

    // Cargo sets the manifest directory for test runs; the environment wins
    let env_store = ProviderStore::new(test_config().with_modules_env("CARGO_MANIFEST_DIR"));
    env_store.set_default_search_path(Some(PathBuf::from("/srv/pqc-modules")));
    assert_eq!(
        env_store.resolve_module_path("hqc", None),
        Path::new(env!("CARGO_MANIFEST_DIR")).join(module_file_name("hqc"))
    );

    assert_eq!(
        env_store.resolve_module_path("hqc", Some(Path::new("/explicit/hqc.so"))),
        PathBuf::from("/explicit/hqc.so")
    );
}

#[test]
fn test_module_provider_dispatch() -> Result<()> {
    let (_loader, store) = fake_store();
    let handle = store.new_or_get("dispatching", None)?;
    store.activate(&handle)?;

    let mut params = vec![Param::request("status"), Param::request("missing")];
    assert!(handle.get_params(&mut params));
    assert_eq!(params[0].as_str(), Some("ok"));
    assert!(!params[1].is_set());

    assert!(handle.get_param_types().is_none());

    let mut no_cache = false;
    let table = handle
        .query_operation(OperationId::KEM, &mut no_cache)
        .expect("KEM table");
    assert!(no_cache);
    assert_eq!(table.len(), 1);
    assert!(table[0].has_name("KYBER768"));
    assert_eq!(table[0].description.as_deref(), Some("Module-lattice KEM"));

    assert!(handle.query_operation(OperationId::SIGNATURE, &mut no_cache).is_none());
    Ok(())
}

#[test]
fn test_module_released_at_zero() -> Result<()> {
    let (loader, store) = fake_store();
    let handle = store.new_or_get("released", None)?;
    store.activate(&handle)?;

    store.release(&handle);
    assert_eq!(teardowns_of("released"), 1);
    assert_eq!(loader.unloads(), 0, "an inert provider keeps its module");

    // Reactivation reuses the loaded module
    let handle = store.find("released").expect("still registered");
    store.activate(&handle)?;
    assert_eq!(loader.loads(), 1);

    store.release(&handle);
    store.release(&handle);
    assert_eq!(teardowns_of("released"), 2);
    assert_eq!(loader.unloads(), 1);
    assert!(store.find("released").is_none());
    Ok(())
}

#[test]
fn test_core_strings_live_until_teardown() -> Result<()> {
    let (loader, store) = fake_store();
    let handle = store.new_or_get("borrower", None)?;
    handle.set_module_path("/opt/pqc/borrow.so")?;

    store.activate(&handle)?;
    store.release(&handle);
    assert_eq!(teardowns_of("borrower"), 1);

    // A second lifetime gets a fresh core
    let handle = store.find("borrower").expect("still registered");
    store.activate(&handle)?;
    store.release(&handle);
    assert_eq!(teardowns_of("borrower"), 2);
    assert_eq!(loader.loads(), 1);
    Ok(())
}
