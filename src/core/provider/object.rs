/*!
Provider objects and their activation state machine.

A provider moves Registered -> Activated -> TornDown -> Destroyed. The
transitions are driven by the store: activation on request, teardown when
the reference count falls out of active use, destruction when it reaches
zero.
*/

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::core::constants::INITIAL_REFERENCES;
use crate::core::error::{Error, Result};
use crate::core::module::ModuleHandle;
use crate::core::provider::dispatch::{DispatchTable, ProviderContext};
use crate::core::provider::dispatcher;
use crate::core::provider::init::{CoreHandle, ProviderInit, ProviderInitFn};
use crate::core::provider::refcount::RefCount;
use crate::core::provider::store::ProviderStore;
use crate::ffi::abi::{self, FfiCore};
use crate::init_err;

/// Lifecycle state of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    /// Created, initializer not yet run
    Registered,
    /// Dispatch table and context obtained
    Activated,
    /// Teardown invoked; still in the store but inert
    TornDown,
    /// Last reference released and removed from the store
    Destroyed,
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderStatus::Registered => write!(f, "Registered"),
            ProviderStatus::Activated => write!(f, "Activated"),
            ProviderStatus::TornDown => write!(f, "TornDown"),
            ProviderStatus::Destroyed => write!(f, "Destroyed"),
        }
    }
}

/// Where a provider's initializer comes from
#[derive(Debug, Clone)]
pub enum InitSource {
    /// Initializer linked into the program
    Builtin(ProviderInitFn),
    /// Initializer found in a loadable module
    Module,
}

struct ProviderState {
    status: ProviderStatus,
    activation_count: usize,
    is_fallback: bool,
    module_path: Option<PathBuf>,
    parameters: Vec<(String, String)>,
    context: Option<ProviderContext>,
    dispatch: Option<DispatchTable>,
    // Upcall storage for module providers, dropped at teardown
    core: Option<Box<FfiCore>>,
    module: Option<ModuleHandle>,
}

/// A registered provider
pub struct ProviderObject {
    name: String,
    init_source: InitSource,
    refcount: RefCount,
    state: Mutex<ProviderState>,
}

impl ProviderObject {
    pub(crate) fn new(name: &str, init_source: InitSource, references: usize) -> Self {
        Self {
            name: name.to_string(),
            init_source,
            refcount: RefCount::new(references),
            state: Mutex::new(ProviderState {
                status: ProviderStatus::Registered,
                activation_count: 0,
                is_fallback: false,
                module_path: None,
                parameters: Vec::new(),
                context: None,
                dispatch: None,
                core: None,
                module: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn init_source(&self) -> &InitSource {
        &self.init_source
    }

    pub(crate) fn refcount(&self) -> &RefCount {
        &self.refcount
    }

    pub fn status(&self) -> ProviderStatus {
        self.lock().status
    }

    pub fn activation_count(&self) -> usize {
        self.lock().activation_count
    }

    pub fn is_fallback(&self) -> bool {
        self.lock().is_fallback
    }

    pub fn module_path(&self) -> Option<PathBuf> {
        self.lock().module_path.clone()
    }

    /// Path of the module currently loaded for this provider
    pub fn loaded_module(&self) -> Option<PathBuf> {
        self.lock().module.as_ref().map(|m| m.path().to_path_buf())
    }

    pub(crate) fn set_fallback(&self) {
        self.lock().is_fallback = true;
    }

    pub(crate) fn set_module_path(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        match state.status {
            ProviderStatus::Destroyed => return Err(Error::Destroyed(self.name.clone())),
            ProviderStatus::Activated => return Err(Error::AlreadyActivated(self.name.clone())),
            ProviderStatus::Registered | ProviderStatus::TornDown => {}
        }
        if state.module_path.is_some() {
            return Err(Error::ModulePathAlreadySet(self.name.clone()));
        }
        state.module_path = Some(path.to_path_buf());
        Ok(())
    }

    pub(crate) fn add_parameter(&self, name: &str, value: &str) {
        self.lock()
            .parameters
            .push((name.to_string(), value.to_string()));
    }

    /// Context and dispatch table, if the provider is activated
    pub(crate) fn capabilities(&self) -> Option<(ProviderContext, DispatchTable)> {
        let state = self.lock();
        if state.status != ProviderStatus::Activated {
            return None;
        }
        match (&state.context, &state.dispatch) {
            (Some(context), Some(dispatch)) => Some((*context, dispatch.clone())),
            _ => None,
        }
    }

    /// Run the initializer if needed and count the activation
    ///
    /// Holds the state lock for the whole initialization so concurrent
    /// callers see exactly one initializer run. Returns the new
    /// activation count.
    pub(crate) fn activate(&self, store: &ProviderStore) -> Result<usize> {
        let mut state = self.lock();
        match state.status {
            ProviderStatus::Activated => {
                state.activation_count += 1;
                return Ok(state.activation_count);
            }
            ProviderStatus::Destroyed => return Err(Error::Destroyed(self.name.clone())),
            ProviderStatus::Registered | ProviderStatus::TornDown => {}
        }

        let init = match &self.init_source {
            InitSource::Builtin(init) => self.initialize_builtin(init, &state, store)?,
            InitSource::Module => self.initialize_module(&mut state, store)?,
        };

        state.context = Some(init.context);
        state.dispatch = Some(init.dispatch);
        state.status = ProviderStatus::Activated;
        state.activation_count = 1;
        log::info!("Activated provider {}", self.name);
        Ok(1)
    }

    fn initialize_builtin(
        &self,
        init: &ProviderInitFn,
        state: &ProviderState,
        store: &ProviderStore,
    ) -> Result<ProviderInit> {
        let core = CoreHandle::new(
            &self.name,
            state.module_path.as_deref(),
            &state.parameters,
            store,
        );
        match init.call(&core) {
            Some(init) => Ok(init),
            None => init_err!("built-in provider {} reported failure", self.name),
        }
    }

    fn initialize_module(&self, state: &mut ProviderState, store: &ProviderStore) -> Result<ProviderInit> {
        let module = match state.module.take() {
            Some(module) => module,
            None => {
                let path = store.resolve_module_path(&self.name, state.module_path.as_deref());
                log::debug!("Loading provider {} from {}", self.name, path.display());
                store.loader().load(&path)?
            }
        };

        let core = FfiCore::new(&self.name, module.path(), &state.parameters);
        // Safety: the entry point belongs to `module`, which is stored next
        // to the dispatch table and only dropped after it.
        match unsafe { abi::initialize(module.entry(), &core) } {
            Some(init) => {
                state.core = Some(core);
                state.module = Some(module);
                Ok(init)
            }
            None => init_err!(
                "module {} for provider {} reported failure",
                module.path().display(),
                self.name
            ),
        }
    }

    fn teardown_locked(&self, state: &mut ProviderState) -> bool {
        if state.status != ProviderStatus::Activated {
            return false;
        }
        state.status = ProviderStatus::TornDown;
        state.activation_count = 0;

        if let (Some(context), Some(dispatch)) = (state.context.take(), state.dispatch.take()) {
            dispatcher::teardown(&context, &dispatch);
        }
        state.core = None;
        log::info!("Tore down provider {}", self.name);
        true
    }

    /// Tear the provider down if it is activated and out of use
    ///
    /// The count is checked again under the state lock: a `find` that
    /// raced the releasing thread has brought the provider back into use,
    /// and the release that ends that use will cross again. Returns
    /// whether teardown ran.
    pub(crate) fn deactivate(&self) -> bool {
        let mut state = self.lock();
        if self.refcount.get() >= INITIAL_REFERENCES {
            log::debug!("Provider {} back in use, skipping teardown", self.name);
            return false;
        }
        self.teardown_locked(&mut state)
    }

    /// Final destruction: teardown if still activated, then unload the module
    pub(crate) fn destroy(&self) {
        let module = {
            let mut state = self.lock();
            if state.status == ProviderStatus::Destroyed {
                return;
            }
            self.teardown_locked(&mut state);
            state.status = ProviderStatus::Destroyed;
            state.context = None;
            state.dispatch = None;
            state.core = None;
            state.module.take()
        };
        drop(module);
        log::debug!("Destroyed provider {}", self.name);
    }
}

impl fmt::Debug for ProviderObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ProviderObject")
            .field("name", &self.name)
            .field("references", &self.refcount.get())
            .field("status", &state.status)
            .field("activation_count", &state.activation_count)
            .field("is_fallback", &state.is_fallback)
            .field("module_path", &state.module_path)
            .finish()
    }
}
