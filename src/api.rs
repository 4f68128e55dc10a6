/*!
High-level API for loading and using providers.

These functions wrap the store operations into the load/unload pattern
applications normally want: a loaded provider is registered, activated and
held by the caller until it is unloaded again.
*/

use crate::core::context::LibraryContext;
use crate::core::error::{Error, Result};
use crate::core::provider::{fallback, ProviderHandle};

/// Load and activate a provider
///
/// Fallback providers are not activated alongside it, and once the load
/// succeeds the store stops activating them automatically.
pub fn load_provider(ctx: &LibraryContext, name: &str) -> Result<ProviderHandle> {
    try_load_provider(ctx, name, false)
}

/// Load and activate a provider, optionally keeping fallbacks
///
/// With `retain_fallbacks` set, fallback providers that would have been
/// activated because nothing else was active are activated first and stay
/// active next to the loaded provider. Without it, a successful load
/// disables automatic fallback activation for the store for good.
pub fn try_load_provider(ctx: &LibraryContext, name: &str, retain_fallbacks: bool) -> Result<ProviderHandle> {
    let store = ctx.store();

    if retain_fallbacks && !store.has_active() {
        fallback::activate_fallbacks(store);
    }

    let handle = store.new_or_get(name, None)?;
    if let Err(e) = store.activate(&handle) {
        store.release(&handle);
        return Err(e);
    }

    if !retain_fallbacks {
        store.disable_fallbacks();
    }
    log::info!("Loaded provider {}", name);
    Ok(handle)
}

/// Take a reference to an already registered provider
///
/// Unlike [`load_provider`] this neither registers nor activates anything.
pub fn find_provider(ctx: &LibraryContext, name: &str) -> Result<ProviderHandle> {
    ctx.store()
        .find(name)
        .ok_or_else(|| Error::NotFound(name.to_string()))
}

/// Give back a provider obtained from [`load_provider`]
///
/// Returns the remaining reference count. The provider is torn down once
/// nobody but the store holds it.
pub fn unload_provider(ctx: &LibraryContext, provider: ProviderHandle) -> usize {
    let remaining = ctx.store().release(&provider);
    log::debug!("Unloaded provider {}, {} references left", provider.name(), remaining);
    remaining
}

/// Whether a provider of this name is activated
///
/// Like an algorithm lookup, this activates the fallback providers when
/// nothing is active yet.
pub fn provider_available(ctx: &LibraryContext, name: &str) -> bool {
    let store = ctx.store();
    if !store.has_active() {
        fallback::activate_fallbacks(store);
    }

    match store.find(name) {
        Some(handle) => {
            let available = handle.is_activated();
            store.release(&handle);
            available
        }
        None => false,
    }
}

/// Call `callback` for every activated provider
///
/// Returns `false` if the callback stopped the iteration.
pub fn do_all<F>(ctx: &LibraryContext, callback: F) -> bool
where
    F: FnMut(&ProviderHandle) -> bool,
{
    ctx.store().forall_loaded(callback)
}
