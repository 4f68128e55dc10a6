/*!
Automatic activation of fallback providers.
*/

use crate::core::provider::store::ProviderStore;

/// Activate every fallback provider that is not already active
///
/// Serialized per store so concurrent iterations do not activate the same
/// fallback twice. An activated fallback keeps an extra reference, taken
/// before activation, so that ordinary find/release pairs cannot tear it
/// down. Failures are logged and skipped. Does nothing once fallbacks are
/// disabled for the store. Returns the number of providers activated.
pub(crate) fn activate_fallbacks(store: &ProviderStore) -> usize {
    let _guard = store.fallback_guard();
    if !store.fallbacks_enabled() {
        return 0;
    }
    let mut activated = 0;

    for handle in store.snapshot() {
        if !handle.is_fallback() || handle.is_activated() {
            continue;
        }
        if store.upref(&handle) == 0 {
            continue;
        }
        match store.activate(&handle) {
            Ok(()) => {
                activated += 1;
                log::info!("Activated fallback provider {}", handle.name());
            }
            Err(e) => {
                store.release(&handle);
                log::warn!("Skipping fallback provider {}: {}", handle.name(), e);
            }
        }
    }
    activated
}
