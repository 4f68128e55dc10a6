/*!
Capability-checked forwarding to a provider's dispatch table.

Every call first checks that the provider is activated and that it fills
the slot in question. A missing slot is a documented "no", not an error.
*/

use crate::core::params::{Param, ParamDescriptor};
use crate::core::provider::dispatch::{AlgorithmTable, DispatchTable, OperationId, ProviderContext};
use crate::core::provider::store::ProviderHandle;

/// Invoke the provider's teardown, if it has one
///
/// Called once per activation lifetime by the object's state machine.
pub(crate) fn teardown(context: &ProviderContext, dispatch: &DispatchTable) {
    if let Some(teardown) = &dispatch.teardown {
        teardown(context);
    }
}

/// Parameters the provider can answer, or `None` if it does not say
pub fn get_param_types(provider: &ProviderHandle) -> Option<Vec<ParamDescriptor>> {
    let (context, dispatch) = provider.object().capabilities()?;
    let get_param_types = dispatch.get_param_types.as_ref()?;
    Some(get_param_types(&context))
}

/// Fill `params` from the provider
///
/// Returns `false` both when the provider does not support parameter
/// retrieval and when it reports failure.
pub fn get_params(provider: &ProviderHandle, params: &mut [Param]) -> bool {
    let Some((context, dispatch)) = provider.object().capabilities() else {
        return false;
    };
    match &dispatch.get_params {
        Some(get_params) => get_params(&context, params),
        None => false,
    }
}

/// Algorithms the provider supplies for `operation_id`
///
/// `no_cache` is set by the provider when the returned table must not be
/// kept across calls. Returns `None` when the provider has nothing for the
/// operation.
pub fn query_operation(
    provider: &ProviderHandle,
    operation_id: OperationId,
    no_cache: &mut bool,
) -> Option<AlgorithmTable> {
    *no_cache = false;
    let (context, dispatch) = provider.object().capabilities()?;
    let query_operation = dispatch.query_operation.as_ref()?;
    let table = query_operation(&context, operation_id, no_cache);
    log::trace!(
        "Provider {} answered {} query: {} algorithms",
        provider.name(),
        operation_id,
        table.as_ref().map_or(0, |t| t.len())
    );
    table
}
