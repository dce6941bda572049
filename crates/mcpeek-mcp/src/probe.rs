//! Capability probe: list tools, resources and roots on an open session.

use crate::session::McpSession;
use mcpeek_core::{CancelScope, CapabilityKind, CapabilitySet, McpeekError, McpeekResult};
use tracing::{debug, warn};

/// Query every capability listing of `session`.
///
/// A failing listing is recorded in [`CapabilitySet::errors`] and the probe
/// moves on. Only a closed session or a cancelled scope fails the probe.
pub async fn probe<S>(session: &S, scope: &CancelScope) -> McpeekResult<CapabilitySet>
where
    S: McpSession + ?Sized,
{
    if !session.is_open() {
        return Err(McpeekError::NotConnected(session.server_name().to_string()));
    }

    let mut set = CapabilitySet {
        server_info: session.server_info(),
        ..CapabilitySet::default()
    };

    match session.list_tools(scope).await {
        Ok(tools) => set.tools = tools,
        Err(e) => record(&mut set, session, CapabilityKind::Tools, e, scope)?,
    }
    match session.list_resources(scope).await {
        Ok(resources) => set.resources = resources,
        Err(e) => record(&mut set, session, CapabilityKind::Resources, e, scope)?,
    }
    match session.list_roots(scope).await {
        Ok(roots) => set.roots = roots,
        Err(e) => record(&mut set, session, CapabilityKind::Roots, e, scope)?,
    }

    debug!(
        server = %session.server_name(),
        tools = set.tools.len(),
        resources = set.resources.len(),
        roots = set.roots.len(),
        failed = set.errors.len(),
        "Capabilities probed"
    );
    Ok(set)
}

fn record<S: McpSession + ?Sized>(
    set: &mut CapabilitySet,
    session: &S,
    kind: CapabilityKind,
    err: McpeekError,
    scope: &CancelScope,
) -> McpeekResult<()> {
    if let Some(cancel) = scope.error() {
        return Err(cancel);
    }
    if err.is_cancellation() {
        return Err(err);
    }
    warn!(server = %session.server_name(), capability = %kind, error = %err, "Capability listing failed");
    set.record_error(kind, err);
    Ok(())
}
