//! Request-scoped tenant context.
//!
//! Handlers receive a [`RequestContext`] explicitly (axum extension). For code
//! that cannot take it as a parameter, the same snapshot is installed in a
//! tokio task-local for the duration of the request future only; it is never
//! visible to other tasks and disappears when the future completes.
//!
//! Background work that outlives the request must capture the context and
//! re-enter it with [`scope`] on the worker task.

use crate::store::TenantStore;
use helpdesk_core::error::{HelpdeskError, Result};
use std::future::Future;
use std::sync::Arc;

tokio::task_local! {
    static CURRENT: RequestContext;
}

/// Immutable snapshot of the tenant resolved for one request.
#[derive(Clone)]
pub struct RequestContext {
    pub tenant_id: String,
    pub tenant_slug: String,
    pub store: Arc<TenantStore>,
    /// Tenant is deactivated or past its trial: reads allowed, UI should offer an upgrade.
    pub trial_expired: bool,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("tenant_id", &self.tenant_id)
            .field("tenant_slug", &self.tenant_slug)
            .field("trial_expired", &self.trial_expired)
            .finish_non_exhaustive()
    }
}

/// Run `fut` with `ctx` as the ambient tenant context.
pub async fn scope<F: Future>(ctx: RequestContext, fut: F) -> F::Output {
    CURRENT.scope(ctx, fut).await
}

/// The ambient context of the current task.
pub fn current() -> Result<RequestContext> {
    CURRENT
        .try_with(|ctx| ctx.clone())
        .map_err(|_| HelpdeskError::NoTenantContext)
}

/// The current tenant's store.
pub fn current_store() -> Result<Arc<TenantStore>> {
    CURRENT
        .try_with(|ctx| Arc::clone(&ctx.store))
        .map_err(|_| HelpdeskError::NoTenantContext)
}
