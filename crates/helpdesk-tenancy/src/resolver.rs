//! Tenant resolution for inbound requests.

use crate::context::RequestContext;
use crate::db::{PlatformDb, Tenant};
use crate::registry::StoreRegistry;
use crate::session::Session;
use helpdesk_core::error::Result;
use std::sync::Arc;

/// Whether a path needs a logged-in tenant session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    /// Help center, livechat API and login; tenant optional.
    Public,
    /// Staff back office; tenant required.
    TenantScoped,
}

impl PathClass {
    /// A path is public when it equals a public prefix or lies below one.
    pub fn classify(path: &str, public_prefixes: &[String]) -> Self {
        let public = public_prefixes.iter().any(|prefix| {
            let prefix = prefix.trim_end_matches('/');
            !prefix.is_empty()
                && (path == prefix
                    || path
                        .strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with('/')))
        });
        if public { PathClass::Public } else { PathClass::TenantScoped }
    }
}

/// Where the tenant identifier came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantSource {
    Session,
    ChatTenant,
    /// `?tenant=` on a public path; the caller should remember it as the chat tenant.
    Query,
}

/// Outcome of resolving one request.
#[derive(Debug)]
pub enum Resolution {
    Resolved(RequestContext, TenantSource),
    /// Public path with no resolvable tenant.
    Anonymous,
    /// Tenant-scoped path without a session: redirect to login.
    LoginRequired,
    /// Session is half-populated or points at a vanished tenant: destroy it, then redirect.
    CorruptedSession,
}

pub struct TenantResolver {
    platform: Arc<PlatformDb>,
    stores: Arc<StoreRegistry>,
    public_prefixes: Vec<String>,
}

impl TenantResolver {
    pub fn new(platform: Arc<PlatformDb>, stores: Arc<StoreRegistry>, public_prefixes: Vec<String>) -> Self {
        Self { platform, stores, public_prefixes }
    }

    pub fn classify(&self, path: &str) -> PathClass {
        PathClass::classify(path, &self.public_prefixes)
    }

    /// Resolve the tenant for a request.
    ///
    /// Errors only on platform/store failures, which the caller turns into a 500
    /// for this request alone.
    pub fn resolve(&self, path: &str, session: Option<&Session>, query_tenant: Option<&str>) -> Result<Resolution> {
        match self.classify(path) {
            PathClass::TenantScoped => self.resolve_scoped(session),
            PathClass::Public => self.resolve_public(session, query_tenant),
        }
    }

    fn resolve_scoped(&self, session: Option<&Session>) -> Result<Resolution> {
        let Some(session) = session else {
            return Ok(Resolution::LoginRequired);
        };
        match (&session.user_id, &session.tenant_id) {
            (None, None) => Ok(Resolution::LoginRequired),
            (Some(_), Some(tenant_id)) => match self.platform.get_tenant(tenant_id)? {
                Some(tenant) => Ok(Resolution::Resolved(self.attach(&tenant)?, TenantSource::Session)),
                None => {
                    tracing::warn!("Session references unknown tenant {tenant_id}");
                    Ok(Resolution::CorruptedSession)
                }
            },
            _ => Ok(Resolution::CorruptedSession),
        }
    }

    /// Public order: logged-in session tenant, then `?tenant=` (slug or id),
    /// then the remembered chat tenant.
    fn resolve_public(&self, session: Option<&Session>, query_tenant: Option<&str>) -> Result<Resolution> {
        if let Some(s) = session
            && let Some(id) = s.tenant_id.as_deref()
        {
            if s.user_id.is_none() {
                tracing::debug!("Ignoring session tenant {id} without a user on a public path");
            } else if let Some(tenant) = self.platform.get_tenant(id)? {
                return Ok(Resolution::Resolved(self.attach(&tenant)?, TenantSource::Session));
            }
        }

        if let Some(key) = query_tenant.filter(|k| !k.is_empty()) {
            let tenant = match self.platform.get_tenant_by_slug(key)? {
                Some(t) => Some(t),
                None => self.platform.get_tenant(key)?,
            };
            if let Some(tenant) = tenant {
                return Ok(Resolution::Resolved(self.attach(&tenant)?, TenantSource::Query));
            }
        }

        if let Some(id) = session.and_then(|s| s.chat_tenant.as_deref())
            && let Some(tenant) = self.platform.get_tenant(id)?
        {
            return Ok(Resolution::Resolved(self.attach(&tenant)?, TenantSource::ChatTenant));
        }
        Ok(Resolution::Anonymous)
    }

    /// Open (or reuse) the tenant's store and build the request snapshot.
    fn attach(&self, tenant: &Tenant) -> Result<RequestContext> {
        let store = self.stores.get_or_open(&tenant.id).inspect_err(|e| {
            tracing::error!("❌ Tenant store unavailable for {} ({}): {e}", tenant.slug, tenant.id);
        })?;
        let trial_expired = tenant.is_trial_expired(chrono::Utc::now());
        if trial_expired {
            tracing::debug!("Tenant {} is degraded (inactive or trial expired)", tenant.slug);
        }
        Ok(RequestContext {
            tenant_id: tenant.id.clone(),
            tenant_slug: tenant.slug.clone(),
            store,
            trial_expired,
        })
    }
}
