//! Process-wide cache of open tenant stores.

use crate::store::TenantStore;
use helpdesk_core::error::{HelpdeskError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Opens each tenant store at most once and hands out shared handles.
pub struct StoreRegistry {
    data_dir: PathBuf,
    stores: RwLock<HashMap<String, Arc<TenantStore>>>,
}

/// Tenant ids become file names; anything outside this alphabet is refused.
fn is_safe_id(tenant_id: &str) -> bool {
    !tenant_id.is_empty()
        && tenant_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl StoreRegistry {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            stores: RwLock::new(HashMap::new()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of a tenant's store file.
    pub fn store_path(&self, tenant_id: &str) -> PathBuf {
        self.data_dir.join(format!("{tenant_id}.db"))
    }

    /// Return the cached store for a tenant, opening (and creating) it on first use.
    pub fn get_or_open(&self, tenant_id: &str) -> Result<Arc<TenantStore>> {
        if !is_safe_id(tenant_id) {
            return Err(HelpdeskError::tenant(format!("invalid tenant id '{tenant_id}'")));
        }

        if let Some(store) = self
            .stores
            .read()
            .map_err(|e| HelpdeskError::store(format!("Registry lock poisoned: {e}")))?
            .get(tenant_id)
        {
            return Ok(Arc::clone(store));
        }

        let mut stores = self
            .stores
            .write()
            .map_err(|e| HelpdeskError::store(format!("Registry lock poisoned: {e}")))?;
        // Another request may have opened it while we waited for the write lock.
        if let Some(store) = stores.get(tenant_id) {
            return Ok(Arc::clone(store));
        }

        std::fs::create_dir_all(&self.data_dir)?;
        let path = self.store_path(tenant_id);
        let store = Arc::new(TenantStore::open(&path)?);
        tracing::info!("🗄️ Opened tenant store {} ({})", tenant_id, path.display());
        stores.insert(tenant_id.to_string(), Arc::clone(&store));
        Ok(store)
    }

    pub fn open_count(&self) -> usize {
        self.stores.read().map(|s| s.len()).unwrap_or(0)
    }
}
