//! Per-tenant refresh serialization.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use prep_model::TenantId;

use crate::error::RefreshError;

/// One mutex per tenant. A refresh cycle holds its tenant's lock from change
/// detection through commit; different tenants never contend.
#[derive(Debug, Default)]
pub struct TenantLocks {
    locks: Mutex<BTreeMap<TenantId, Arc<Mutex<()>>>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for a tenant, created on first use.
    pub fn handle(&self, tenant_id: TenantId) -> Result<Arc<Mutex<()>>, RefreshError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| RefreshError::LockPoisoned { tenant_id })?;
        Ok(Arc::clone(locks.entry(tenant_id).or_default()))
    }

    pub fn tenant_count(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}
