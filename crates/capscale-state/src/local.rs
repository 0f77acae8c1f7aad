//! Control-plane and progress collaborators over the state store.
//!
//! `LocalControlPlane` stands in for the remote control plane: the redb
//! store is the source of truth for tenant capacity. `CheckpointRecorder`
//! persists batch progress so an interrupted batch can resume.

use tracing::{debug, warn};

use capscale_core::{CapacityError, CapacityResult, TenantState};
use capscale_engine::{BoxFuture, CapacityApplier, Checkpoint, ProgressSink, TenantStateSource};

use crate::store::StateStore;

/// Tenant capacity held in the local store.
#[derive(Clone)]
pub struct LocalControlPlane {
    store: StateStore,
}

impl LocalControlPlane {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }
}

impl TenantStateSource for LocalControlPlane {
    fn fetch_state<'a>(&'a self, tenant: &'a str) -> BoxFuture<'a, CapacityResult<TenantState>> {
        Box::pin(async move {
            match self.store.get_tenant(tenant)? {
                Some(record) => Ok(record.state),
                None => Err(CapacityError::NotFound(tenant.to_string())),
            }
        })
    }
}

impl CapacityApplier for LocalControlPlane {
    fn apply_enable<'a>(
        &'a self,
        tenant: &'a str,
        units: u32,
    ) -> BoxFuture<'a, CapacityResult<bool>> {
        Box::pin(async move {
            self.store
                .put_tenant(tenant, TenantState::provisioned(units))
                .map_err(|e| CapacityError::apply(tenant, e))?;
            Ok(true)
        })
    }

    fn apply_disable<'a>(&'a self, tenant: &'a str) -> BoxFuture<'a, CapacityResult<bool>> {
        Box::pin(async move {
            self.store
                .put_tenant(tenant, TenantState::on_demand())
                .map_err(|e| CapacityError::apply(tenant, e))?;
            Ok(true)
        })
    }
}

/// Persists every checkpoint under one batch id.
#[derive(Clone)]
pub struct CheckpointRecorder {
    store: StateStore,
    batch_id: String,
}

impl CheckpointRecorder {
    pub fn new(store: StateStore, batch_id: impl Into<String>) -> Self {
        Self {
            store,
            batch_id: batch_id.into(),
        }
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }
}

impl ProgressSink for CheckpointRecorder {
    fn checkpoint(&self, checkpoint: Checkpoint) {
        match self.store.put_checkpoint(&self.batch_id, checkpoint) {
            Ok(()) => debug!(
                batch = %self.batch_id,
                processed = checkpoint.processed,
                total = checkpoint.total,
                "checkpoint saved"
            ),
            Err(e) => warn!(batch = %self.batch_id, error = %e, "failed to save checkpoint"),
        }
    }
}
