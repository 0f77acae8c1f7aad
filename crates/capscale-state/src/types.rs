//! Records persisted by the state store.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use capscale_core::{TenantId, TenantState};
use capscale_engine::BatchResult;

/// A tenant's capacity as held by the local control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub tenant: TenantId,
    pub state: TenantState,
    pub updated_at: DateTime<Utc>,
}

impl TenantRecord {
    pub fn new(tenant: impl Into<TenantId>, state: TenantState) -> Self {
        Self {
            tenant: tenant.into(),
            state,
            updated_at: Utc::now(),
        }
    }
}

/// Summary of a finished batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub cancelled: bool,
    pub checked: usize,
    pub enabled: Vec<String>,
    pub disabled: Vec<String>,
    pub resized: Vec<String>,
    pub errors: Vec<String>,
    pub summary: String,
}

impl RunRecord {
    pub fn from_batch(result: &BatchResult) -> Self {
        Self {
            started_at: result.started_at,
            finished_at: result.finished_at,
            dry_run: result.dry_run,
            cancelled: result.cancelled,
            checked: result.checked,
            enabled: result.enabled.clone(),
            disabled: result.disabled.clone(),
            resized: result.resized.clone(),
            errors: result.errors.clone(),
            summary: result.to_string(),
        }
    }

    pub fn table_key(&self) -> String {
        self.started_at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}
