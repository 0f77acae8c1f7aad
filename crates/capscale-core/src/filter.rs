//! Allow/deny filtering of managed tenants.

use serde::{Deserialize, Serialize};

/// Decides which tenants the autoscaler may touch.
///
/// An empty allowlist admits everything; the denylist always wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantFilter {
    pub allowlist: Vec<String>,
    pub denylist: Vec<String>,
}

impl TenantFilter {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn should_manage(&self, tenant: &str) -> bool {
        if !self.allowlist.is_empty() && !self.allowlist.iter().any(|t| t == tenant) {
            return false;
        }
        !self.denylist.iter().any(|t| t == tenant)
    }

    /// Parse a comma-separated list, dropping blank entries.
    pub fn parse_list(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}
