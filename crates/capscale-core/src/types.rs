//! Shared types used across capscale crates.
//!
//! Everything here is transient: built fresh for each evaluation cycle
//! and never owned across cycles by the decision core.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque tenant key (a namespace name on the control plane).
pub type TenantId = String;

/// How a tenant's capacity is provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CapacityMode {
    /// Shared base tier. Equivalent to 0 or 1 unit.
    #[default]
    OnDemand,
    /// Dedicated capacity with two or more units.
    Provisioned,
}

impl CapacityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapacityMode::OnDemand => "on-demand",
            CapacityMode::Provisioned => "provisioned",
        }
    }
}

impl fmt::Display for CapacityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tenant's entry in the bulk load snapshot.
///
/// `limit` and `load` share a unit (actions per second). `rejected` is the
/// rate of requests turned away for exhausted capacity; it is only
/// consulted by the threshold policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSnapshot {
    pub tenant: TenantId,
    pub limit: f64,
    pub load: f64,
    #[serde(default)]
    pub rejected: f64,
}

impl LoadSnapshot {
    pub fn new(tenant: impl Into<TenantId>, limit: f64, load: f64) -> Self {
        Self {
            tenant: tenant.into(),
            limit,
            load,
            rejected: 0.0,
        }
    }

    pub fn with_rejected(mut self, rejected: f64) -> Self {
        self.rejected = rejected;
        self
    }

    /// Observed throughput converted to actions per hour.
    pub fn actions_per_hour(&self) -> u64 {
        if self.load.is_finite() && self.load > 0.0 {
            (self.load * 3600.0) as u64
        } else {
            0
        }
    }

    /// Whether the control plane is rejecting requests for this tenant.
    pub fn is_throttled(&self) -> bool {
        self.rejected > 0.0
    }

    /// Rejected share of observed load, as a percentage.
    pub fn throttle_percentage(&self) -> f64 {
        if self.is_throttled() && self.load > 0.0 {
            self.rejected / self.load * 100.0
        } else {
            0.0
        }
    }
}

/// Actual capacity of a tenant as read from the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TenantState {
    pub mode: CapacityMode,
    /// Unit count, present only when provisioned.
    pub units: Option<u32>,
}

impl TenantState {
    pub fn on_demand() -> Self {
        Self {
            mode: CapacityMode::OnDemand,
            units: None,
        }
    }

    pub fn provisioned(units: u32) -> Self {
        Self {
            mode: CapacityMode::Provisioned,
            units: Some(units),
        }
    }

    /// Build a state from a raw unit count the way the control plane
    /// reports it: anything above zero is provisioned.
    pub fn from_units(units: Option<u32>) -> Self {
        match units {
            Some(n) if n > 0 => Self::provisioned(n),
            _ => Self::on_demand(),
        }
    }

    /// Unit count with on-demand reported as 0.
    pub fn units_or_zero(&self) -> u32 {
        match self.mode {
            CapacityMode::OnDemand => 0,
            CapacityMode::Provisioned => self.units.unwrap_or(0),
        }
    }

    pub fn is_provisioned_at(&self, units: u32) -> bool {
        self.mode == CapacityMode::Provisioned && self.units == Some(units)
    }
}

impl fmt::Display for TenantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.mode, self.units) {
            (CapacityMode::Provisioned, Some(n)) => write!(f, "provisioned ({n} TRUs)"),
            (mode, _) => write!(f, "{mode}"),
        }
    }
}

/// Notification severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}
