//! Reconciliation policies: turn a recommendation and the tenant's actual
//! state into a discrete action.

use std::fmt;

use serde::{Deserialize, Serialize};

use capscale_core::{
    CapacityMode, LoadSnapshot, PolicyConfig, PolicyKind, TenantId, TenantState,
};

use crate::engine::{DecisionEngine, derive_mode};

/// Discrete action taken on one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    None,
    Enable,
    Disable,
    /// Provisioned at a different size; applied through enable.
    Resize,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::None => "none",
            ActionKind::Enable => "enable",
            ActionKind::Disable => "disable",
            ActionKind::Resize => "resize",
        }
    }

    pub fn is_side_effect(&self) -> bool {
        !matches!(self, ActionKind::None)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sizing output for one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub tenant: TenantId,
    pub limit: f64,
    pub load: f64,
    pub recommended_units: u32,
    pub recommended_mode: CapacityMode,
    pub current_mode: CapacityMode,
    pub current_units: Option<u32>,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = TenantState {
            mode: self.current_mode,
            units: self.current_units,
        };
        write!(
            f,
            "{}: limit={:.1} load={:.1} current={} recommended={}",
            self.tenant,
            self.limit,
            self.load,
            current,
            TenantState::from_units(Some(self.recommended_units)),
        )
    }
}

/// Action chosen for one tenant, with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDecision {
    pub tenant: TenantId,
    pub kind: ActionKind,
    pub reason: String,
    /// Target unit count for enable and resize.
    pub units: Option<u32>,
    /// State observed when the decision was made.
    pub current: TenantState,
}

impl ActionDecision {
    pub fn none(tenant: &str, current: TenantState, reason: impl Into<String>) -> Self {
        Self {
            tenant: tenant.to_string(),
            kind: ActionKind::None,
            reason: reason.into(),
            units: None,
            current,
        }
    }
}

impl fmt::Display for ActionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.units) {
            (ActionKind::Enable, Some(n)) => {
                write!(f, "[{}] enable with {n} TRUs: {}", self.tenant, self.reason)
            }
            (ActionKind::Resize, Some(n)) => write!(
                f,
                "[{}] resize {} -> {n} TRUs: {}",
                self.tenant,
                self.current.units_or_zero(),
                self.reason
            ),
            (kind, _) => write!(f, "[{}] {kind}: {}", self.tenant, self.reason),
        }
    }
}

/// Recommendation and action for one tenant.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub recommendation: Recommendation,
    pub action: ActionDecision,
}

/// Compare a target unit count with the actual state.
pub fn reconcile(
    tenant: &str,
    current: TenantState,
    target_units: u32,
    reason: impl Into<String>,
) -> ActionDecision {
    let reason = reason.into();
    let (kind, units) = match (current.mode, target_units) {
        (CapacityMode::OnDemand, 0) => {
            return ActionDecision::none(tenant, current, format!("already on-demand; {reason}"));
        }
        (CapacityMode::Provisioned, 0) => (ActionKind::Disable, None),
        (CapacityMode::OnDemand, n) => (ActionKind::Enable, Some(n)),
        (CapacityMode::Provisioned, n) if current.units == Some(n) => {
            return ActionDecision::none(
                tenant,
                current,
                format!("already provisioned at {n} TRUs; {reason}"),
            );
        }
        (CapacityMode::Provisioned, n) => (ActionKind::Resize, Some(n)),
    };
    ActionDecision {
        tenant: tenant.to_string(),
        kind,
        reason,
        units,
        current,
    }
}

/// Legacy switch: disable idle provisioned tenants, enable throttled
/// on-demand tenants at a fixed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPolicy {
    pub default_units: u32,
    pub min_actions_threshold: u64,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            default_units: 5,
            min_actions_threshold: 100,
        }
    }
}

impl ThresholdPolicy {
    pub fn decide(&self, snapshot: &LoadSnapshot, current: TenantState) -> ActionDecision {
        let tenant = snapshot.tenant.as_str();
        match current.mode {
            CapacityMode::Provisioned => {
                let per_hour = snapshot.actions_per_hour();
                if per_hour < self.min_actions_threshold {
                    ActionDecision {
                        tenant: tenant.to_string(),
                        kind: ActionKind::Disable,
                        reason: format!(
                            "actions per hour ({per_hour}) below threshold ({})",
                            self.min_actions_threshold
                        ),
                        units: None,
                        current,
                    }
                } else {
                    ActionDecision::none(
                        tenant,
                        current,
                        format!(
                            "actions per hour ({per_hour}) at or above threshold ({})",
                            self.min_actions_threshold
                        ),
                    )
                }
            }
            CapacityMode::OnDemand => {
                if snapshot.is_throttled() {
                    ActionDecision {
                        tenant: tenant.to_string(),
                        kind: ActionKind::Enable,
                        reason: format!(
                            "tenant is being throttled ({:.2}% of requests rejected)",
                            snapshot.throttle_percentage()
                        ),
                        units: Some(self.default_units),
                        current,
                    }
                } else {
                    ActionDecision::none(tenant, current, "on-demand and not throttled")
                }
            }
        }
    }
}

/// The active reconciliation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecisionPolicy {
    /// Size with the decision engine, then reconcile.
    #[default]
    MetricsDriven,
    Threshold(ThresholdPolicy),
}

impl DecisionPolicy {
    pub fn from_config(config: &PolicyConfig) -> Self {
        match config.kind {
            PolicyKind::Metrics => DecisionPolicy::MetricsDriven,
            PolicyKind::Threshold => DecisionPolicy::Threshold(ThresholdPolicy {
                default_units: config.default_units,
                min_actions_threshold: config.min_actions_threshold,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DecisionPolicy::MetricsDriven => "metrics",
            DecisionPolicy::Threshold(_) => "threshold",
        }
    }

    /// Decide one tenant. Pure: no I/O, no shared state.
    pub fn decide(
        &self,
        engine: &DecisionEngine,
        snapshot: &LoadSnapshot,
        current: TenantState,
    ) -> Decision {
        let action = match self {
            DecisionPolicy::MetricsDriven => {
                let sizing = engine.size(snapshot.limit, snapshot.load);
                reconcile(&snapshot.tenant, current, sizing.units, sizing.reason.to_string())
            }
            DecisionPolicy::Threshold(policy) => policy.decide(snapshot, current),
        };

        let recommended_units = match action.kind {
            ActionKind::Enable | ActionKind::Resize => action.units.unwrap_or(0),
            ActionKind::Disable => 0,
            ActionKind::None => current.units_or_zero(),
        };

        Decision {
            recommendation: Recommendation {
                tenant: snapshot.tenant.clone(),
                limit: snapshot.limit,
                load: snapshot.load,
                recommended_units,
                recommended_mode: derive_mode(recommended_units),
                current_mode: current.mode,
                current_units: current.units,
            },
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decide(snapshot: LoadSnapshot, current: TenantState) -> Decision {
        DecisionPolicy::MetricsDriven.decide(&DecisionEngine::default(), &snapshot, current)
    }

    #[test]
    fn reconcile_table() {
        let on_demand = TenantState::on_demand();
        let five = TenantState::provisioned(5);

        assert_eq!(reconcile("ns", on_demand, 0, "r").kind, ActionKind::None);
        assert_eq!(reconcile("ns", five, 0, "r").kind, ActionKind::Disable);

        let enable = reconcile("ns", on_demand, 3, "r");
        assert_eq!(enable.kind, ActionKind::Enable);
        assert_eq!(enable.units, Some(3));

        assert_eq!(reconcile("ns", five, 5, "r").kind, ActionKind::None);

        let resize = reconcile("ns", five, 8, "r");
        assert_eq!(resize.kind, ActionKind::Resize);
        assert_eq!(resize.units, Some(8));
        assert_eq!(resize.current, five);
    }

    #[test]
    fn metrics_policy_enables_overloaded_base_tier() {
        let decision = decide(LoadSnapshot::new("ns1", 500.0, 1200.0), TenantState::on_demand());
        assert_eq!(decision.recommendation.recommended_units, 3);
        assert_eq!(decision.recommendation.recommended_mode, CapacityMode::Provisioned);
        assert_eq!(decision.action.kind, ActionKind::Enable);
        assert_eq!(decision.action.units, Some(3));
        assert!(decision.action.reason.contains("exceeds base capacity"));
    }

    #[test]
    fn metrics_policy_disables_idle_provisioned() {
        let decision = decide(
            LoadSnapshot::new("ns2", 2500.0, 200.0),
            TenantState::provisioned(5),
        );
        assert_eq!(decision.recommendation.recommended_units, 0);
        assert_eq!(decision.recommendation.recommended_mode, CapacityMode::OnDemand);
        assert_eq!(decision.recommendation.current_units, Some(5));
        assert_eq!(decision.action.kind, ActionKind::Disable);
    }

    #[test]
    fn metrics_policy_resizes_on_high_utilization() {
        let decision = decide(
            LoadSnapshot::new("ns", 1000.0, 900.0),
            TenantState::provisioned(2),
        );
        assert_eq!(decision.action.kind, ActionKind::Resize);
        assert_eq!(decision.action.units, Some(3));
        assert_eq!(
            decision.action.to_string(),
            "[ns] resize 2 -> 3 TRUs: utilization 90.0% at or above 80%"
        );
    }

    #[test]
    fn metrics_policy_uses_actual_state_over_limit() {
        // Limit says base tier, control plane says provisioned at 3: the
        // recommendation is 0, so the actual provisioning is disabled.
        let decision = decide(LoadSnapshot::new("ns", 500.0, 100.0), TenantState::provisioned(3));
        assert_eq!(decision.action.kind, ActionKind::Disable);
    }

    #[test]
    fn threshold_policy_disables_idle() {
        let policy = ThresholdPolicy::default();
        // 0.01/s → 36 per hour.
        let snap = LoadSnapshot::new("ns", 2500.0, 0.01);
        let action = policy.decide(&snap, TenantState::provisioned(5));
        assert_eq!(action.kind, ActionKind::Disable);
        assert!(action.reason.contains("(36) below threshold (100)"));

        let busy = LoadSnapshot::new("ns", 2500.0, 1.0);
        assert_eq!(
            policy.decide(&busy, TenantState::provisioned(5)).kind,
            ActionKind::None
        );
    }

    #[test]
    fn threshold_policy_enables_throttled() {
        let policy = ThresholdPolicy {
            default_units: 4,
            min_actions_threshold: 100,
        };
        let throttled = LoadSnapshot::new("ns", 500.0, 100.0).with_rejected(10.0);
        let action = policy.decide(&throttled, TenantState::on_demand());
        assert_eq!(action.kind, ActionKind::Enable);
        assert_eq!(action.units, Some(4));
        assert!(action.reason.contains("10.00%"));

        let calm = LoadSnapshot::new("ns", 500.0, 100.0);
        assert_eq!(
            policy.decide(&calm, TenantState::on_demand()).kind,
            ActionKind::None
        );
    }

    #[test]
    fn threshold_recommendation_tracks_action() {
        let policy = DecisionPolicy::Threshold(ThresholdPolicy::default());
        let engine = DecisionEngine::default();

        let snap = LoadSnapshot::new("ns", 500.0, 100.0).with_rejected(1.0);
        let decision = policy.decide(&engine, &snap, TenantState::on_demand());
        assert_eq!(decision.recommendation.recommended_units, 5);

        let steady = policy.decide(
            &engine,
            &LoadSnapshot::new("ns", 2500.0, 50.0),
            TenantState::provisioned(5),
        );
        assert_eq!(steady.action.kind, ActionKind::None);
        assert_eq!(steady.recommendation.recommended_units, 5);
    }

    #[test]
    fn policy_from_config() {
        let mut config = PolicyConfig::default();
        assert_eq!(DecisionPolicy::from_config(&config), DecisionPolicy::MetricsDriven);

        config.kind = PolicyKind::Threshold;
        config.default_units = 7;
        assert_eq!(
            DecisionPolicy::from_config(&config),
            DecisionPolicy::Threshold(ThresholdPolicy {
                default_units: 7,
                min_actions_threshold: 100,
            })
        );
    }
}
