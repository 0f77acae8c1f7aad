//! Idempotent application of capacity actions.
//!
//! Every side effect is preceded by a fresh read of the tenant's state; if
//! the tenant is already at the target, the applier is not called. Retrying
//! an interrupted batch therefore never double-applies.

use tracing::{debug, info};

use capscale_core::{CapacityError, CapacityMode, CapacityResult, TenantState};

use crate::policy::{ActionDecision, ActionKind};
use crate::sources::{CapacityApplier, TenantStateSource};

/// What happened when an action was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The control plane was changed.
    Applied,
    /// The tenant was already at the target; nothing was sent.
    AlreadySatisfied,
}

/// Apply one decision. `ActionKind::None` is always satisfied.
pub async fn apply_decision(
    states: &dyn TenantStateSource,
    applier: &dyn CapacityApplier,
    decision: &ActionDecision,
) -> CapacityResult<ApplyOutcome> {
    match (decision.kind, decision.units) {
        (ActionKind::None, _) => Ok(ApplyOutcome::AlreadySatisfied),
        (ActionKind::Disable, _) => ensure_on_demand(states, applier, &decision.tenant).await,
        (ActionKind::Enable | ActionKind::Resize, Some(units)) => {
            ensure_provisioned(states, applier, &decision.tenant, units).await
        }
        (kind, None) => Err(CapacityError::apply(
            &decision.tenant,
            format!("{kind} decision without a unit count"),
        )),
    }
}

/// Provision `units` unless the tenant already has exactly that.
pub async fn ensure_provisioned(
    states: &dyn TenantStateSource,
    applier: &dyn CapacityApplier,
    tenant: &str,
    units: u32,
) -> CapacityResult<ApplyOutcome> {
    let current = reread(states, tenant).await?;
    if current.is_provisioned_at(units) {
        debug!(tenant, units, "already provisioned at target");
        return Ok(ApplyOutcome::AlreadySatisfied);
    }

    let accepted = applier
        .apply_enable(tenant, units)
        .await
        .map_err(|e| into_apply_error(tenant, e))?;
    if !accepted {
        return Err(CapacityError::apply(tenant, "control plane rejected enable"));
    }
    info!(tenant, from = %current, to = units, "provisioned capacity");
    Ok(ApplyOutcome::Applied)
}

/// Return the tenant to on-demand unless it already is.
pub async fn ensure_on_demand(
    states: &dyn TenantStateSource,
    applier: &dyn CapacityApplier,
    tenant: &str,
) -> CapacityResult<ApplyOutcome> {
    let current = reread(states, tenant).await?;
    if current.mode == CapacityMode::OnDemand {
        debug!(tenant, "already on-demand");
        return Ok(ApplyOutcome::AlreadySatisfied);
    }

    let accepted = applier
        .apply_disable(tenant)
        .await
        .map_err(|e| into_apply_error(tenant, e))?;
    if !accepted {
        return Err(CapacityError::apply(tenant, "control plane rejected disable"));
    }
    info!(tenant, from = %current, "returned to on-demand");
    Ok(ApplyOutcome::Applied)
}

// A tenant the control plane does not know is on-demand.
async fn reread(states: &dyn TenantStateSource, tenant: &str) -> CapacityResult<TenantState> {
    match states.fetch_state(tenant).await {
        Ok(state) => Ok(state),
        Err(e) if e.is_not_found() => Ok(TenantState::on_demand()),
        Err(e) => Err(CapacityError::apply(tenant, format!("state re-read failed: {e}"))),
    }
}

fn into_apply_error(tenant: &str, err: CapacityError) -> CapacityError {
    match err {
        CapacityError::ApplyAction { .. } => err,
        other => CapacityError::apply(tenant, other),
    }
}
