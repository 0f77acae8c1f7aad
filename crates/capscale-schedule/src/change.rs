//! Scheduled change runner: drives one change through its phases.
//!
//! Each write goes through the idempotent apply helpers, so rerunning a
//! change that was interrupted never double-applies. Verification reads the
//! control plane after `verify_delay`; a tenant the control plane does not
//! know counts as on-demand.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use capscale_core::{CapacityError, CapacityMode, CapacityResult, Severity, TenantId, TenantState};
use capscale_engine::{
    CapacityApplier, Notifier, TenantStateSource, TracingNotifier, ensure_on_demand,
    ensure_provisioned,
};

/// Wait between a write and its verification read.
pub const DEFAULT_VERIFY_DELAY: Duration = Duration::from_secs(120);

/// Wall-clock source used to compute the hold until the end time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// An operator request to hold a tenant at a fixed capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledChange {
    pub tenant: TenantId,
    /// Provisioned units to set. At least 2.
    pub desired_units: u32,
    /// When set, the tenant returns to on-demand at this time.
    pub end_time: Option<DateTime<Utc>>,
}

impl ScheduledChange {
    pub fn new(
        tenant: impl Into<TenantId>,
        desired_units: u32,
        end_time: Option<DateTime<Utc>>,
    ) -> CapacityResult<Self> {
        let change = Self {
            tenant: tenant.into(),
            desired_units,
            end_time,
        };
        change.validate()?;
        Ok(change)
    }

    pub fn validate(&self) -> CapacityResult<()> {
        if self.tenant.trim().is_empty() {
            return Err(CapacityError::Configuration(
                "scheduled change requires a tenant".into(),
            ));
        }
        if self.desired_units < 2 {
            return Err(CapacityError::Configuration(format!(
                "scheduled change requires at least 2 units, got {}",
                self.desired_units
            )));
        }
        Ok(())
    }
}

/// Where a scheduled change is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangePhase {
    Pending,
    Enabling { units: u32 },
    Verifying,
    /// Provisioned and waiting for the end time.
    Holding { until: DateTime<Utc> },
    Reverting,
    VerifyingRevert,
    Completed,
    Failed { reason: String },
}

impl fmt::Display for ChangePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangePhase::Pending => f.write_str("pending"),
            ChangePhase::Enabling { units } => write!(f, "enabling {units} TRUs"),
            ChangePhase::Verifying => f.write_str("verifying"),
            ChangePhase::Holding { until } => write!(f, "holding until {}", until.to_rfc3339()),
            ChangePhase::Reverting => f.write_str("reverting"),
            ChangePhase::VerifyingRevert => f.write_str("verifying revert"),
            ChangePhase::Completed => f.write_str("completed"),
            ChangePhase::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Outcome of one scheduled change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledChangeResult {
    pub tenant: TenantId,
    pub desired_units: u32,
    pub end_time: Option<DateTime<Utc>>,
    pub initial_change_success: bool,
    pub verification_success: bool,
    pub reverted_to_on_demand: bool,
    pub revert_verification_success: bool,
    pub errors: Vec<String>,
    pub phase: ChangePhase,
    pub dry_run: bool,
}

impl ScheduledChangeResult {
    fn new(change: &ScheduledChange, dry_run: bool) -> Self {
        Self {
            tenant: change.tenant.clone(),
            desired_units: change.desired_units,
            end_time: change.end_time,
            initial_change_success: false,
            verification_success: false,
            reverted_to_on_demand: false,
            revert_verification_success: false,
            errors: Vec::new(),
            phase: ChangePhase::Pending,
            dry_run,
        }
    }

    pub fn is_success(&self) -> bool {
        self.initial_change_success && self.errors.is_empty()
    }

    fn revert_attempted(&self) -> bool {
        self.end_time.is_some() && self.verification_success
    }
}

impl fmt::Display for ScheduledChangeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            f.write_str("[DRY RUN] ")?;
        }
        let status = if self.is_success() { "SUCCESS" } else { "FAILED" };
        write!(f, "[{status}] {}: ", self.tenant)?;

        if !self.initial_change_success {
            f.write_str("provisioning failed")?;
        } else if self.verification_success {
            f.write_str("provisioning enabled and verified")?;
        } else {
            f.write_str("provisioning enabled but not verified")?;
        }

        if self.revert_attempted() {
            match (self.reverted_to_on_demand, self.revert_verification_success) {
                (true, true) => f.write_str(", reverted to on-demand and verified")?,
                (true, false) => f.write_str(", reverted to on-demand but not verified")?,
                (false, _) => f.write_str(", revert to on-demand failed")?,
            }
        }

        if !self.errors.is_empty() {
            write!(f, ", {} error(s)", self.errors.len())?;
        }
        Ok(())
    }
}

/// Runs scheduled changes against a control plane.
pub struct ScheduledChangeRunner {
    states: Arc<dyn TenantStateSource>,
    applier: Arc<dyn CapacityApplier>,
    notifier: Arc<dyn Notifier>,
    verify_delay: Duration,
    clock: Clock,
    dry_run: bool,
}

impl ScheduledChangeRunner {
    pub fn new(states: Arc<dyn TenantStateSource>, applier: Arc<dyn CapacityApplier>) -> Self {
        Self {
            states,
            applier,
            notifier: Arc::new(TracingNotifier),
            verify_delay: DEFAULT_VERIFY_DELAY,
            clock: system_clock(),
            dry_run: false,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_verify_delay(mut self, delay: Duration) -> Self {
        self.verify_delay = delay;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Simulate writes and skip verification reads.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Drive a change to completion. Failures are reported in the result,
    /// never returned as errors.
    pub async fn run(&self, change: &ScheduledChange) -> ScheduledChangeResult {
        let mut result = ScheduledChangeResult::new(change, self.dry_run);
        if let Err(e) = change.validate() {
            result.errors.push(e.to_string());
            return finish(result);
        }

        let tenant = change.tenant.as_str();
        let units = change.desired_units;
        info!(
            tenant,
            units,
            end_time = ?change.end_time,
            dry_run = self.dry_run,
            "starting scheduled capacity change"
        );

        transition(&mut result, ChangePhase::Enabling { units });
        if let Err(e) = self.enable(tenant, units).await {
            let msg = format!("failed to enable provisioning for {tenant}: {e}");
            error!(tenant, error = %e, "scheduled enable failed");
            self.notify(
                &format!("Scheduled capacity change failed for {tenant}: {e}"),
                Severity::Critical,
            )
            .await;
            result.errors.push(msg);
            return finish(result);
        }
        result.initial_change_success = true;

        tokio::time::sleep(self.verify_delay).await;
        transition(&mut result, ChangePhase::Verifying);
        result.verification_success = self
            .verify(tenant, TenantState::provisioned(units), &mut result.errors)
            .await;

        let Some(end_time) = change.end_time else {
            return finish(result);
        };
        if !result.verification_success {
            warn!(tenant, "verification did not pass; leaving capacity for manual review");
            return finish(result);
        }

        transition(&mut result, ChangePhase::Holding { until: end_time });
        let now = (self.clock)();
        match (end_time - now).to_std() {
            Ok(wait) if !wait.is_zero() => {
                info!(
                    tenant,
                    end_time = %end_time.to_rfc3339(),
                    wait_secs = wait.as_secs(),
                    "holding until end time"
                );
                tokio::time::sleep(wait).await;
            }
            _ => warn!(
                tenant,
                end_time = %end_time.to_rfc3339(),
                now = %now.to_rfc3339(),
                "end time already passed, reverting immediately"
            ),
        }

        transition(&mut result, ChangePhase::Reverting);
        if let Err(e) = self.disable(tenant).await {
            let msg = format!("failed to revert {tenant} to on-demand: {e}");
            error!(tenant, error = %e, "scheduled revert failed");
            self.notify(
                &format!("Failed to revert {tenant} to on-demand: {e}"),
                Severity::Critical,
            )
            .await;
            result.errors.push(msg);
            return finish(result);
        }
        result.reverted_to_on_demand = true;

        tokio::time::sleep(self.verify_delay).await;
        transition(&mut result, ChangePhase::VerifyingRevert);
        result.revert_verification_success = self
            .verify(tenant, TenantState::on_demand(), &mut result.errors)
            .await;
        if result.revert_verification_success {
            self.notify(
                &format!("Reverted {tenant} to on-demand"),
                Severity::Info,
            )
            .await;
        }

        finish(result)
    }

    async fn enable(&self, tenant: &str, units: u32) -> CapacityResult<()> {
        if self.dry_run {
            info!(tenant, units, "dry run: would provision");
            return Ok(());
        }
        ensure_provisioned(&*self.states, &*self.applier, tenant, units).await?;
        Ok(())
    }

    async fn disable(&self, tenant: &str) -> CapacityResult<()> {
        if self.dry_run {
            info!(tenant, "dry run: would return to on-demand");
            return Ok(());
        }
        ensure_on_demand(&*self.states, &*self.applier, tenant).await?;
        Ok(())
    }

    async fn verify(&self, tenant: &str, expected: TenantState, errors: &mut Vec<String>) -> bool {
        if self.dry_run {
            debug!(tenant, %expected, "dry run: verification skipped");
            return true;
        }

        let actual = match self.states.fetch_state(tenant).await {
            Ok(state) => state,
            Err(e) if e.is_not_found() => TenantState::on_demand(),
            Err(e) => {
                error!(tenant, error = %e, "capacity verification read failed");
                self.notify(
                    &format!("Capacity verification error for {tenant}: {e}"),
                    Severity::Error,
                )
                .await;
                errors.push(format!("failed to verify capacity for {tenant}: {e}"));
                return false;
            }
        };

        if satisfies(actual, expected) {
            info!(tenant, %actual, "capacity verified");
            return true;
        }

        error!(tenant, %actual, %expected, "capacity verification failed");
        self.notify(
            &format!(
                "Capacity verification failed for {tenant}: expected {expected}, found {actual}. \
                 Please check the namespace manually."
            ),
            Severity::Error,
        )
        .await;
        errors.push(format!(
            "verification failed: {tenant} is {actual}, expected {expected}"
        ));
        false
    }

    async fn notify(&self, message: &str, severity: Severity) {
        if let Err(e) = self.notifier.notify(message, severity).await {
            warn!(error = %e, "notification failed");
        }
    }
}

fn satisfies(actual: TenantState, expected: TenantState) -> bool {
    match expected.mode {
        CapacityMode::OnDemand => actual.mode == CapacityMode::OnDemand,
        CapacityMode::Provisioned => actual.is_provisioned_at(expected.units_or_zero()),
    }
}

fn transition(result: &mut ScheduledChangeResult, next: ChangePhase) {
    debug!(tenant = %result.tenant, from = %result.phase, to = %next, "scheduled change phase");
    result.phase = next;
}

fn finish(mut result: ScheduledChangeResult) -> ScheduledChangeResult {
    let next = match result.errors.last() {
        Some(reason) => ChangePhase::Failed {
            reason: reason.clone(),
        },
        None => ChangePhase::Completed,
    };
    transition(&mut result, next);
    info!(tenant = %result.tenant, "{result}");
    result
}
