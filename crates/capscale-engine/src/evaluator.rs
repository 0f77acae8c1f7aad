//! Batch evaluator: sizes and reconciles every managed tenant.
//!
//! One bulk load fetch per batch, then per tenant: read actual state,
//! decide, apply (or simulate in dry-run), record. Per-tenant failures are
//! isolated; only a failed bulk fetch aborts the batch.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use capscale_core::{
    CapacityModel, CapacityResult, CapscaleConfig, LoadSnapshot, Severity, TenantFilter,
    TenantState,
};

use crate::apply::{ApplyOutcome, apply_decision};
use crate::engine::DecisionEngine;
use crate::policy::{ActionDecision, ActionKind, DecisionPolicy, Recommendation};
use crate::sources::{
    CapacityApplier, Checkpoint, LoadSource, NoopProgress, Notifier, ProgressSink,
    TenantStateSource, TracingNotifier,
};

/// Per-batch settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorConfig {
    pub model: CapacityModel,
    pub policy: DecisionPolicy,
    pub filter: TenantFilter,
    pub dry_run: bool,
    /// Emit a checkpoint after this many tenants.
    pub checkpoint_every: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            model: CapacityModel::default(),
            policy: DecisionPolicy::MetricsDriven,
            filter: TenantFilter::allow_all(),
            dry_run: false,
            checkpoint_every: 5,
        }
    }
}

impl EvaluatorConfig {
    pub fn from_config(config: &CapscaleConfig) -> Self {
        Self {
            model: config.model,
            policy: DecisionPolicy::from_config(&config.policy),
            filter: config.filter.clone(),
            dry_run: config.run.dry_run,
            checkpoint_every: config.run.checkpoint_every,
        }
    }
}

/// Optional knobs for a single batch.
#[derive(Debug, Clone, Default)]
pub struct EvaluateOptions {
    /// Skip tenants already processed by an interrupted batch.
    pub resume: Option<Checkpoint>,
    /// Stop between tenants once this flips to `true`.
    pub cancel: Option<watch::Receiver<bool>>,
}

/// Aggregate outcome of one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub checked: usize,
    pub enabled: Vec<String>,
    pub disabled: Vec<String>,
    pub resized: Vec<String>,
    pub errors: Vec<String>,
    pub decisions: Vec<ActionDecision>,
    pub recommendations: Vec<Recommendation>,
    pub dry_run: bool,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchResult {
    pub fn new(dry_run: bool) -> Self {
        Self {
            checked: 0,
            enabled: Vec::new(),
            disabled: Vec::new(),
            resized: Vec::new(),
            errors: Vec::new(),
            decisions: Vec::new(),
            recommendations: Vec::new(),
            dry_run,
            cancelled: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn record_action(&mut self, decision: &ActionDecision) {
        let list = match decision.kind {
            ActionKind::Enable => &mut self.enabled,
            ActionKind::Disable => &mut self.disabled,
            ActionKind::Resize => &mut self.resized,
            ActionKind::None => return,
        };
        list.push(decision.tenant.clone());
    }
}

impl fmt::Display for BatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            f.write_str("[DRY RUN] ")?;
        }
        write!(
            f,
            "checked {} tenants: {} enabled, {} disabled, {} resized, {} errors",
            self.checked,
            self.enabled.len(),
            self.disabled.len(),
            self.resized.len(),
            self.errors.len()
        )?;
        if self.cancelled {
            f.write_str(" (cancelled)")?;
        }
        Ok(())
    }
}

/// Drives batches over the collaborators.
pub struct Evaluator {
    config: EvaluatorConfig,
    engine: DecisionEngine,
    loads: Arc<dyn LoadSource>,
    states: Arc<dyn TenantStateSource>,
    applier: Arc<dyn CapacityApplier>,
    notifier: Arc<dyn Notifier>,
    progress: Arc<dyn ProgressSink>,
}

impl Evaluator {
    /// Create an evaluator that notifies through tracing and drops checkpoints.
    pub fn new(
        config: EvaluatorConfig,
        loads: Arc<dyn LoadSource>,
        states: Arc<dyn TenantStateSource>,
        applier: Arc<dyn CapacityApplier>,
    ) -> Self {
        Self {
            engine: DecisionEngine::new(config.model),
            config,
            loads,
            states,
            applier,
            notifier: Arc::new(TracingNotifier),
            progress: Arc::new(NoopProgress),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Run one full batch.
    pub async fn evaluate(&self) -> CapacityResult<BatchResult> {
        self.evaluate_with(EvaluateOptions::default()).await
    }

    /// Resume a batch after `checkpoint` tenants.
    pub async fn evaluate_from(&self, checkpoint: Checkpoint) -> CapacityResult<BatchResult> {
        self.evaluate_with(EvaluateOptions {
            resume: Some(checkpoint),
            cancel: None,
        })
        .await
    }

    pub async fn evaluate_with(&self, options: EvaluateOptions) -> CapacityResult<BatchResult> {
        let mut result = BatchResult::new(self.config.dry_run);
        let managed = self.fetch_managed().await?;
        let total = managed.len();

        let skip = match options.resume {
            Some(cp) if cp.total == total => cp.processed.min(total),
            Some(cp) => {
                warn!(
                    checkpoint_total = cp.total,
                    total, "tenant count changed since checkpoint, restarting batch"
                );
                0
            }
            None => 0,
        };
        if skip > 0 {
            info!(skip, total, "resuming batch from checkpoint");
        }

        let every = self.config.checkpoint_every.max(1);
        for (index, snapshot) in managed.iter().enumerate().skip(skip) {
            if let Some(cancel) = &options.cancel
                && *cancel.borrow()
            {
                warn!(processed = index, total, "batch cancelled");
                result.cancelled = true;
                break;
            }

            self.evaluate_tenant(snapshot, &mut result).await;

            let processed = index + 1;
            if processed % every == 0 || processed == total {
                self.progress.checkpoint(Checkpoint { processed, total });
            }
        }

        result.finished_at = Some(Utc::now());
        info!(policy = self.config.policy.name(), "{result}");
        Ok(result)
    }

    /// Read-only pass: recommendations for every managed tenant, no actions.
    pub async fn analyze(&self) -> CapacityResult<Vec<Recommendation>> {
        let managed = self.fetch_managed().await?;
        let mut recommendations = Vec::with_capacity(managed.len());
        for (index, snapshot) in managed.iter().enumerate() {
            let current = self.current_state(&snapshot.tenant).await;
            let decision = self.config.policy.decide(&self.engine, snapshot, current);
            recommendations.push(decision.recommendation);

            let processed = index + 1;
            if processed % self.config.checkpoint_every.max(1) == 0 {
                debug!(processed, total = managed.len(), "analysis progress");
            }
        }
        info!(tenants = recommendations.len(), "analysis complete");
        Ok(recommendations)
    }

    /// Evaluate on a fixed interval until shutdown. The first batch runs
    /// immediately; `on_result` sees every completed batch.
    pub async fn run<F>(&self, interval: Duration, shutdown: watch::Receiver<bool>, on_result: F)
    where
        F: FnMut(&BatchResult) + Send,
    {
        self.run_from(interval, None, shutdown, on_result).await
    }

    /// Like [`Evaluator::run`], but the first batch resumes after `resume`.
    pub async fn run_from<F>(
        &self,
        interval: Duration,
        mut resume: Option<Checkpoint>,
        mut shutdown: watch::Receiver<bool>,
        mut on_result: F,
    ) where
        F: FnMut(&BatchResult) + Send,
    {
        info!(interval_secs = interval.as_secs(), "evaluator started");

        loop {
            let options = EvaluateOptions {
                resume: resume.take(),
                cancel: Some(shutdown.clone()),
            };
            match self.evaluate_with(options).await {
                Ok(result) => on_result(&result),
                Err(e) => error!(error = %e, "batch evaluation failed"),
            }

            if *shutdown.borrow() {
                info!("evaluator shutting down");
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    info!("evaluator shutting down");
                    break;
                }
            }
        }
    }

    async fn fetch_managed(&self) -> CapacityResult<Vec<LoadSnapshot>> {
        let snapshots = match self.loads.fetch_all().await {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "bulk load fetch failed");
                self.notify(&format!("bulk load fetch failed: {e}"), Severity::Critical)
                    .await;
                return Err(e);
            }
        };

        let fetched = snapshots.len();
        let managed: Vec<LoadSnapshot> = snapshots
            .into_iter()
            .filter(|s| self.config.filter.should_manage(&s.tenant))
            .collect();
        info!(fetched, managed = managed.len(), "load snapshot fetched");
        Ok(managed)
    }

    async fn evaluate_tenant(&self, snapshot: &LoadSnapshot, result: &mut BatchResult) {
        let current = self.current_state(&snapshot.tenant).await;
        let decision = self.config.policy.decide(&self.engine, snapshot, current);
        let mut action = decision.action;

        debug!(
            tenant = %snapshot.tenant,
            limit = snapshot.limit,
            load = snapshot.load,
            current = %current,
            recommended = decision.recommendation.recommended_units,
            "tenant evaluated"
        );
        result.checked += 1;
        result.recommendations.push(decision.recommendation);

        if action.kind.is_side_effect() {
            if self.config.dry_run {
                info!(tenant = %action.tenant, "dry run: would {action}");
                result.record_action(&action);
            } else {
                match apply_decision(self.states.as_ref(), self.applier.as_ref(), &action).await {
                    Ok(ApplyOutcome::Applied) => {
                        info!(tenant = %action.tenant, "{action}");
                        result.record_action(&action);
                    }
                    Ok(ApplyOutcome::AlreadySatisfied) => {
                        debug!(tenant = %action.tenant, "fresh read shows target already met");
                        action = ActionDecision::none(
                            &action.tenant,
                            action.current,
                            format!("already at target; {}", action.reason),
                        );
                    }
                    Err(e) => {
                        let message =
                            format!("error applying {} for {}: {e}", action.kind, action.tenant);
                        error!(tenant = %action.tenant, error = %e, "action failed");
                        self.notify(&message, Severity::Error).await;
                        result.errors.push(message);
                    }
                }
            }
        }

        result.decisions.push(action);
    }

    // Unknown or unreadable tenants default to on-demand.
    async fn current_state(&self, tenant: &str) -> TenantState {
        match self.states.fetch_state(tenant).await {
            Ok(state) => state,
            Err(e) if e.is_not_found() => {
                debug!(tenant, "tenant not found, treating as on-demand");
                TenantState::on_demand()
            }
            Err(e) => {
                warn!(tenant, error = %e, "state fetch failed, treating as on-demand");
                TenantState::on_demand()
            }
        }
    }

    async fn notify(&self, message: &str, severity: Severity) {
        if let Err(e) = self.notifier.notify(message, severity).await {
            warn!(error = %e, "notification failed");
        }
    }
}
