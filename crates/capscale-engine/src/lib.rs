//! capscale-engine: capacity sizing and reconciliation for multi-tenant units.
//!
//! Fetches one bulk load snapshot, sizes every managed tenant with the
//! pure [`DecisionEngine`], reconciles the target against the tenant's
//! actual state, and applies the resulting action idempotently.
//!
//! # Sizing Algorithm
//!
//! ```text
//! current = floor(limit / base_capacity), with 1 normalized to 0
//!
//! if current == 0:
//!     load > base_capacity  → max(2, ceil(load / base_capacity))
//!     otherwise             → 0
//!
//! utilization = load / (current * base_capacity)
//! min_charged = (current - 1) * per_unit_step
//!
//! utilization >= scale_up_threshold → current + 1
//! load < min_charged:
//!     load <= base_capacity → 0
//!     otherwise             → max(2, floor(load / per_unit_step) + 1)
//! otherwise                 → current
//! ```
//!
//! Scale-up moves one unit per cycle; scale-down jumps straight to the
//! optimum.

pub mod apply;
pub mod engine;
pub mod evaluator;
pub mod policy;
pub mod sources;

pub use apply::{ApplyOutcome, apply_decision, ensure_on_demand, ensure_provisioned};
pub use engine::{
    DecisionEngine, Sizing, SizingReason, derive_mode, minimum_charged_load, recommend,
};
pub use evaluator::{BatchResult, EvaluateOptions, Evaluator, EvaluatorConfig};
pub use policy::{
    ActionDecision, ActionKind, Decision, DecisionPolicy, Recommendation, ThresholdPolicy,
    reconcile,
};
pub use sources::{
    BoxFuture, CapacityApplier, Checkpoint, LoadSource, NoopProgress, Notifier, ProgressSink,
    TenantStateSource, TracingNotifier,
};
