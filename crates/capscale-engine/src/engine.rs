//! Capacity decision engine: maps (limit, load) to a target unit count.
//!
//! Pure and deterministic: no I/O, no clocks, no shared state. Safe to call
//! from any orchestration substrate, including replayed workflows.

use std::fmt;

use capscale_core::{CapacityMode, CapacityModel};

/// Why the engine picked a unit count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizingReason {
    /// Base tier, and the load fits in it.
    BaseTierSufficient { load: f64, base_capacity: f64 },
    /// Base tier, but the load exceeds it: jump straight to provisioned.
    ExceedsBaseCapacity { load: f64, base_capacity: f64 },
    /// Provisioned and at or above the scale-up threshold.
    HighUtilization { utilization: f64, threshold: f64 },
    /// Provisioned, paying for more than is used, and the load fits the base tier.
    BelowMinimumChargeToBase { load: f64, min_charged: f64 },
    /// Provisioned, paying for more than is used: resize to the optimum.
    BelowMinimumCharge { load: f64, min_charged: f64 },
    /// Provisioned, between the minimum charge and the scale-up threshold.
    Efficient { utilization: f64 },
}

impl fmt::Display for SizingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            SizingReason::BaseTierSufficient { load, base_capacity } => write!(
                f,
                "load {load:.0} fits base capacity {base_capacity:.0}"
            ),
            SizingReason::ExceedsBaseCapacity { load, base_capacity } => write!(
                f,
                "load {load:.0} exceeds base capacity {base_capacity:.0}"
            ),
            SizingReason::HighUtilization {
                utilization,
                threshold,
            } => write!(
                f,
                "utilization {:.1}% at or above {:.0}%",
                utilization * 100.0,
                threshold * 100.0
            ),
            SizingReason::BelowMinimumChargeToBase { load, min_charged } => write!(
                f,
                "load {load:.0} below minimum charged {min_charged:.0} and fits base tier"
            ),
            SizingReason::BelowMinimumCharge { load, min_charged } => write!(
                f,
                "load {load:.0} below minimum charged {min_charged:.0}"
            ),
            SizingReason::Efficient { utilization } => {
                write!(f, "efficient at {:.1}% utilization", utilization * 100.0)
            }
        }
    }
}

/// Target unit count plus the branch that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sizing {
    pub units: u32,
    pub reason: SizingReason,
}

/// The sizing algorithm parameterized by a [`CapacityModel`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DecisionEngine {
    model: CapacityModel,
}

impl DecisionEngine {
    pub fn new(model: CapacityModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &CapacityModel {
        &self.model
    }

    /// Units implied by an entitlement limit. 0 and 1 unit are the same
    /// capacity, so anything at or below one unit reads as 0.
    pub fn current_units(&self, limit: f64) -> u32 {
        let units = (sanitize(limit) / self.model.base_capacity).floor() as u32;
        if units <= 1 { 0 } else { units }
    }

    /// Throughput billed at a given size. Sizes 0 and 1 have no minimum.
    pub fn minimum_charged_load(&self, units: u32) -> f64 {
        if units <= 1 {
            0.0
        } else {
            f64::from(units - 1) * self.model.per_unit_step
        }
    }

    /// Recommended unit count. Never 1.
    pub fn recommend(&self, limit: f64, load: f64) -> u32 {
        self.size(limit, load).units
    }

    /// Recommended unit count with the reason it was chosen.
    pub fn size(&self, limit: f64, load: f64) -> Sizing {
        let load = sanitize(load);
        let base = self.model.base_capacity;
        let current = self.current_units(limit);

        if current == 0 {
            if load > base {
                let needed = (load / base).ceil() as u32;
                return Sizing {
                    units: needed.max(2),
                    reason: SizingReason::ExceedsBaseCapacity {
                        load,
                        base_capacity: base,
                    },
                };
            }
            return Sizing {
                units: 0,
                reason: SizingReason::BaseTierSufficient {
                    load,
                    base_capacity: base,
                },
            };
        }

        let max_capacity = f64::from(current) * base;
        let utilization = load / max_capacity;
        let min_charged = self.minimum_charged_load(current);

        if utilization >= self.model.scale_up_threshold {
            // One step per cycle regardless of how far over threshold.
            return Sizing {
                units: current.saturating_add(1),
                reason: SizingReason::HighUtilization {
                    utilization,
                    threshold: self.model.scale_up_threshold,
                },
            };
        }

        if load < min_charged {
            if load <= base {
                return Sizing {
                    units: 0,
                    reason: SizingReason::BelowMinimumChargeToBase { load, min_charged },
                };
            }
            let optimal = ((load / self.model.per_unit_step).floor() as u32 + 1).max(2);
            return Sizing {
                units: optimal,
                reason: SizingReason::BelowMinimumCharge { load, min_charged },
            };
        }

        Sizing {
            units: current,
            reason: SizingReason::Efficient { utilization },
        }
    }
}

/// [`DecisionEngine::recommend`] with the default model.
pub fn recommend(limit: f64, load: f64) -> u32 {
    DecisionEngine::default().recommend(limit, load)
}

/// [`DecisionEngine::minimum_charged_load`] with the default model.
pub fn minimum_charged_load(units: u32) -> f64 {
    DecisionEngine::default().minimum_charged_load(units)
}

/// 0 units is on-demand, anything else is provisioned.
pub fn derive_mode(units: u32) -> CapacityMode {
    if units == 0 {
        CapacityMode::OnDemand
    } else {
        CapacityMode::Provisioned
    }
}

// Negative, NaN, and infinite observations read as zero.
fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
