//! capscale-schedule: operator-requested capacity changes.
//!
//! A scheduled change provisions a tenant at a fixed unit count right away,
//! checks that the control plane picked it up, and optionally holds it until
//! an end time before returning the tenant to on-demand.
//!
//! ```text
//! Pending ─▶ Enabling ─▶ Verifying ─▶ Holding ─▶ Reverting ─▶ VerifyingRevert ─▶ Completed
//!               │            │                       │
//!               ▼            ▼                       ▼
//!             Failed     Completed (no revert)     Failed
//! ```

pub mod change;

pub use change::{
    ChangePhase, Clock, DEFAULT_VERIFY_DELAY, ScheduledChange, ScheduledChangeResult,
    ScheduledChangeRunner, system_clock,
};
