//! Collaborator traits consumed by the evaluator.
//!
//! Metrics fetching, control-plane reads and writes, notifications, and
//! progress reporting all live behind these traits so the evaluator can be
//! driven by real HTTP clients, the local state store, or in-memory fakes.
//! Implementations own retries; the evaluator never retries.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use capscale_core::{CapacityResult, LoadSnapshot, Severity, TenantState};

/// Boxed future alias for collaborator calls.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Bulk source of per-tenant load observations.
pub trait LoadSource: Send + Sync {
    /// Fetch every tenant's snapshot in one call, in a stable order.
    fn fetch_all(&self) -> BoxFuture<'_, CapacityResult<Vec<LoadSnapshot>>>;
}

/// Reads a tenant's actual capacity from the control plane.
pub trait TenantStateSource: Send + Sync {
    /// Returns `CapacityError::NotFound` for unknown tenants.
    fn fetch_state<'a>(&'a self, tenant: &'a str) -> BoxFuture<'a, CapacityResult<TenantState>>;
}

/// Writes capacity changes to the control plane.
///
/// Both calls must be safe to repeat when the tenant is already at the
/// target state.
pub trait CapacityApplier: Send + Sync {
    fn apply_enable<'a>(&'a self, tenant: &'a str, units: u32)
    -> BoxFuture<'a, CapacityResult<bool>>;

    fn apply_disable<'a>(&'a self, tenant: &'a str) -> BoxFuture<'a, CapacityResult<bool>>;
}

/// Best-effort operator notifications.
pub trait Notifier: Send + Sync {
    fn notify<'a>(&'a self, message: &'a str, severity: Severity)
    -> BoxFuture<'a, CapacityResult<()>>;
}

/// Batch progress marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Managed tenants processed so far, counted from the start of the batch.
    pub processed: usize,
    /// Managed tenants in the batch.
    pub total: usize,
}

impl Checkpoint {
    pub fn is_complete(&self) -> bool {
        self.processed >= self.total
    }
}

/// Receives progress checkpoints. Fire-and-forget.
pub trait ProgressSink: Send + Sync {
    fn checkpoint(&self, checkpoint: Checkpoint);
}

/// Progress sink that drops every checkpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn checkpoint(&self, _checkpoint: Checkpoint) {}
}

/// Notifier that writes to the tracing log at a level matching severity.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify<'a>(
        &'a self,
        message: &'a str,
        severity: Severity,
    ) -> BoxFuture<'a, CapacityResult<()>> {
        Box::pin(async move {
            match severity {
                Severity::Info => info!(%severity, "{message}"),
                Severity::Warning => warn!(%severity, "{message}"),
                Severity::Error | Severity::Critical => error!(%severity, "{message}"),
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tracing_notifier_never_fails() {
        let notifier = TracingNotifier;
        for severity in [
            Severity::Info,
            Severity::Warning,
            Severity::Error,
            Severity::Critical,
        ] {
            assert!(notifier.notify("hello", severity).await.is_ok());
        }
    }

    #[test]
    fn checkpoint_completion() {
        assert!(!Checkpoint { processed: 4, total: 5 }.is_complete());
        assert!(Checkpoint { processed: 5, total: 5 }.is_complete());
    }
}
