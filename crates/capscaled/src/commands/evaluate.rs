//! `capscaled evaluate`: one batch, optionally resumed.

use tracing::{info, warn};

use capscale_core::CapscaleConfig;
use capscale_engine::{BatchResult, Checkpoint, EvaluateOptions};
use capscale_state::StateStore;

use crate::ReportFormat;
use crate::backend::{BATCH_ID, Backend};

pub async fn evaluate(
    config: CapscaleConfig,
    resume: bool,
    format: ReportFormat,
) -> anyhow::Result<()> {
    let backend = Backend::connect(&config)?;
    let result = evaluate_batch(&backend, &config, resume).await?;
    print!("{}", render(&result, format)?);
    if result.has_errors() {
        anyhow::bail!("{} tenant(s) failed", result.errors.len());
    }
    Ok(())
}

/// Run a batch, record it, and drop the checkpoint once it completes.
pub(crate) async fn evaluate_batch(
    backend: &Backend,
    config: &CapscaleConfig,
    resume: bool,
) -> anyhow::Result<BatchResult> {
    let options = EvaluateOptions {
        resume: if resume { pending_checkpoint(&backend.store)? } else { None },
        cancel: Some(super::ctrl_c_channel()),
    };
    let result = backend.evaluator(config).evaluate_with(options).await?;

    backend.store.record_run(&result)?;
    if result.cancelled {
        warn!("batch interrupted; rerun with --resume to continue");
    } else {
        backend.store.clear_checkpoint(BATCH_ID)?;
    }
    Ok(result)
}

pub(crate) fn pending_checkpoint(store: &StateStore) -> anyhow::Result<Option<Checkpoint>> {
    match store.latest_checkpoint(BATCH_ID)? {
        Some(checkpoint) if !checkpoint.is_complete() => {
            info!(
                processed = checkpoint.processed,
                total = checkpoint.total,
                "resuming from checkpoint"
            );
            Ok(Some(checkpoint))
        }
        _ => {
            info!("no pending checkpoint, starting a fresh batch");
            Ok(None)
        }
    }
}

pub(crate) fn render(result: &BatchResult, format: ReportFormat) -> anyhow::Result<String> {
    match format {
        ReportFormat::Json => Ok(format!("{}\n", serde_json::to_string_pretty(result)?)),
        ReportFormat::Text => {
            let mut out = format!("{result}\n");
            for decision in result.decisions.iter().filter(|d| d.kind.is_side_effect()) {
                out.push_str(&format!("  {decision}\n"));
            }
            for error in &result.errors {
                out.push_str(&format!("  error: {error}\n"));
            }
            Ok(out)
        }
    }
}
