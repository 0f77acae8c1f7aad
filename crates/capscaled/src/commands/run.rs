//! `capscaled run`: the long-running control loop.

use tokio::sync::watch;
use tracing::{info, warn};

use capscale_core::CapscaleConfig;

use crate::backend::Backend;

pub async fn run(config: CapscaleConfig) -> anyhow::Result<()> {
    let backend = Backend::connect(&config)?;
    run_loop(&backend, &config, super::ctrl_c_channel()).await
}

/// Evaluate until `shutdown`, picking up an interrupted batch first.
pub(crate) async fn run_loop(
    backend: &Backend,
    config: &CapscaleConfig,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let interval = config.run.interval()?;
    let resume = super::evaluate::pending_checkpoint(&backend.store)?;
    let evaluator = backend.evaluator(config);
    info!(
        interval_secs = interval.as_secs(),
        dry_run = config.run.dry_run,
        "capscaled starting"
    );

    let store = backend.store.clone();
    evaluator
        .run_from(interval, resume, shutdown, |result| {
            if let Err(e) = store.record_run(result) {
                warn!(error = %e, "failed to record run");
            }
        })
        .await;

    info!("capscaled stopped");
    Ok(())
}
