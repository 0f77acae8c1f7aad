//! Wires configuration into collaborators.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use capscale_client::{CloudOpsClient, HttpClient, MetricsApiClient};
use capscale_core::{CapscaleConfig, ControlPlaneBackend, MetricsSourceKind};
use capscale_engine::{CapacityApplier, Evaluator, EvaluatorConfig, LoadSource, TenantStateSource};
use capscale_metrics::{FileLoadSource, MetricNames};
use capscale_state::{CheckpointRecorder, LocalControlPlane, StateStore};

/// Checkpoint key for batches started from this binary.
pub const BATCH_ID: &str = "evaluate";

pub struct Backend {
    pub store: StateStore,
    pub loads: Arc<dyn LoadSource>,
    pub states: Arc<dyn TenantStateSource>,
    pub applier: Arc<dyn CapacityApplier>,
}

impl Backend {
    /// Validate the configuration and build every collaborator it names.
    pub fn connect(config: &CapscaleConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let timeout = config.run.request_timeout()?;

        let path = &config.control_plane.local_path;
        let store = StateStore::open(path)
            .with_context(|| format!("failed to open state store at {}", path.display()))?;

        let (states, applier): (Arc<dyn TenantStateSource>, Arc<dyn CapacityApplier>) =
            match config.control_plane.backend {
                ControlPlaneBackend::Cloud => {
                    let http = HttpClient::new(
                        &config.control_plane.base_url,
                        config.credentials.control_plane_api_key.clone(),
                        timeout,
                    )?;
                    let client = Arc::new(CloudOpsClient::new(http));
                    let states: Arc<dyn TenantStateSource> = client.clone();
                    let applier: Arc<dyn CapacityApplier> = client;
                    (states, applier)
                }
                ControlPlaneBackend::Local => {
                    let plane = Arc::new(LocalControlPlane::new(store.clone()));
                    let states: Arc<dyn TenantStateSource> = plane.clone();
                    let applier: Arc<dyn CapacityApplier> = plane;
                    (states, applier)
                }
            };

        let names = MetricNames::from_config(&config.metrics);
        let loads: Arc<dyn LoadSource> = match config.metrics.source {
            MetricsSourceKind::Api => {
                let http = HttpClient::new(
                    &config.metrics.base_url,
                    config.credentials.metrics_api_key.clone(),
                    timeout,
                )?;
                Arc::new(MetricsApiClient::new(http, names))
            }
            MetricsSourceKind::File => {
                Arc::new(FileLoadSource::new(config.metrics.file.clone(), names))
            }
        };

        info!(
            control_plane = ?config.control_plane.backend,
            metrics = ?config.metrics.source,
            store = %path.display(),
            "backend connected"
        );
        Ok(Self {
            store,
            loads,
            states,
            applier,
        })
    }

    /// Evaluator that persists checkpoints under [`BATCH_ID`].
    pub fn evaluator(&self, config: &CapscaleConfig) -> Evaluator {
        Evaluator::new(
            EvaluatorConfig::from_config(config),
            self.loads.clone(),
            self.states.clone(),
            self.applier.clone(),
        )
        .with_progress(Arc::new(CheckpointRecorder::new(self.store.clone(), BATCH_ID)))
    }
}
