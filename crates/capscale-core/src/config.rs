//! capscale.toml configuration parser.
//!
//! Every key has a default, so an empty file (or no file) is a valid
//! configuration. Secrets never come from the file: API keys are read from
//! the environment by [`CapscaleConfig::apply_env`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CapacityError, CapacityResult};
use crate::filter::TenantFilter;

pub const ENV_DRY_RUN: &str = "CAPSCALE_DRY_RUN";
pub const ENV_ALLOWLIST: &str = "CAPSCALE_ALLOWLIST";
pub const ENV_DENYLIST: &str = "CAPSCALE_DENYLIST";
pub const ENV_CONTROL_PLANE_API_KEY: &str = "CAPSCALE_CONTROL_PLANE_API_KEY";
pub const ENV_METRICS_API_KEY: &str = "CAPSCALE_METRICS_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapscaleConfig {
    pub control_plane: ControlPlaneConfig,
    pub metrics: MetricsConfig,
    pub policy: PolicyConfig,
    pub model: CapacityModel,
    pub filter: TenantFilter,
    pub run: RunConfig,
    #[serde(skip)]
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ControlPlaneBackend {
    #[default]
    Cloud,
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    pub backend: ControlPlaneBackend,
    pub base_url: String,
    /// redb file backing the local control plane and checkpoints.
    pub local_path: PathBuf,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            backend: ControlPlaneBackend::Cloud,
            base_url: "https://saas-api.tmprl.cloud".to_string(),
            local_path: PathBuf::from("capscale.redb"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MetricsSourceKind {
    #[default]
    Api,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub source: MetricsSourceKind,
    pub base_url: String,
    /// OpenMetrics text file read when `source = "file"`.
    pub file: PathBuf,
    pub limit_metric: String,
    pub load_metric: String,
    pub rejected_metric: String,
    pub tenant_label: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            source: MetricsSourceKind::Api,
            base_url: "https://metrics.temporal.io".to_string(),
            file: PathBuf::from("snapshot.txt"),
            limit_metric: "temporal_cloud_v1_action_limit".to_string(),
            load_metric: "temporal_cloud_v1_total_action_count".to_string(),
            rejected_metric: "temporal_cloud_v1_resource_exhausted_count".to_string(),
            tenant_label: "temporal_namespace".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Utilization and minimum-charge driven sizing.
    #[default]
    Metrics,
    /// Legacy throttled/idle switch with a fixed unit count.
    Threshold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub kind: PolicyKind,
    /// Units provisioned by the threshold policy when enabling.
    pub default_units: u32,
    /// Actions per hour below which the threshold policy disables.
    pub min_actions_threshold: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            kind: PolicyKind::Metrics,
            default_units: 5,
            min_actions_threshold: 100,
        }
    }
}

/// Pricing/capacity constants of the provisioning model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityModel {
    /// Throughput provided by the base tier (0 or 1 unit).
    pub base_capacity: f64,
    /// Minimum chargeable throughput added per unit beyond the first.
    pub per_unit_step: f64,
    /// Utilization fraction that triggers growth.
    pub scale_up_threshold: f64,
}

impl Default for CapacityModel {
    fn default() -> Self {
        Self {
            base_capacity: 500.0,
            per_unit_step: 100.0,
            scale_up_threshold: 0.80,
        }
    }
}

impl CapacityModel {
    pub fn validate(&self) -> CapacityResult<()> {
        if !(self.base_capacity.is_finite() && self.base_capacity > 0.0) {
            return Err(CapacityError::Configuration(
                "model.base_capacity must be positive".into(),
            ));
        }
        if !(self.per_unit_step.is_finite() && self.per_unit_step > 0.0) {
            return Err(CapacityError::Configuration(
                "model.per_unit_step must be positive".into(),
            ));
        }
        if !(self.scale_up_threshold > 0.0 && self.scale_up_threshold <= 1.0) {
            return Err(CapacityError::Configuration(
                "model.scale_up_threshold must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub dry_run: bool,
    /// Evaluation interval for `capscaled run` (e.g. "1h").
    pub interval: String,
    /// Emit a progress checkpoint after this many tenants.
    pub checkpoint_every: usize,
    /// Per-request timeout for the HTTP collaborators.
    pub request_timeout: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            interval: "1h".to_string(),
            checkpoint_every: 5,
            request_timeout: "30s".to_string(),
        }
    }
}

impl RunConfig {
    pub fn interval(&self) -> CapacityResult<Duration> {
        parse_duration(&self.interval).ok_or_else(|| {
            CapacityError::Configuration(format!("invalid run.interval: {:?}", self.interval))
        })
    }

    pub fn request_timeout(&self) -> CapacityResult<Duration> {
        parse_duration(&self.request_timeout).ok_or_else(|| {
            CapacityError::Configuration(format!(
                "invalid run.request_timeout: {:?}",
                self.request_timeout
            ))
        })
    }
}

/// API keys read from the environment.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub control_plane_api_key: Option<String>,
    pub metrics_api_key: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |k: &Option<String>| k.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("control_plane_api_key", &redact(&self.control_plane_api_key))
            .field("metrics_api_key", &redact(&self.metrics_api_key))
            .finish()
    }
}

impl CapscaleConfig {
    pub fn from_file(path: &Path) -> CapacityResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CapacityError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> CapacityResult<Self> {
        toml::from_str(content)
            .map_err(|e| CapacityError::Configuration(format!("invalid config: {e}")))
    }

    pub fn to_toml_string(&self) -> CapacityResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CapacityError::Configuration(format!("failed to render config: {e}")))
    }

    /// Apply overrides from the process environment.
    pub fn apply_process_env(&mut self) -> CapacityResult<()> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides through an arbitrary lookup (injectable for tests).
    pub fn apply_env<F>(&mut self, lookup: F) -> CapacityResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_DRY_RUN) {
            self.run.dry_run = parse_bool(&raw).ok_or_else(|| {
                CapacityError::Configuration(format!("{ENV_DRY_RUN} is not a boolean: {raw:?}"))
            })?;
        }
        if let Some(raw) = lookup(ENV_ALLOWLIST) {
            self.filter.allowlist = TenantFilter::parse_list(&raw);
        }
        if let Some(raw) = lookup(ENV_DENYLIST) {
            self.filter.denylist = TenantFilter::parse_list(&raw);
        }
        if let Some(key) = lookup(ENV_CONTROL_PLANE_API_KEY).filter(|k| !k.trim().is_empty()) {
            self.credentials.control_plane_api_key = Some(key);
        }
        if let Some(key) = lookup(ENV_METRICS_API_KEY).filter(|k| !k.trim().is_empty()) {
            self.credentials.metrics_api_key = Some(key);
        }
        Ok(())
    }

    /// Check the configuration before any evaluation begins.
    pub fn validate(&self) -> CapacityResult<()> {
        if self.control_plane.backend == ControlPlaneBackend::Cloud {
            check_url("control_plane.base_url", &self.control_plane.base_url)?;
            if self.credentials.control_plane_api_key.is_none() {
                return Err(CapacityError::Configuration(format!(
                    "{ENV_CONTROL_PLANE_API_KEY} is required for the cloud control plane"
                )));
            }
        }
        if self.metrics.source == MetricsSourceKind::Api {
            check_url("metrics.base_url", &self.metrics.base_url)?;
            if self.credentials.metrics_api_key.is_none() {
                return Err(CapacityError::Configuration(format!(
                    "{ENV_METRICS_API_KEY} is required for the metrics API"
                )));
            }
        }
        if self.policy.default_units < 2 {
            return Err(CapacityError::Configuration(
                "policy.default_units must be at least 2".into(),
            ));
        }
        if self.run.checkpoint_every == 0 {
            return Err(CapacityError::Configuration(
                "run.checkpoint_every must be at least 1".into(),
            ));
        }
        self.run.interval()?;
        self.run.request_timeout()?;
        self.model.validate()
    }
}

fn check_url(field: &str, url: &str) -> CapacityResult<()> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() && !host.starts_with('/') => Ok(()),
        _ => Err(CapacityError::Configuration(format!(
            "{field} must be an http(s) URL, got {url:?}"
        ))),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a duration string like "500ms", "30s", "5m", "1h", or bare seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.parse::<u64>().ok().map(|h| Duration::from_secs(h * 3600))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
