//! OpenMetrics text parsing into per-tenant load snapshots.
//!
//! Only labelled samples of the three configured metric names are read.
//! Comments, blank lines, unlabelled samples, and samples without the
//! tenant label are skipped.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use capscale_core::{LoadSnapshot, MetricsConfig};

static SAMPLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z_:][a-zA-Z0-9_:]*)\{([^}]*)\}\s+(\S+)(?:\s+\S+)?$")
        .expect("constant pattern")
});

static LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([a-zA-Z_][a-zA-Z0-9_]*)="([^"]*)""#).expect("constant pattern")
});

/// Metric and label names that make up a load snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricNames {
    pub limit: String,
    pub load: String,
    pub rejected: String,
    pub tenant_label: String,
}

impl Default for MetricNames {
    fn default() -> Self {
        Self::from_config(&MetricsConfig::default())
    }
}

impl MetricNames {
    pub fn from_config(config: &MetricsConfig) -> Self {
        Self {
            limit: config.limit_metric.clone(),
            load: config.load_metric.clone(),
            rejected: config.rejected_metric.clone(),
            tenant_label: config.tenant_label.clone(),
        }
    }

    /// Names to request from a metrics endpoint.
    pub fn requested(&self) -> [&str; 3] {
        [self.limit.as_str(), self.load.as_str(), self.rejected.as_str()]
    }
}

#[derive(Default)]
struct Partial {
    limit: Option<f64>,
    load: Option<f64>,
    rejected: f64,
}

/// Parse an exposition body. Tenants keep first-appearance order; the last
/// limit/load sample wins, rejected samples are summed, and missing values
/// are 0.
pub fn parse_exposition(text: &str, names: &MetricNames) -> Vec<LoadSnapshot> {
    let mut order: Vec<String> = Vec::new();
    let mut partials: HashMap<String, Partial> = HashMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(caps) = SAMPLE.captures(line) else {
            continue;
        };
        let metric = &caps[1];
        if metric != names.limit && metric != names.load && metric != names.rejected {
            continue;
        }
        let Ok(value) = caps[3].parse::<f64>() else {
            trace!(line, "unparsable sample value");
            continue;
        };
        let Some(tenant) = label_value(&caps[2], &names.tenant_label) else {
            continue;
        };

        let entry = partials.entry(tenant.to_string()).or_insert_with(|| {
            order.push(tenant.to_string());
            Partial::default()
        });
        if metric == names.limit {
            entry.limit = Some(value);
        } else if metric == names.load {
            entry.load = Some(value);
        } else {
            entry.rejected += value;
        }
    }

    order
        .into_iter()
        .filter_map(|tenant| {
            let partial = partials.remove(&tenant)?;
            Some(
                LoadSnapshot::new(
                    tenant,
                    partial.limit.unwrap_or(0.0),
                    partial.load.unwrap_or(0.0),
                )
                .with_rejected(partial.rejected),
            )
        })
        .collect()
}

fn label_value<'a>(labels: &'a str, wanted: &str) -> Option<&'a str> {
    LABEL
        .captures_iter(labels)
        .find(|c| &c[1] == wanted)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str())
}
