//! Load source backed by an OpenMetrics text file.
//!
//! Lets the control loop run against a captured scrape instead of the
//! live metrics endpoint.

use std::path::{Path, PathBuf};

use tracing::debug;

use capscale_core::{CapacityError, CapacityResult, LoadSnapshot};
use capscale_engine::{BoxFuture, LoadSource};

use crate::openmetrics::{MetricNames, parse_exposition};

/// Reads the whole snapshot file on every fetch.
#[derive(Debug, Clone)]
pub struct FileLoadSource {
    path: PathBuf,
    names: MetricNames,
}

impl FileLoadSource {
    pub fn new(path: impl Into<PathBuf>, names: MetricNames) -> Self {
        Self {
            path: path.into(),
            names,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LoadSource for FileLoadSource {
    fn fetch_all(&self) -> BoxFuture<'_, CapacityResult<Vec<LoadSnapshot>>> {
        Box::pin(async move {
            let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
                CapacityError::TransientFetch(format!("read {}: {e}", self.path.display()))
            })?;
            let snapshots = parse_exposition(&text, &self.names);
            debug!(path = %self.path.display(), tenants = snapshots.len(), "snapshot file parsed");
            Ok(snapshots)
        })
    }
}
