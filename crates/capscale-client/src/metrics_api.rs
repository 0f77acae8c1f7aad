//! Metrics API client: the bulk load source.
//!
//! One `GET /v1/metrics` per batch, filtered to the three metric names the
//! decision needs, parsed from OpenMetrics text.

use http::StatusCode;
use tracing::{info, warn};

use capscale_core::{CapacityResult, LoadSnapshot};
use capscale_engine::{BoxFuture, LoadSource};
use capscale_metrics::{MetricNames, parse_exposition};

use crate::error::{ClientError, ClientResult};
use crate::transport::HttpClient;

const COMPLETENESS_HEADER: &str = "x-completeness";

#[derive(Debug, Clone)]
pub struct MetricsApiClient {
    http: HttpClient,
    names: MetricNames,
}

impl MetricsApiClient {
    pub fn new(http: HttpClient, names: MetricNames) -> Self {
        Self { http, names }
    }

    fn query_path(&self) -> String {
        let params: Vec<String> = self
            .names
            .requested()
            .iter()
            .map(|name| format!("metrics={name}"))
            .collect();
        format!("/v1/metrics?{}", params.join("&"))
    }

    pub async fn fetch_snapshots(&self) -> ClientResult<Vec<LoadSnapshot>> {
        let resp = self.http.get(&self.query_path()).await?;

        if resp.status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp.header("retry-after").unwrap_or("unknown").to_string();
            warn!(%retry_after, "metrics API rate limited");
            return Err(ClientError::RateLimited { retry_after });
        }
        let resp = resp.error_for_status()?;

        let completeness = resp.header(COMPLETENESS_HEADER).unwrap_or("unknown");
        if completeness != "complete" {
            warn!(completeness, "metrics response may be incomplete");
        }

        let snapshots = parse_exposition(&resp.text(), &self.names);
        info!(tenants = snapshots.len(), "metrics snapshot fetched");
        Ok(snapshots)
    }
}

impl LoadSource for MetricsApiClient {
    fn fetch_all(&self) -> BoxFuture<'_, CapacityResult<Vec<LoadSnapshot>>> {
        Box::pin(async move { Ok(self.fetch_snapshots().await?) })
    }
}
