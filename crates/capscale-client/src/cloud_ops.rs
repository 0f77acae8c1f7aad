//! Control-plane ops API client.
//!
//! Reads a namespace's provisioned capacity and switches it between
//! provisioned and on-demand. Writes carry the namespace's current
//! `resourceVersion` for optimistic concurrency.

use http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use capscale_core::{CapacityError, CapacityResult, TenantState};
use capscale_engine::{BoxFuture, CapacityApplier, TenantStateSource};

use crate::error::{ClientError, ClientResult};
use crate::transport::HttpClient;

/// What the control plane reports about one namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceInfo {
    pub name: String,
    pub state: TenantState,
    pub resource_version: Option<String>,
    pub region: Option<String>,
}

/// Target capacity for a namespace write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacitySpec {
    Provisioned(u32),
    OnDemand,
}

impl CapacitySpec {
    fn to_json(self) -> serde_json::Value {
        match self {
            CapacitySpec::Provisioned(units) => json!({ "provisioned": { "value": units } }),
            CapacitySpec::OnDemand => json!({ "onDemand": {} }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NamespaceEnvelope {
    namespace: NamespaceBody,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct NamespaceBody {
    namespace: Option<String>,
    resource_version: Option<String>,
    spec: NamespaceSpec,
    capacity: Capacity,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NamespaceSpec {
    regions: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Capacity {
    provisioned: Provisioned,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Provisioned {
    current_value: Option<f64>,
}

/// Parse a `GET /cloud/namespaces/{ns}` body. A positive
/// `capacity.provisioned.currentValue` means provisioned.
pub fn parse_namespace(name: &str, body: &[u8]) -> ClientResult<NamespaceInfo> {
    let envelope: NamespaceEnvelope =
        serde_json::from_slice(body).map_err(|e| ClientError::Decode(e.to_string()))?;
    let ns = envelope.namespace;
    let units = ns
        .capacity
        .provisioned
        .current_value
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| v.round() as u32);

    Ok(NamespaceInfo {
        name: ns.namespace.unwrap_or_else(|| name.to_string()),
        state: TenantState::from_units(units),
        resource_version: ns.resource_version,
        region: ns.spec.regions.into_iter().next(),
    })
}

/// Client for the namespace endpoints of the ops API.
#[derive(Debug, Clone)]
pub struct CloudOpsClient {
    http: HttpClient,
}

impl CloudOpsClient {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// `None` when the namespace does not exist.
    pub async fn get_namespace(&self, namespace: &str) -> ClientResult<Option<NamespaceInfo>> {
        let resp = self.http.get(&namespace_path(namespace)).await?;
        match resp.error_for_status() {
            Ok(resp) => parse_namespace(namespace, &resp.body).map(Some),
            Err(e) if e.is_not_found() => {
                warn!(namespace, "namespace not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Write a capacity spec, re-reading `resourceVersion` first. A namespace
    /// that does not exist is never written.
    pub async fn set_capacity(&self, namespace: &str, spec: CapacitySpec) -> ClientResult<()> {
        let Some(info) = self.get_namespace(namespace).await? else {
            return Err(ClientError::Status {
                status: StatusCode::NOT_FOUND,
                body: format!("namespace {namespace} not found"),
            });
        };
        let resource_version = info.resource_version;
        let payload = json!({
            "spec": { "capacitySpec": spec.to_json() },
            "resourceVersion": resource_version,
        });
        self.http
            .post_json(&namespace_path(namespace), &payload)
            .await?
            .error_for_status()?;
        info!(namespace, ?spec, "capacity spec updated");
        Ok(())
    }
}

fn namespace_path(namespace: &str) -> String {
    format!("/cloud/namespaces/{namespace}")
}

impl TenantStateSource for CloudOpsClient {
    fn fetch_state<'a>(&'a self, tenant: &'a str) -> BoxFuture<'a, CapacityResult<TenantState>> {
        Box::pin(async move {
            match self.get_namespace(tenant).await? {
                Some(info) => Ok(info.state),
                None => Err(CapacityError::NotFound(tenant.to_string())),
            }
        })
    }
}

impl CapacityApplier for CloudOpsClient {
    fn apply_enable<'a>(
        &'a self,
        tenant: &'a str,
        units: u32,
    ) -> BoxFuture<'a, CapacityResult<bool>> {
        Box::pin(async move {
            self.set_capacity(tenant, CapacitySpec::Provisioned(units))
                .await
                .map_err(|e| CapacityError::apply(tenant, e))?;
            Ok(true)
        })
    }

    fn apply_disable<'a>(&'a self, tenant: &'a str) -> BoxFuture<'a, CapacityResult<bool>> {
        Box::pin(async move {
            self.set_capacity(tenant, CapacitySpec::OnDemand)
                .await
                .map_err(|e| CapacityError::apply(tenant, e))?;
            Ok(true)
        })
    }
}
