//! capscale-client: HTTP collaborators for the control loop.
//!
//! - [`CloudOpsClient`] reads and writes namespace capacity on the control
//!   plane (implements the tenant-state and applier traits).
//! - [`MetricsApiClient`] fetches the bulk OpenMetrics snapshot (implements
//!   the load source trait).
//!
//! Both sit on [`HttpClient`]: hyper's HTTP/1 connection API over TCP, with
//! rustls for `https` base URLs, bearer auth, and a per-request timeout.

pub mod cloud_ops;
pub mod error;
pub mod transport;
pub mod metrics_api;

#[cfg(test)]
mod testing;

pub use cloud_ops::{CapacitySpec, CloudOpsClient, NamespaceInfo, parse_namespace};
pub use error::{ClientError, ClientResult};
pub use transport::{HttpClient, HttpResponse};
pub use metrics_api::MetricsApiClient;
