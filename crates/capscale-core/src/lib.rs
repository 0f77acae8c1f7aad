pub mod config;
pub mod error;
pub mod filter;
pub mod types;

pub use config::{
    CapacityModel, CapscaleConfig, ControlPlaneBackend, ControlPlaneConfig, Credentials,
    MetricsConfig, MetricsSourceKind, PolicyConfig, PolicyKind, RunConfig, parse_duration,
};
pub use error::{CapacityError, CapacityResult};
pub use filter::TenantFilter;
pub use types::*;
