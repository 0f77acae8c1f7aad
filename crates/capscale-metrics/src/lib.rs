//! capscale-metrics: load observations in, capacity gauges out.
//!
//! # Architecture
//!
//! ```text
//! OpenMetrics text
//!   └── parse_exposition() → Vec<LoadSnapshot> (limit, load, rejected per tenant)
//!
//! FileLoadSource
//!   └── fetch_all() ← reads a captured scrape from disk
//!
//! Prometheus exposition
//!   └── render_recommendations() → text/plain for analysis output
//! ```

pub mod file_source;
pub mod openmetrics;
pub mod prometheus;

pub use file_source::FileLoadSource;
pub use openmetrics::{MetricNames, parse_exposition};
pub use prometheus::render_recommendations;
