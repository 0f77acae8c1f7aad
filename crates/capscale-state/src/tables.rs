//! redb table definitions for the capscale state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized records).

use redb::TableDefinition;

/// Tenant capacity records keyed by tenant id.
pub const TENANTS: TableDefinition<&str, &[u8]> = TableDefinition::new("tenants");

/// Latest batch checkpoint keyed by batch id.
pub const CHECKPOINTS: TableDefinition<&str, &[u8]> = TableDefinition::new("checkpoints");

/// Finished batch summaries keyed by fixed-width RFC 3339 start time, so
/// key order is chronological.
pub const RUNS: TableDefinition<&str, &[u8]> = TableDefinition::new("runs");
