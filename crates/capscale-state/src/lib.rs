//! capscale-state: embedded state store for capscale.
//!
//! Backed by [redb](https://docs.rs/redb). Provides the local control
//! plane (tenant capacity records), batch checkpoints for resumable
//! evaluation, and a history of finished runs.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod local;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use local::{CheckpointRecorder, LocalControlPlane};
pub use store::StateStore;
pub use types::*;
