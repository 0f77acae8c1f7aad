pub mod analyze;
pub mod change;
pub mod config;
pub mod evaluate;
pub mod run;

use tokio::sync::watch;
use tracing::{error, info};

/// Flip the returned receiver to `true` on ctrl-c.
///
/// If the signal handler cannot be installed the sender is held forever,
/// so the receiver never reports shutdown.
pub(crate) fn ctrl_c_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                let _ = tx.send(true);
            }
            Err(e) => {
                error!(error = %e, "failed to install ctrl-c handler");
                std::future::pending::<()>().await;
                drop(tx);
            }
        }
    });
    rx
}
