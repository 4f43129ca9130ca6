use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

use crate::error::{OracleError, Result};

/// Wire Ctrl-C / SIGTERM to a watch channel shared by the relay and the gateway.
///
/// The first signal asks both to stop and lets in-flight requests finish; a
/// second one exits immediately.
pub fn install_shutdown_handler() -> Result<(watch::Sender<()>, watch::Receiver<()>)> {
    let (tx, rx) = watch::channel(());
    let signal_tx = tx.clone();
    let signalled = AtomicBool::new(false);
    ctrlc::set_handler(move || {
        if signalled.swap(true, Ordering::SeqCst) {
            log::warn!("Second shutdown signal, exiting now");
            std::process::exit(130);
        }
        log::info!("Shutdown signal received, draining in-flight requests");
        let _ = signal_tx.send(());
    })
    .map_err(|e| OracleError::Init(format!("signal handler: {}", e)))?;
    Ok((tx, rx))
}
