//! Signal handling for graceful shutdown

use anyhow::Result;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{error, info};

/// Resolve the returned receiver on Ctrl+C (SIGINT) or SIGTERM
pub fn setup_signal_handlers() -> Result<oneshot::Receiver<()>> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let sigterm = Arc::new(AtomicBool::new(false));
    #[cfg(unix)]
    signal_hook::flag::register(signal_hook::consts::SIGTERM, sigterm.clone())?;

    tokio::spawn(async move {
        wait_for_shutdown(tokio::signal::ctrl_c(), sigterm).await;
        let _ = shutdown_tx.send(());
    });

    Ok(shutdown_rx)
}

/// Return once `ctrl_c` fires or `sigterm` is raised.
///
/// A failed Ctrl+C listener leaves SIGTERM as the only trigger.
async fn wait_for_shutdown(
    ctrl_c: impl Future<Output = std::io::Result<()>>,
    sigterm: Arc<AtomicBool>,
) {
    tokio::select! {
        result = ctrl_c => match result {
            Ok(()) => info!("Ctrl+C signal received"),
            Err(e) => {
                error!("Failed to listen for Ctrl+C signal: {}", e);
                wait_for_flag(sigterm).await;
                info!("SIGTERM signal received");
            }
        },
        _ = wait_for_flag(sigterm.clone()) => info!("SIGTERM signal received"),
    }
}

async fn wait_for_flag(flag: Arc<AtomicBool>) {
    while !flag.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_failed_ctrl_c_listener_waits_for_sigterm() {
        let sigterm = Arc::new(AtomicBool::new(false));
        let ctrl_c = async { Err::<(), _>(std::io::Error::other("no signal driver")) };
        let mut waiter = tokio::spawn(wait_for_shutdown(ctrl_c, sigterm.clone()));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!waiter.is_finished());

        sigterm.store(true, Ordering::Relaxed);
        tokio::time::timeout(Duration::from_secs(1), &mut waiter).await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ctrl_c_triggers_shutdown() {
        let sigterm = Arc::new(AtomicBool::new(false));
        tokio::time::timeout(Duration::from_secs(1), wait_for_shutdown(async { Ok::<(), std::io::Error>(()) }, sigterm))
            .await
            .unwrap();
    }
}
