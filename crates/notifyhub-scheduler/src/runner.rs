//! Timer loop shared by the scheduler services.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing::{error, info};

use notifyhub_core::AppResult;

/// Run `tick` every `interval` until the cancel signal is received.
///
/// The loop sleeps first, so the initial scan happens one interval after
/// startup. A running tick is never interrupted; cancellation takes
/// effect at the next sleep.
pub async fn run_timer<F, Fut>(
    name: &str,
    interval: Duration,
    mut cancel: watch::Receiver<bool>,
    tick: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = AppResult<usize>>,
{
    info!("Scheduler '{}' started, interval={:?}", name, interval);

    loop {
        tokio::select! {
            _ = cancel.changed() => {
                if *cancel.borrow() {
                    info!("Scheduler '{}' received shutdown signal", name);
                    break;
                }
            }
            _ = time::sleep(interval) => {
                match tick().await {
                    Ok(0) => {}
                    Ok(count) => {
                        info!("Scheduler '{}' dispatched {} item(s)", name, count);
                    }
                    Err(e) => {
                        error!("Scheduler '{}' tick failed: {}", name, e);
                    }
                }
            }
        }
    }

    info!("Scheduler '{}' shut down complete", name);
}
