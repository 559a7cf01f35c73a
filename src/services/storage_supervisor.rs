use std::time::Duration;

use tokio::{sync::watch, time::sleep};
use tracing::{info, warn};

use crate::state::SharedState;

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Poll the store health and reconnect with exponential backoff, keeping the
/// shared degraded flag in sync. Returns once `shutdown` turns `true`.
pub async fn run(state: SharedState, mut shutdown: watch::Receiver<bool>) {
    let store = state.store();
    let mut reconnect_delay = INITIAL_DELAY;

    loop {
        let wait = match store.health_check().await {
            Ok(()) => {
                if state.is_degraded() {
                    info!("storage healthy again; leaving degraded mode");
                    state.update_degraded(false);
                }
                reconnect_delay = INITIAL_DELAY;
                HEALTH_POLL_INTERVAL
            }
            Err(err) => {
                if !state.is_degraded() {
                    warn!(error = %err, "storage health check failed; entering degraded mode");
                    state.update_degraded(true);
                }

                match store.try_reconnect().await {
                    Ok(()) => {
                        info!("storage reconnection succeeded after health check failure");
                        reconnect_delay = INITIAL_DELAY;
                        Duration::ZERO
                    }
                    Err(reconnect_err) => {
                        warn!(
                            error = %reconnect_err,
                            retry_in_ms = reconnect_delay.as_millis() as u64,
                            "storage reconnect attempt failed"
                        );
                        let wait = reconnect_delay;
                        reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
                        wait
                    }
                }
            }
        };

        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = sleep(wait) => {}
        }
    }

    info!("storage supervisor stopped");
}
