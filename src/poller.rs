// src/poller.rs

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::gtr_data::GtrDataService;

/// Fixed-interval refresh of the pending-HHEE counters, the widget that
/// used to re-fetch on a bare timer. One explicit task per owner, with
/// an explicit stop: no interval handle left behind to leak when the
/// owner goes away. Fetches once immediately, then every `interval`.
/// No backoff and no jitter; a failed fetch just logs and waits for the
/// next tick.
pub struct PendingMetricsPoller {
    handle: JoinHandle<()>,
    stop_tx: watch::Sender<bool>,
}

impl PendingMetricsPoller {
    pub fn spawn(service: Arc<GtrDataService>, interval: Duration) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match service.metricas_pendientes().await {
                            Ok(metricas) => {
                                info!(
                                    "HHEE pendientes: {} total across {} campaign(s)",
                                    metricas.total_pendientes,
                                    metricas.por_campana.len()
                                );
                                for campana in &metricas.por_campana {
                                    info!("  {}: {}", campana.campana, campana.pendientes);
                                }
                            }
                            Err(e) => warn!("Pending-metrics poll failed: {}", e),
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Pending-metrics poller stopped");
        });

        Self { handle, stop_tx }
    }

    /// Signals the task and waits for it to wind down.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.handle.await;
    }
}
