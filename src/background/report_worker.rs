// src/background/report_worker.rs
// Report worker: receives session ids over a channel and generates their reports
//
// Turns that hand off to report generation return immediately; the report is
// produced here, out of band, under the same per-session lock turns use.

use crate::db::{IntakeStore, ReportStatus};
use crate::error::{IntakeError, Result};
use crate::intake::{ReportGenerator, SessionLocks};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Sending half of the report queue
#[derive(Clone)]
pub struct ReportQueue {
    tx: mpsc::UnboundedSender<i64>,
}

impl ReportQueue {
    /// Create a queue and the receiver a `ReportWorker` consumes
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<i64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, session_id: i64) -> Result<()> {
        self.tx
            .send(session_id)
            .map_err(|_| IntakeError::Other("report worker is not running".to_string()))?;
        debug!(session_id, "Report queued");
        Ok(())
    }
}

/// Re-queue every report still `generating` (crash recovery at startup)
pub async fn recover_pending(store: &dyn IntakeStore, queue: &ReportQueue) -> Result<usize> {
    let pending = store.list_pending_report_sessions().await?;
    for session_id in &pending {
        queue.enqueue(*session_id)?;
    }
    if !pending.is_empty() {
        info!(count = pending.len(), "Recovered pending reports");
    }
    Ok(pending.len())
}

/// Background consumer of the report queue
pub struct ReportWorker {
    generator: Arc<ReportGenerator>,
    locks: Arc<SessionLocks>,
    rx: mpsc::UnboundedReceiver<i64>,
    shutdown: watch::Receiver<bool>,
}

impl ReportWorker {
    pub fn new(
        generator: Arc<ReportGenerator>,
        locks: Arc<SessionLocks>,
        rx: mpsc::UnboundedReceiver<i64>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            generator,
            locks,
            rx,
            shutdown,
        }
    }

    /// Run until shutdown is signalled or every queue sender is gone
    pub async fn run(mut self) -> usize {
        info!("Report worker started");
        let mut processed = 0;

        loop {
            if *self.shutdown.borrow() {
                info!("Report worker shutting down");
                break;
            }

            tokio::select! {
                next = self.rx.recv() => {
                    match next {
                        Some(session_id) => {
                            self.process(session_id).await;
                            processed += 1;
                        }
                        None => {
                            info!("Report queue closed, worker exiting");
                            break;
                        }
                    }
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!("Report worker shutting down");
                        break;
                    }
                }
            }
        }

        processed
    }

    async fn process(&self, session_id: i64) {
        let result = {
            let _guard = self.locks.acquire(session_id).await;
            self.generator.generate(session_id).await
        };
        self.locks.release(session_id).await;

        match result {
            Ok(report) => match report.status() {
                ReportStatus::Completed => {
                    info!(session_id, score = report.score, "Report ready")
                }
                ReportStatus::Error => warn!(
                    session_id,
                    error = ?report.content.error,
                    "Report failed, left for retry"
                ),
                ReportStatus::Generating => {}
            },
            Err(e) => warn!(session_id, error = %e, "Report job dropped"),
        }
    }
}
