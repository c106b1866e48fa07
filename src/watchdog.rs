/// Watchdog
///
/// Every 15 s, samples the decoder's idle time and the stage tasks'
/// liveness. Triggers a restart when idle exceeds 30 s (independent of the
/// decoder's own 60 s internal idle check), and logs a rate-limited warning
/// past 20 s (§4.10).
use crate::decoder::DecoderSupervisor;
use crate::state::Coordinator;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const CHECK_INTERVAL: Duration = Duration::from_secs(15);
const RESTART_IDLE_THRESHOLD_MS: u64 = 30_000;
const WARNING_IDLE_THRESHOLD_MS: u64 = 20_000;
const WARNING_RATE_LIMIT: Duration = Duration::from_secs(60);

/// A stage task's handle, reported on exactly once after it terminates.
struct StageSlot {
    name: &'static str,
    handle: Mutex<Option<JoinHandle<()>>>,
}

pub struct Watchdog {
    decoder: Arc<DecoderSupervisor>,
    coordinator: Arc<Coordinator>,
    stage_handles: Vec<StageSlot>,
    last_warning: Mutex<Option<Instant>>,
}

impl Watchdog {
    pub fn new(
        decoder: Arc<DecoderSupervisor>,
        coordinator: Arc<Coordinator>,
        stage_handles: Vec<(&'static str, JoinHandle<()>)>,
    ) -> Self {
        Self {
            decoder,
            coordinator,
            stage_handles: stage_handles
                .into_iter()
                .map(|(name, handle)| StageSlot {
                    name,
                    handle: Mutex::new(Some(handle)),
                })
                .collect(),
            last_warning: Mutex::new(None),
        }
    }

    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(CHECK_INTERVAL) => {}
            }

            for slot in &self.stage_handles {
                report_if_finished(slot).await;
            }

            let idle_ms = self.decoder.idle_ms();
            let is_stopping = self.coordinator.is_stopping().await;

            if idle_ms > RESTART_IDLE_THRESHOLD_MS && !is_stopping {
                log::warn!("decoder idle for {idle_ms}ms, triggering watchdog restart");
                if let Err(e) = self.decoder.restart().await {
                    log::error!("watchdog-triggered decoder restart failed: {e}");
                }
            } else if idle_ms > WARNING_IDLE_THRESHOLD_MS {
                self.warn_idle(idle_ms).await;
            }
        }
    }

    async fn warn_idle(&self, idle_ms: u64) {
        let mut last = self.last_warning.lock().await;
        let now = Instant::now();
        let should_warn = last.map_or(true, |t| now.duration_since(t) >= WARNING_RATE_LIMIT);
        if should_warn {
            log::warn!("decoder idle for {idle_ms}ms");
            *last = Some(now);
        }
    }
}

/// Awaits a stage task's `JoinHandle` once it has finished and logs normal
/// completion vs. failure with cause, matching the original's task-exception
/// inspection. Reports at most once per stage.
async fn report_if_finished(slot: &StageSlot) {
    let mut guard = slot.handle.lock().await;
    let Some(handle) = guard.as_ref() else {
        return;
    };
    if !handle.is_finished() {
        return;
    }
    let handle = guard.take().expect("checked above");
    match handle.await {
        Ok(()) => log::info!("stage task '{}' completed normally", slot.name),
        Err(e) if e.is_cancelled() => log::info!("stage task '{}' was cancelled", slot.name),
        Err(e) => {
            let panic = e.into_panic();
            let cause = panic
                .downcast_ref::<String>()
                .cloned()
                .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
                .unwrap_or_else(|| "panicked with non-string payload".to_string());
            log::error!("stage task '{}' failed: {cause}", slot.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_normal_completion_once_and_clears_the_slot() {
        let handle = tokio::spawn(async {});
        let slot = StageSlot {
            name: "test-stage",
            handle: Mutex::new(Some(handle)),
        };
        tokio::task::yield_now().await;

        report_if_finished(&slot).await;
        assert!(slot.handle.lock().await.is_none());

        // A second report on an already-cleared slot must not panic.
        report_if_finished(&slot).await;
    }

    #[tokio::test]
    async fn reports_panic_and_clears_the_slot() {
        let handle = tokio::spawn(async { panic!("boom") });
        let slot = StageSlot {
            name: "test-stage",
            handle: Mutex::new(Some(handle)),
        };
        tokio::task::yield_now().await;

        report_if_finished(&slot).await;
        assert!(slot.handle.lock().await.is_none());
    }

    #[tokio::test]
    async fn leaves_unfinished_slot_untouched() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        let slot = StageSlot {
            name: "test-stage",
            handle: Mutex::new(Some(handle)),
        };

        report_if_finished(&slot).await;
        assert!(slot.handle.lock().await.is_some());
    }
}
