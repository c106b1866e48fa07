/// LLM Summarizer
///
/// Accumulates newly committed transcript text and triggers a summarization
/// call either on a wall-clock interval or once enough new characters have
/// accrued (§4.8). Runs detached from `Coordinator` to avoid a cyclic
/// reference: generated summaries are handed back over a channel, and the
/// caller is responsible for deduping (I4) and storing them.
use crate::domain::Summary;
use crate::ports::llm::LlmServicePort;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct LlmSummarizer {
    llm: Arc<dyn LlmServicePort>,
    summary_interval: Duration,
    new_text_trigger_chars: usize,
    pending_text: Mutex<String>,
    chars_since_last: AtomicUsize,
    last_inference: Mutex<Instant>,
    loop_start: Instant,
    total_summaries: AtomicUsize,
    summary_tx: mpsc::Sender<Summary>,
}

impl LlmSummarizer {
    pub fn new(
        llm: Arc<dyn LlmServicePort>,
        summary_interval_seconds: f64,
        new_text_trigger_chars: usize,
        loop_start: Instant,
    ) -> (Arc<Self>, mpsc::Receiver<Summary>) {
        let (summary_tx, summary_rx) = mpsc::channel(16);
        let summarizer = Arc::new(Self {
            llm,
            summary_interval: Duration::from_secs_f64(summary_interval_seconds.max(0.1)),
            new_text_trigger_chars,
            pending_text: Mutex::new(String::new()),
            chars_since_last: AtomicUsize::new(0),
            last_inference: Mutex::new(Instant::now()),
            loop_start,
            total_summaries: AtomicUsize::new(0),
            summary_tx,
        });
        (summarizer, summary_rx)
    }

    pub async fn update(&self, text: &str, _speaker: Option<&str>) {
        if text.is_empty() {
            return;
        }
        let mut pending = self.pending_text.lock().await;
        if !pending.is_empty() {
            pending.push(' ');
        }
        pending.push_str(text);
        self.chars_since_last
            .fetch_add(text.chars().count(), Ordering::Relaxed);
    }

    /// Background trigger loop (§4.8): polls for the time or volume
    /// condition and runs inference when either fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }

            let chars = self.chars_since_last.load(Ordering::Relaxed);
            if chars == 0 {
                continue;
            }
            let interval_elapsed = self.last_inference.lock().await.elapsed() >= self.summary_interval;
            let volume_triggered = chars >= self.new_text_trigger_chars;
            if interval_elapsed || volume_triggered {
                self.infer_now().await;
            }
        }
    }

    /// Runs inference immediately regardless of trigger state, used during
    /// orderly shutdown (§4.7a) to flush any remaining accumulated text.
    pub async fn force_inference(&self) {
        if self.chars_since_last.load(Ordering::Relaxed) == 0 {
            return;
        }
        self.infer_now().await;
    }

    async fn infer_now(&self) {
        let text = {
            let mut pending = self.pending_text.lock().await;
            std::mem::take(&mut *pending)
        };
        self.chars_since_last.store(0, Ordering::Relaxed);
        *self.last_inference.lock().await = Instant::now();
        if text.trim().is_empty() {
            return;
        }
        match self.llm.summarize(&text).await {
            Ok(response) => {
                self.total_summaries.fetch_add(1, Ordering::Relaxed);
                let summary = Summary {
                    timestamp: self.loop_start.elapsed().as_secs_f64(),
                    summary: response.summary,
                    key_points: response.key_points,
                    text_length: text.chars().count(),
                };
                let _ = self.summary_tx.send(summary).await;
            }
            Err(e) => log::warn!("llm summarization failed: {e}"),
        }
    }

    pub fn chars_since_last_inference(&self) -> usize {
        self.chars_since_last.load(Ordering::Relaxed)
    }

    pub fn total_summaries(&self) -> usize {
        self.total_summaries.load(Ordering::Relaxed)
    }

    pub async fn reset(&self) {
        self.pending_text.lock().await.clear();
        self.chars_since_last.store(0, Ordering::Relaxed);
        *self.last_inference.lock().await = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::llm::LlmSummaryResponse;
    use crate::ports::mocks::FakeLlmService;

    #[tokio::test]
    async fn force_inference_flushes_pending_text() {
        let llm = Arc::new(FakeLlmService::new(vec![LlmSummaryResponse {
            summary: "a meeting happened".to_string(),
            key_points: vec!["point".to_string()],
        }]));
        let (summarizer, mut rx) = LlmSummarizer::new(llm, 60.0, 10_000, Instant::now());
        summarizer.update("hello world", None).await;
        summarizer.force_inference().await;
        let summary = rx.recv().await.expect("summary emitted");
        assert_eq!(summary.summary, "a meeting happened");
        assert_eq!(summarizer.chars_since_last_inference(), 0);
    }

    #[tokio::test]
    async fn force_inference_is_noop_with_nothing_pending() {
        let llm = Arc::new(FakeLlmService::new(vec![]));
        let (summarizer, mut rx) = LlmSummarizer::new(llm, 60.0, 10_000, Instant::now());
        summarizer.force_inference().await;
        assert!(rx.try_recv().is_err());
    }
}
