/// Decoder Supervisor
///
/// Owns a child process performing container-to-PCM decoding (arbitrary
/// container in, interleaved s16le mono 16kHz PCM out). Tracks last-activity
/// for the idle watchdog, resizes its read buffer adaptively, and hands
/// fixed-duration f32 frames downstream to the transcription and
/// diarization stage queues.
use crate::config::{BYTES_PER_SAMPLE, SAMPLE_RATE_HZ};
use crate::error::{CoordinatorError, Result};
use crate::stages::queues::{StageMessage, DIARIZATION_QUEUE_SOFT_CAP};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

const WRITE_TIMEOUT: Duration = Duration::from_secs(8);
const WRITE_TIMEOUT_AFTER_RETRY: Duration = Duration::from_secs(10);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(4);
const FLUSH_TIMEOUT_AFTER_RETRY: Duration = Duration::from_secs(6);
const TERMINATE_GRACE: Duration = Duration::from_secs(3);
const KILL_GRACE: Duration = Duration::from_secs(2);
const MAX_RESTART_ATTEMPTS: u32 = 3;
const RESTART_BACKOFF_BASE: Duration = Duration::from_secs(1);

const READ_FLOOR_BYTES: usize = 4096;
const READ_CEILING_BYTES: usize = 160_000;
const RING_CAPACITY_BYTES: usize = 5 * (SAMPLE_RATE_HZ as usize) * (BYTES_PER_SAMPLE as usize);
const DIARIZATION_CHUNK_SEC: f64 = 2.0;
const IDLE_RESTART_THRESHOLD: Duration = Duration::from_secs(60);
const DIARIZATION_DROP_WARNING_INTERVAL: Duration = Duration::from_secs(10);
const READ_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Builds a fresh `tokio::process::Command` for (re)spawning the decoder
/// child. Kept behind a closure so `restart()` can create new processes
/// without the caller re-threading process arguments through every call.
pub type DecoderCommandFactory = Arc<dyn Fn() -> Command + Send + Sync>;

fn spawn_child(factory: &DecoderCommandFactory) -> std::io::Result<(Child, ChildStdin, ChildStdout)> {
    let mut command = factory();
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = command.spawn()?;
    let stdin = child.stdin.take().expect("decoder child has no stdin pipe");
    let stdout = child
        .stdout
        .take()
        .expect("decoder child has no stdout pipe");
    Ok((child, stdin, stdout))
}

#[derive(Debug, thiserror::Error)]
enum DecoderIoError {
    #[error("decoder input is closed")]
    ClosedInput,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

struct DecoderProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: ChildStdout,
}

/// Wraps a child decoder process and the accumulation state needed to turn
/// its PCM output into frames for the transcription and diarization queues.
pub struct DecoderSupervisor {
    process: AsyncMutex<DecoderProcess>,
    factory: DecoderCommandFactory,
    last_activity: Arc<AtomicU64>,
    session_start: Instant,
    retried: AtomicBool,
    last_diarization_warning: AsyncMutex<Option<Instant>>,
}

impl DecoderSupervisor {
    /// Spawns the decoder child process via `factory` and returns a
    /// supervisor ready to accept `push`/drive `run`.
    pub fn spawn(factory: DecoderCommandFactory) -> Result<Self> {
        let (child, stdin, stdout) =
            spawn_child(&factory).map_err(|e| CoordinatorError::Decoder(e.to_string()))?;
        let now = Instant::now();
        Ok(Self {
            process: AsyncMutex::new(DecoderProcess {
                child,
                stdin: Some(stdin),
                stdout,
            }),
            factory,
            last_activity: Arc::new(AtomicU64::new(0)),
            session_start: now,
            retried: AtomicBool::new(false),
            last_diarization_warning: AsyncMutex::new(None),
        })
    }

    fn elapsed_since_activity_ms(&self) -> u64 {
        self.session_start.elapsed().as_millis() as u64 - self.last_activity.load(Ordering::Relaxed)
    }

    /// Milliseconds since the last successful read, used by the top-level
    /// Watchdog (§4.10), independent of the decoder's own idle check inside
    /// `run` (§4.1).
    pub fn idle_ms(&self) -> u64 {
        self.elapsed_since_activity_ms()
    }

    fn mark_activity(&self) {
        self.last_activity.store(
            self.session_start.elapsed().as_millis() as u64,
            Ordering::Relaxed,
        );
    }

    /// Writes container bytes to the child's stdin. On broken pipe, timeout,
    /// or a closed input, attempts one restart and returns without raising
    /// — write/flush timeouts are a transient, logged-and-swallowed
    /// condition, never propagated to the caller (§4.1, §7).
    pub async fn push(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let retried = self.retried.load(Ordering::Relaxed);
        let write_timeout = if retried {
            WRITE_TIMEOUT_AFTER_RETRY
        } else {
            WRITE_TIMEOUT
        };
        let flush_timeout = if retried {
            FLUSH_TIMEOUT_AFTER_RETRY
        } else {
            FLUSH_TIMEOUT
        };

        let write_result = {
            let mut guard = self.process.lock().await;
            match guard.stdin.as_mut() {
                Some(stdin) => tokio::time::timeout(write_timeout, stdin.write_all(bytes))
                    .await
                    .map(|inner| inner.map_err(DecoderIoError::from)),
                None => Ok(Err(DecoderIoError::ClosedInput)),
            }
        };

        let needs_restart = match write_result {
            Ok(Ok(())) => {
                let flush_result = {
                    let mut guard = self.process.lock().await;
                    match guard.stdin.as_mut() {
                        Some(stdin) => tokio::time::timeout(flush_timeout, stdin.flush())
                            .await
                            .map(|inner| inner.map_err(DecoderIoError::from)),
                        None => Ok(Err(DecoderIoError::ClosedInput)),
                    }
                };
                match flush_result {
                    Ok(Ok(())) => false,
                    Ok(Err(e)) => {
                        log::warn!("decoder flush failed: {e}");
                        true
                    }
                    Err(_) => {
                        log::warn!("decoder flush timed out after {flush_timeout:?}");
                        true
                    }
                }
            }
            Ok(Err(e)) => {
                log::warn!("decoder write failed: {e}");
                true
            }
            Err(_) => {
                log::warn!("decoder write timed out after {write_timeout:?}");
                true
            }
        };

        if needs_restart {
            if let Err(e) = self.restart().await {
                log::error!("decoder restart failed after push error: {e}");
            }
        }
    }

    /// Closes child streams in order (input, output, error), terminates with
    /// a grace period, then kills, then retries spawning a fresh child up to
    /// `MAX_RESTART_ATTEMPTS` times with linear back-off.
    pub async fn restart(&self) -> Result<()> {
        self.retried.store(true, Ordering::Relaxed);
        self.teardown_current().await;

        for attempt in 0..MAX_RESTART_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(RESTART_BACKOFF_BASE * attempt).await;
            }
            match spawn_child(&self.factory) {
                Ok((child, stdin, stdout)) => {
                    let mut guard = self.process.lock().await;
                    *guard = DecoderProcess {
                        child,
                        stdin: Some(stdin),
                        stdout,
                    };
                    self.mark_activity();
                    log::info!("decoder restarted on attempt {}", attempt + 1);
                    return Ok(());
                }
                Err(e) => {
                    log::warn!("decoder restart attempt {} failed: {e}", attempt + 1);
                }
            }
        }

        Err(CoordinatorError::Decoder(
            "decoder unrecoverable after restart attempts exhausted".to_string(),
        ))
    }

    async fn teardown_current(&self) {
        let mut guard = self.process.lock().await;
        // Dropping stdin closes the pipe; many decoders exit cleanly on
        // input EOF, which covers the "terminate" grace in most cases.
        drop(guard.stdin.take());

        let terminated = tokio::time::timeout(TERMINATE_GRACE, guard.child.wait()).await;
        if terminated.is_err() {
            log::warn!("decoder did not exit within terminate grace, killing");
            if let Err(e) = guard.child.start_kill() {
                log::warn!("failed to send kill to decoder child: {e}");
            }
            let _ = tokio::time::timeout(KILL_GRACE, guard.child.wait()).await;
        }
    }

    /// Idempotent shutdown, identical to restart's teardown path but without
    /// spawning a replacement.
    pub async fn cleanup(&self) {
        self.teardown_current().await;
    }

    /// Drives the read loop: reads PCM from the child's stdout with an
    /// adaptive buffer size, converts s16le to f32, and delivers frames to
    /// the transcription and diarization stage queues until cancelled or
    /// end-of-stream.
    pub async fn run(
        self: Arc<Self>,
        transcription_tx: mpsc::Sender<StageMessage>,
        diarization_tx: mpsc::Sender<StageMessage>,
        min_chunk_bytes: usize,
        cancel: CancellationToken,
    ) {
        let mut transcription_accum: Vec<f32> = Vec::new();
        let mut diarization_accum: Vec<f32> = Vec::new();
        let min_chunk_samples = min_chunk_bytes / (BYTES_PER_SAMPLE as usize);
        let diarization_chunk_samples =
            (DIARIZATION_CHUNK_SEC * SAMPLE_RATE_HZ as f64) as usize;

        let mut last_read = Instant::now();
        let mut read_buf = vec![0u8; READ_FLOOR_BYTES];

        loop {
            if cancel.is_cancelled() {
                break;
            }

            if self.elapsed_since_activity_ms() > IDLE_RESTART_THRESHOLD.as_millis() as u64 {
                log::warn!("decoder idle for over 60s, restarting");
                if let Err(e) = self.restart().await {
                    log::error!("idle-triggered decoder restart failed: {e}");
                }
            }

            let elapsed = last_read.elapsed();
            let adaptive_size = ((elapsed.as_secs_f64() * 32_000.0) as usize)
                .max(READ_FLOOR_BYTES)
                .min(READ_CEILING_BYTES);
            if read_buf.len() < adaptive_size {
                read_buf.resize(adaptive_size, 0);
            }

            let read_result = {
                let mut guard = self.process.lock().await;
                tokio::time::timeout(READ_POLL_INTERVAL, guard.stdout.read(&mut read_buf[..adaptive_size])).await
            };

            let n = match read_result {
                // Poll interval elapsed with no data; loop back around so the
                // idle-restart and cancellation checks above keep firing
                // while the child is merely quiet, not dead.
                Err(_elapsed) => continue,
                Ok(Ok(0)) => {
                    // EOF on stdout: the child process exited or closed its
                    // output, e.g. after `cleanup()` drops stdin. Treat as
                    // end of stream rather than retrying forever.
                    break;
                }
                Ok(Ok(n)) => {
                    last_read = Instant::now();
                    n
                }
                Ok(Err(e)) => {
                    log::warn!("decoder read error: {e}");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            };

            self.mark_activity();
            let samples = s16le_to_f32(&read_buf[..n]);
            transcription_accum.extend_from_slice(&samples);
            diarization_accum.extend_from_slice(&samples);

            if transcription_accum.len() >= min_chunk_samples {
                let frame = std::mem::take(&mut transcription_accum);
                if transcription_tx
                    .send(StageMessage::Frame(frame))
                    .await
                    .is_err()
                {
                    break;
                }
            }

            if diarization_accum.len() >= diarization_chunk_samples {
                if diarization_queue_depth(&diarization_tx) < DIARIZATION_QUEUE_SOFT_CAP {
                    let frame = std::mem::take(&mut diarization_accum);
                    if diarization_tx.send(StageMessage::Frame(frame)).await.is_err() {
                        break;
                    }
                } else {
                    diarization_accum.clear();
                    self.warn_diarization_drop().await;
                }
            }
        }

        if !transcription_accum.is_empty() {
            let _ = transcription_tx
                .send(StageMessage::Frame(transcription_accum))
                .await;
        }
        if !diarization_accum.is_empty() {
            let _ = diarization_tx
                .send(StageMessage::Frame(diarization_accum))
                .await;
        }
        let _ = transcription_tx.send(StageMessage::EndOfStream).await;
        let _ = diarization_tx.send(StageMessage::EndOfStream).await;
    }

    async fn warn_diarization_drop(&self) {
        let mut last = self.last_diarization_warning.lock().await;
        let now = Instant::now();
        let should_warn = last.map_or(true, |t| now.duration_since(t) >= DIARIZATION_DROP_WARNING_INTERVAL);
        if should_warn {
            log::warn!("diarization queue full, dropping buffered audio");
            *last = Some(now);
        }
    }
}

/// True number of items currently queued, independent of the channel's
/// configured capacity headroom (B2: must never exceed the soft cap).
fn diarization_queue_depth(tx: &mpsc::Sender<StageMessage>) -> usize {
    tx.max_capacity() - tx.capacity()
}

/// Converts interleaved signed-16-bit little-endian PCM to f32 samples in
/// [-1, 1] (§9 numeric semantics: divide by 32768.0).
fn s16le_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_s16le_to_normalized_f32() {
        let bytes = (-32768i16).to_le_bytes();
        let samples = s16le_to_f32(&bytes);
        assert_eq!(samples, vec![-1.0]);

        let bytes = 0i16.to_le_bytes();
        assert_eq!(s16le_to_f32(&bytes), vec![0.0]);
    }

    #[test]
    fn ring_capacity_matches_five_seconds() {
        assert_eq!(RING_CAPACITY_BYTES, 5 * 16_000 * 2);
    }

    #[tokio::test]
    async fn diarization_queue_never_reports_full_before_soft_cap() {
        use crate::stages::queues::StageQueues;

        let queues = StageQueues::new();
        for i in 0..DIARIZATION_QUEUE_SOFT_CAP {
            assert!(
                diarization_queue_depth(&queues.diarization_tx) < DIARIZATION_QUEUE_SOFT_CAP,
                "queue reported full after only {i} items"
            );
            queues
                .diarization_tx
                .send(StageMessage::Frame(vec![]))
                .await
                .unwrap();
        }

        assert_eq!(diarization_queue_depth(&queues.diarization_tx), DIARIZATION_QUEUE_SOFT_CAP);
    }
}
