//! Deepgram streaming ASR adapter
//!
//! Reference `AsrEnginePort` implementation over Deepgram's live WebSocket
//! API. Pushed PCM frames are forwarded as binary WebSocket messages;
//! interim results become the hypothesis buffer, final results become
//! stable tokens.
//! Reference: https://developers.deepgram.com/docs/live-streaming-audio

use crate::domain::{AsrToken, HypothesisBuffer};
use crate::error::{CoordinatorError, Result};
use crate::ports::asr::AsrEnginePort;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

const DEEPGRAM_STREAMING_URL: &str = "wss://api.deepgram.com/v1/listen";

type WsSink = futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>, Message>;

/// Reference streaming ASR adapter backed by Deepgram's WebSocket API.
pub struct DeepgramStreamingAsr {
    ws_sender: Arc<Mutex<Option<WsSink>>>,
    stable_tokens: Arc<Mutex<VecDeque<AsrToken>>>,
    hypothesis: Arc<Mutex<Option<HypothesisBuffer>>>,
    receiver_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl DeepgramStreamingAsr {
    pub async fn connect(api_key: String, model: &str) -> Result<Self> {
        let url = format!(
            "{DEEPGRAM_STREAMING_URL}?model={model}&punctuate=true&interim_results=true\
&encoding=linear16&sample_rate=16000&channels=1"
        );

        let request = tokio_tungstenite::tungstenite::http::Request::builder()
            .uri(&url)
            .header("Authorization", format!("Token {api_key}"))
            .body(())
            .map_err(|e| CoordinatorError::Transcription(format!("failed to build request: {e}")))?;

        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| CoordinatorError::Transcription(format!("websocket connection failed: {e}")))?;

        let (write, mut read) = ws_stream.split();
        let ws_sender = Arc::new(Mutex::new(Some(write)));
        let stable_tokens = Arc::new(Mutex::new(VecDeque::new()));
        let hypothesis = Arc::new(Mutex::new(None));

        let stable_tokens_clone = Arc::clone(&stable_tokens);
        let hypothesis_clone = Arc::clone(&hypothesis);
        let receiver_task = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if let Ok(response) = serde_json::from_str::<DeepgramResponse>(&text) {
                            handle_response(response, &stable_tokens_clone, &hypothesis_clone).await;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Err(e) => {
                        log::error!("deepgram websocket error: {e}");
                        break;
                    }
                    _ => {}
                }
            }
        });

        Ok(Self {
            ws_sender,
            stable_tokens,
            hypothesis,
            receiver_task: Mutex::new(Some(receiver_task)),
        })
    }
}

async fn handle_response(
    response: DeepgramResponse,
    stable_tokens: &Arc<Mutex<VecDeque<AsrToken>>>,
    hypothesis: &Arc<Mutex<Option<HypothesisBuffer>>>,
) {
    let Some(alternative) = response
        .channel
        .as_ref()
        .and_then(|c| c.alternatives.first())
    else {
        return;
    };
    if alternative.transcript.is_empty() {
        return;
    }

    let start = response.start.unwrap_or(0.0);
    let end = start + response.duration.unwrap_or(0.0);

    if response.is_final.unwrap_or(false) {
        *hypothesis.lock().await = None;
        stable_tokens
            .lock()
            .await
            .push_back(AsrToken::new(start, end, alternative.transcript.clone()));
    } else {
        *hypothesis.lock().await = Some(HypothesisBuffer {
            text: alternative.transcript.clone(),
            end_sec: end,
        });
    }
}

#[async_trait]
impl AsrEnginePort for DeepgramStreamingAsr {
    async fn push(&self, frame: &[f32]) -> Result<()> {
        let bytes: Vec<u8> = frame
            .iter()
            .flat_map(|s| ((s.clamp(-1.0, 1.0) * 32768.0) as i16).to_le_bytes())
            .collect();

        let mut sender = self.ws_sender.lock().await;
        match sender.as_mut() {
            Some(ws) => ws
                .send(Message::Binary(bytes))
                .await
                .map_err(|e| CoordinatorError::Transcription(format!("failed to send audio: {e}"))),
            None => Err(CoordinatorError::Transcription(
                "websocket connection is closed".to_string(),
            )),
        }
    }

    async fn pull_tokens(&self) -> Result<Vec<AsrToken>> {
        Ok(self.stable_tokens.lock().await.drain(..).collect())
    }

    async fn hypothesis(&self) -> Result<Option<HypothesisBuffer>> {
        Ok(self.hypothesis.lock().await.clone())
    }

    async fn finish(&self) -> Result<Option<String>> {
        let mut sender = self.ws_sender.lock().await;
        if let Some(mut ws) = sender.take() {
            let _ = ws.send(Message::Close(None)).await;
            let _ = ws.close().await;
        }
        drop(sender);

        if let Some(task) = self.receiver_task.lock().await.take() {
            let _ = task.await;
        }

        Ok(self.hypothesis.lock().await.take().map(|h| h.text))
    }
}

impl Drop for DeepgramStreamingAsr {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.receiver_task.try_lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeepgramResponse {
    channel: Option<DeepgramChannel>,
    is_final: Option<bool>,
    start: Option<f64>,
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(Debug, Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}
