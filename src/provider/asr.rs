//! Streaming speech-recognition client (split pipeline)
//!
//! JSON-over-WebSocket with status-coded frames: the client sends audio
//! frames marked first/continue/last, the server answers with partial
//! results while audio flows and a final result after the last frame.
//! Turn detection is not the recognizer's job here — the local VAD decides
//! utterance boundaries.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

use super::{ControlEvent, Credentials, DuplexProvider, ProviderEvent};
use crate::audio::{AudioFrame, samples_to_pcm_bytes};
use crate::{Error, Result};

/// First audio frame of an utterance
const STATUS_FIRST: u8 = 0;
/// Continuation frame
const STATUS_CONTINUE: u8 = 1;
/// Last frame; asks the server to finalize
const STATUS_LAST: u8 = 2;

#[derive(Debug)]
enum Outbound {
    /// Begin a new utterance (resets frame status to first)
    Start,
    /// PCM16 frame bytes
    Audio(Vec<u8>),
    /// Finalize the current utterance
    Finish,
    /// Close the connection
    Close,
}

/// Client for a streaming recognition socket
pub struct AsrClient {
    outbound_tx: mpsc::Sender<Outbound>,
    event_rx: mpsc::Receiver<ProviderEvent>,
    session_id: String,
}

impl AsrClient {
    /// Connect to the recognition endpoint
    ///
    /// # Errors
    ///
    /// Returns `Auth` if the handshake is rejected, `Network` otherwise
    pub async fn connect(credentials: &Credentials, model: &str, sample_rate: u32) -> Result<Self> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let url = format!("{}?model={model}", credentials.asr_url);

        tracing::info!(session_id = %session_id, model, "connecting to recognition provider");

        let mut request = url
            .into_client_request()
            .map_err(|e| Error::Network(format!("bad recognition URL: {e}")))?;
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {}", credentials.api_key)
                .parse()
                .map_err(|_| Error::Auth("API key contains invalid header bytes".to_string()))?,
        );

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request).await?;
        let (ws_sender, ws_receiver) = ws_stream.split();
        let ws_sender = Arc::new(Mutex::new(ws_sender));

        let (outbound_tx, outbound_rx) = mpsc::channel::<Outbound>(256);
        let (event_tx, event_rx) = mpsc::channel::<ProviderEvent>(256);

        let model = model.to_string();
        let sid_out = session_id.clone();
        tokio::spawn(async move {
            outbound_loop(outbound_rx, ws_sender, model, sample_rate, sid_out).await;
        });

        let sid_in = session_id.clone();
        tokio::spawn(async move {
            inbound_loop(ws_receiver, event_tx, sid_in).await;
        });

        Ok(Self {
            outbound_tx,
            event_rx,
            session_id,
        })
    }

    /// Begin a new utterance; the next audio frame is sent as the first
    ///
    /// # Errors
    ///
    /// Returns error if the connection is gone
    pub async fn start_utterance(&self) -> Result<()> {
        self.outbound_tx
            .send(Outbound::Start)
            .await
            .map_err(|_| Error::Disconnected("recognition writer gone".to_string()))
    }

    /// Session identifier for logging
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl DuplexProvider for AsrClient {
    /// `CommitAudio` finalizes the current utterance. Response control is
    /// meaningless for a pure recognizer and is ignored.
    async fn send_control(&self, event: ControlEvent) -> Result<()> {
        match event {
            ControlEvent::CommitAudio => self
                .outbound_tx
                .send(Outbound::Finish)
                .await
                .map_err(|_| Error::Disconnected("recognition writer gone".to_string())),
            ControlEvent::CreateResponse | ControlEvent::CancelResponse => {
                tracing::debug!(event = ?event, "control event not applicable to recognizer");
                Ok(())
            }
        }
    }

    async fn send_audio(&self, frame: &AudioFrame) -> Result<()> {
        if frame.is_empty() {
            return Ok(());
        }
        self.outbound_tx
            .send(Outbound::Audio(samples_to_pcm_bytes(&frame.samples)))
            .await
            .map_err(|_| Error::Disconnected("recognition writer gone".to_string()))
    }

    async fn next_event(&mut self) -> Option<ProviderEvent> {
        self.event_rx.recv().await
    }

    async fn close(&self) {
        let _ = self.outbound_tx.send(Outbound::Close).await;
    }
}

type WsSink = futures::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    WsMessage,
>;

type WsSource = futures::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;

async fn outbound_loop(
    mut rx: mpsc::Receiver<Outbound>,
    ws_sender: Arc<Mutex<WsSink>>,
    model: String,
    sample_rate: u32,
    session_id: String,
) {
    let mut first_pending = true;

    while let Some(msg) = rx.recv().await {
        match msg {
            Outbound::Start => {
                first_pending = true;
            }
            Outbound::Audio(pcm) => {
                let status = if first_pending {
                    STATUS_FIRST
                } else {
                    STATUS_CONTINUE
                };
                first_pending = false;

                let envelope = serde_json::json!({
                    "status": status,
                    "model": model,
                    "format": "pcm",
                    "sample_rate": sample_rate,
                    "audio": base64::engine::general_purpose::STANDARD.encode(&pcm),
                });
                let mut sender = ws_sender.lock().await;
                if sender
                    .send(WsMessage::Text(envelope.to_string().into()))
                    .await
                    .is_err()
                {
                    tracing::warn!(session_id = %session_id, "recognition send failed, closing writer");
                    break;
                }
            }
            Outbound::Finish => {
                let envelope = serde_json::json!({
                    "status": STATUS_LAST,
                    "audio": "",
                });
                tracing::debug!(session_id = %session_id, "finalizing utterance");
                first_pending = true;

                let mut sender = ws_sender.lock().await;
                if sender
                    .send(WsMessage::Text(envelope.to_string().into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Outbound::Close => {
                let mut sender = ws_sender.lock().await;
                let _ = sender.send(WsMessage::Close(None)).await;
                break;
            }
        }
    }

    tracing::debug!(session_id = %session_id, "recognition writer terminated");
}

async fn inbound_loop(mut ws_receiver: WsSource, event_tx: mpsc::Sender<ProviderEvent>, session_id: String) {
    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result {
            Ok(WsMessage::Text(text)) => {
                if let Some(event) = parse_result(text.as_str(), &session_id) {
                    if event_tx.send(event).await.is_err() {
                        tracing::debug!(session_id = %session_id, "event receiver dropped, closing reader");
                        return;
                    }
                }
            }
            Ok(WsMessage::Close(frame)) => {
                tracing::info!(session_id = %session_id, close_frame = ?frame, "recognition connection closed");
                break;
            }
            Ok(
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) | WsMessage::Binary(_),
            ) => {}
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "recognition websocket error");
                break;
            }
        }
    }

    let _ = event_tx.send(ProviderEvent::Disconnected).await;
    tracing::debug!(session_id = %session_id, "recognition reader terminated");
}

/// Parse one recognition result frame
fn parse_result(json_text: &str, session_id: &str) -> Option<ProviderEvent> {
    let value: serde_json::Value = match serde_json::from_str(json_text) {
        Ok(v) => v,
        Err(e) => {
            return Some(ProviderEvent::ProviderError {
                message: format!("unparseable recognition result: {e}"),
            });
        }
    };

    if let Some(code) = value.get("code").and_then(serde_json::Value::as_i64) {
        if code != 0 {
            let message = value
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("recognition failed");
            tracing::error!(session_id = %session_id, code, error = %message, "recognition provider error");
            return Some(ProviderEvent::ProviderError {
                message: format!("{message} (code {code})"),
            });
        }
    }

    let text = value
        .get("text")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    match value.get("status").and_then(serde_json::Value::as_u64) {
        Some(s) if s == u64::from(STATUS_LAST) => {
            tracing::debug!(session_id = %session_id, text = %text, "final transcript");
            Some(ProviderEvent::FinalTranscript { text })
        }
        Some(_) => {
            if text.is_empty() {
                None
            } else {
                tracing::trace!(session_id = %session_id, text = %text, "partial transcript");
                Some(ProviderEvent::PartialTranscript { text })
            }
        }
        None => None,
    }
}
