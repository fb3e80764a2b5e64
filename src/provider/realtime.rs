//! Realtime duplex provider client
//!
//! One WebSocket multiplexes recognition, chat and synthesis with
//! server-side turn detection:
//!
//! 1. **Connect** — WebSocket to `{realtime_url}?model=...` with a Bearer key
//! 2. **Setup** — send `session.update` with persona instructions, audio
//!    format and VAD configuration
//! 3. **Stream** — send `input_audio_buffer.append` (Base64 PCM16), receive
//!    transcripts, `response.audio.delta` chunks and turn events
//! 4. **Close** — gracefully close the session

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

/// Server-VAD energy threshold
const VAD_THRESHOLD: f64 = 0.1;

/// Audio retained before the detected speech start, in milliseconds
const VAD_PREFIX_PADDING_MS: u32 = 500;

/// Trailing silence that ends an utterance, in milliseconds
const VAD_SILENCE_DURATION_MS: u32 = 900;

/// Outbound message for the socket writer task
#[derive(Debug)]
enum Outbound {
    /// Raw PCM16 frame bytes, Base64-encoded into `input_audio_buffer.append`
    Audio(Vec<u8>),
    /// A pre-serialized control envelope
    Control(serde_json::Value),
    /// Close the connection
    Close,
}

/// Client for a realtime duplex voice provider
pub struct RealtimeClient {
    outbound_tx: mpsc::Sender<Outbound>,
    event_rx: mpsc::Receiver<ProviderEvent>,
    session_id: String,
}

impl RealtimeClient {
    /// Connect and configure a realtime session
    ///
    /// # Errors
    ///
    /// Returns `Auth` if the handshake is rejected, `Network` otherwise
    pub async fn connect(
        credentials: &Credentials,
        model: &str,
        voice: &str,
        instructions: &str,
    ) -> Result<Self> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let url = format!("{}?model={model}", credentials.realtime_url);

        tracing::info!(session_id = %session_id, model, voice, "connecting to realtime provider");

        let mut request = url
            .into_client_request()
            .map_err(|e| Error::Network(format!("bad realtime URL: {e}")))?;
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

        // Configure the session before any audio flows
        let session_update = build_session_update(voice, instructions);
        {
            let mut sender = ws_sender.lock().await;
            sender
                .send(WsMessage::Text(session_update.to_string().into()))
                .await?;
        }

        let sender_task = Arc::clone(&ws_sender);
        let sid_out = session_id.clone();
        tokio::spawn(async move {
            outbound_loop(outbound_rx, sender_task, sid_out).await;
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

    /// Session identifier for logging
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl DuplexProvider for RealtimeClient {
    async fn send_control(&self, event: ControlEvent) -> Result<()> {
        let envelope = match event {
            ControlEvent::CommitAudio => serde_json::json!({
                "type": "input_audio_buffer.commit",
            }),
            ControlEvent::CreateResponse => serde_json::json!({
                "type": "response.create",
                "response": { "modalities": ["text", "audio"] },
            }),
            ControlEvent::CancelResponse => serde_json::json!({
                "type": "response.cancel",
            }),
        };

        self.outbound_tx
            .send(Outbound::Control(envelope))
            .await
            .map_err(|_| Error::Disconnected("realtime writer gone".to_string()))
    }

    async fn send_audio(&self, frame: &AudioFrame) -> Result<()> {
        if frame.is_empty() {
            return Ok(());
        }
        self.outbound_tx
            .send(Outbound::Audio(samples_to_pcm_bytes(&frame.samples)))
            .await
            .map_err(|_| Error::Disconnected("realtime writer gone".to_string()))
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

/// Writer task: serialize outbound frames onto the socket
async fn outbound_loop(
    mut rx: mpsc::Receiver<Outbound>,
    ws_sender: Arc<Mutex<WsSink>>,
    session_id: String,
) {
    let mut audio_chunks: u64 = 0;

    while let Some(msg) = rx.recv().await {
        match msg {
            Outbound::Audio(pcm) => {
                audio_chunks += 1;
                let b64 = base64::engine::general_purpose::STANDARD.encode(&pcm);
                let envelope = serde_json::json!({
                    "event_id": format!("event_{}", uuid::Uuid::new_v4().simple()),
                    "type": "input_audio_buffer.append",
                    "audio": b64,
                });
                if audio_chunks == 1 || audio_chunks % 100 == 0 {
                    tracing::trace!(
                        session_id = %session_id,
                        chunk = audio_chunks,
                        pcm_bytes = pcm.len(),
                        "streaming capture audio"
                    );
                }
                let mut sender = ws_sender.lock().await;
                if sender
                    .send(WsMessage::Text(envelope.to_string().into()))
                    .await
                    .is_err()
                {
                    tracing::warn!(session_id = %session_id, "websocket send failed, closing writer");
                    break;
                }
            }
            Outbound::Control(envelope) => {
                tracing::debug!(
                    session_id = %session_id,
                    event = envelope.get("type").and_then(|t| t.as_str()).unwrap_or(""),
                    "sending control event"
                );
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

    tracing::debug!(session_id = %session_id, "realtime writer terminated");
}

/// Reader task: parse server events and forward them in emission order
async fn inbound_loop(mut ws_receiver: WsSource, event_tx: mpsc::Sender<ProviderEvent>, session_id: String) {
    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result {
            Ok(WsMessage::Text(text)) => {
                for event in parse_server_event(text.as_str(), &session_id) {
                    if event_tx.send(event).await.is_err() {
                        tracing::debug!(session_id = %session_id, "event receiver dropped, closing reader");
                        return;
                    }
                }
            }
            Ok(WsMessage::Close(frame)) => {
                tracing::info!(session_id = %session_id, close_frame = ?frame, "realtime connection closed");
                break;
            }
            Ok(
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) | WsMessage::Binary(_),
            ) => {
                // Binary frames are not part of the protocol; ping/pong is
                // handled by tungstenite
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "realtime websocket error");
                break;
            }
        }
    }

    let _ = event_tx.send(ProviderEvent::Disconnected).await;
    tracing::debug!(session_id = %session_id, "realtime reader terminated");
}

/// Build the `session.update` envelope
fn build_session_update(voice: &str, instructions: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "session.update",
        "session": {
            "modalities": ["text", "audio"],
            "voice": voice,
            "instructions": instructions,
            "input_audio_format": "pcm16",
            "output_audio_format": "pcm16",
            "input_audio_transcription": {
                "model": "gummy-realtime-v1"
            },
            "turn_detection": {
                "type": "server_vad",
                "threshold": VAD_THRESHOLD,
                "prefix_padding_ms": VAD_PREFIX_PADDING_MS,
                "silence_duration_ms": VAD_SILENCE_DURATION_MS
            }
        }
    })
}

/// Parse one server envelope into zero or more provider events
fn parse_server_event(json_text: &str, session_id: &str) -> Vec<ProviderEvent> {
    let mut events = Vec::new();

    let value: serde_json::Value = match serde_json::from_str(json_text) {
        Ok(v) => v,
        Err(e) => {
            events.push(ProviderEvent::ProviderError {
                message: format!("unparseable server event: {e}"),
            });
            return events;
        }
    };

    let event_type = value.get("type").and_then(|v| v.as_str()).unwrap_or("");

    match event_type {
        "session.created" | "session.updated" => {
            tracing::debug!(session_id = %session_id, event_type, "realtime session ready");
        }

        "input_audio_buffer.speech_started" => {
            tracing::debug!(session_id = %session_id, "server VAD: speech started");
            events.push(ProviderEvent::SpeechStarted);
        }

        "input_audio_buffer.speech_stopped" => {
            tracing::debug!(session_id = %session_id, "server VAD: speech stopped");
            events.push(ProviderEvent::SpeechStopped);
        }

        "conversation.item.input_audio_transcription.completed" => {
            let text = value
                .get("transcript")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            events.push(ProviderEvent::FinalTranscript { text });
        }

        "response.created" => {
            let response_id = value
                .get("response")
                .and_then(|r| r.get("id"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            events.push(ProviderEvent::ResponseStarted { response_id });
        }

        "response.output_item.added" => {
            let item_id = value
                .get("item")
                .and_then(|i| i.get("id"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            events.push(ProviderEvent::ResponseItem { item_id });
        }

        "response.text.delta" | "response.audio_transcript.delta" => {
            if let Some(text) = value.get("delta").and_then(|v| v.as_str()) {
                if !text.is_empty() {
                    events.push(ProviderEvent::TextDelta {
                        text: text.to_string(),
                    });
                }
            }
        }

        "response.audio.delta" => {
            if let Some(delta_b64) = value.get("delta").and_then(|v| v.as_str()) {
                match base64::engine::general_purpose::STANDARD.decode(delta_b64) {
                    Ok(pcm) => events.push(ProviderEvent::AudioDelta { pcm }),
                    Err(e) => {
                        tracing::warn!(session_id = %session_id, error = %e, "bad audio delta");
                    }
                }
            }
        }

        "response.done" | "response.cancelled" => {
            events.push(ProviderEvent::ResponseDone);
        }

        "error" => {
            let message = value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown provider error");
            tracing::error!(session_id = %session_id, error = %message, "realtime provider error");
            events.push(ProviderEvent::ProviderError {
                message: message.to_string(),
            });
        }

        _ => {
            tracing::debug!(session_id = %session_id, event_type, "unhandled realtime event");
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_session_update_shape() {
        let msg = build_session_update("Chelsie", "You are a helpful assistant.");

        assert_eq!(msg["type"], "session.update");
        assert_eq!(msg["session"]["voice"], "Chelsie");
        assert_eq!(msg["session"]["input_audio_format"], "pcm16");
        assert_eq!(msg["session"]["output_audio_format"], "pcm16");
        assert_eq!(msg["session"]["turn_detection"]["type"], "server_vad");
        assert_eq!(msg["session"]["turn_detection"]["silence_duration_ms"], 900);
    }

    #[test]
    fn parse_speech_started() {
        let events = parse_server_event(r#"{"type": "input_audio_buffer.speech_started"}"#, "t");
        assert_eq!(events, vec![ProviderEvent::SpeechStarted]);
    }

    #[test]
    fn parse_response_created() {
        let json = r#"{"type": "response.created", "response": {"id": "resp_42"}}"#;
        let events = parse_server_event(json, "t");
        assert_eq!(
            events,
            vec![ProviderEvent::ResponseStarted {
                response_id: "resp_42".to_string()
            }]
        );
    }

    #[test]
    fn parse_audio_delta() {
        let b64 = base64::engine::general_purpose::STANDARD.encode([10u8, 20, 30, 40]);
        let json = format!(r#"{{"type": "response.audio.delta", "delta": "{b64}"}}"#);
        let events = parse_server_event(&json, "t");

        assert_eq!(
            events,
            vec![ProviderEvent::AudioDelta {
                pcm: vec![10, 20, 30, 40]
            }]
        );
    }

    #[test]
    fn parse_input_transcription_completed() {
        let json = r#"{"type": "conversation.item.input_audio_transcription.completed", "transcript": "你好"}"#;
        let events = parse_server_event(json, "t");
        assert_eq!(
            events,
            vec![ProviderEvent::FinalTranscript {
                text: "你好".to_string()
            }]
        );
    }

    #[test]
    fn parse_response_done_and_cancelled() {
        for json in [r#"{"type": "response.done"}"#, r#"{"type": "response.cancelled"}"#] {
            let events = parse_server_event(json, "t");
            assert_eq!(events, vec![ProviderEvent::ResponseDone]);
        }
    }

    #[test]
    fn parse_error_event() {
        let json = r#"{"type": "error", "error": {"message": "rate limited"}}"#;
        let events = parse_server_event(json, "t");
        assert_eq!(
            events,
            vec![ProviderEvent::ProviderError {
                message: "rate limited".to_string()
            }]
        );
    }

    #[test]
    fn parse_text_delta_skips_empty() {
        let events = parse_server_event(r#"{"type": "response.text.delta", "delta": ""}"#, "t");
        assert!(events.is_empty());
    }

    #[test]
    fn parse_unknown_event_is_silent() {
        let events = parse_server_event(r#"{"type": "rate_limits.updated"}"#, "t");
        assert!(events.is_empty());
    }
}
