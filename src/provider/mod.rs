//! Cloud provider clients
//!
//! Two pipeline shapes are supported behind the same event vocabulary:
//!
//! - **realtime**: one bidirectional socket multiplexing recognition, chat
//!   and synthesis, with server-side turn detection ([`RealtimeClient`]);
//! - **split**: a streaming recognition socket ([`AsrClient`]), an HTTP
//!   chat-completions client ([`ChatClient`]) and an HTTP synthesis client
//!   ([`TtsClient`]), with turn detection done locally.
//!
//! Adapters normalize each vendor's `{type, ...}` JSON envelope into
//! [`ProviderEvent`]s; nothing outside this module knows wire formats.

mod asr;
mod llm;
mod realtime;
mod tts;

pub use asr::AsrClient;
pub use llm::ChatClient;
pub use realtime::RealtimeClient;
pub use tts::TtsClient;

use async_trait::async_trait;

use crate::Result;
use crate::audio::AudioFrame;

/// Credentials and endpoints for provider access.
///
/// Read once at session construction and never mutated.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Provider API key (Bearer token)
    pub api_key: String,

    /// Realtime duplex WebSocket URL
    pub realtime_url: String,

    /// Streaming recognition WebSocket URL
    pub asr_url: String,

    /// Chat completions base URL (OpenAI-compatible)
    pub chat_url: String,

    /// Speech synthesis base URL
    pub tts_url: String,
}

/// A typed event received from a provider connection.
///
/// Events for one connection are delivered in provider-emission order; the
/// stream is finite and ends with `Disconnected` (or silently on a clean
/// close).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// Server-side or client-side VAD detected the user started speaking
    SpeechStarted,

    /// The user stopped speaking
    SpeechStopped,

    /// Incremental, unstable transcript of the current utterance
    PartialTranscript {
        /// Transcript text so far
        text: String,
    },

    /// Confirmed transcript of the current utterance
    FinalTranscript {
        /// Final transcript text (may be empty)
        text: String,
    },

    /// The assistant began generating a response
    ResponseStarted {
        /// Server-assigned response identifier
        response_id: String,
    },

    /// An output item was added to the in-flight response
    ResponseItem {
        /// Server-assigned item identifier
        item_id: String,
    },

    /// Incremental response text (or output transcript of spoken audio)
    TextDelta {
        /// Text fragment
        text: String,
    },

    /// Incremental response audio, PCM16 at the session playback rate
    AudioDelta {
        /// Raw little-endian PCM16 bytes
        pcm: Vec<u8>,
    },

    /// The in-flight response completed (or was cancelled server-side)
    ResponseDone,

    /// The connection dropped
    Disconnected,

    /// Provider-reported error
    ProviderError {
        /// Error description from the provider
        message: String,
    },
}

/// Control messages a client can send upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// Commit the buffered input audio for recognition
    CommitAudio,

    /// Request a response for the committed input
    CreateResponse,

    /// Cancel the in-flight response
    CancelResponse,
}

/// A duplex provider connection: push audio and control frames up, receive
/// typed events down.
#[async_trait]
pub trait DuplexProvider: Send {
    /// Send a control message
    ///
    /// # Errors
    ///
    /// Returns error if the connection is gone
    async fn send_control(&self, event: ControlEvent) -> Result<()>;

    /// Send one frame of capture audio
    ///
    /// # Errors
    ///
    /// Returns error if the connection is gone
    async fn send_audio(&self, frame: &AudioFrame) -> Result<()>;

    /// Receive the next event; `None` when the connection is finished
    async fn next_event(&mut self) -> Option<ProviderEvent>;

    /// Close the connection gracefully
    async fn close(&self);
}

/// One message in a chat exchange
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    /// "system", "user" or "assistant"
    pub role: String,

    /// Message content
    pub content: String,
}

impl ChatMessage {
    /// Build a system message
    #[must_use]
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }

    /// Build a user message
    #[must_use]
    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }

    /// Build an assistant message
    #[must_use]
    pub fn assistant(content: &str) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.to_string(),
        }
    }
}

/// Chat completion backend (the LLM half of the split pipeline)
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Request a reply for the given messages, returning the full text.
    ///
    /// Implementations may stream internally; deltas are reported through
    /// `on_delta` as they arrive.
    ///
    /// # Errors
    ///
    /// Returns error if the request or stream fails
    async fn chat(
        &self,
        messages: &[ChatMessage],
        on_delta: Option<&(dyn for<'a> Fn(&'a str) + Send + Sync)>,
    ) -> Result<String>;
}

/// Speech synthesis backend (the TTS half of the split pipeline)
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize text into PCM16 samples at the session playback rate
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails or the audio format is wrong
    async fn synthesize(&self, text: &str) -> Result<Vec<i16>>;
}
