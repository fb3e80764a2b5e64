//! Error types for the Parley voice pipeline

use thiserror::Error;

/// Result type alias for Parley operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Persona not found
    #[error("persona not found: {0}")]
    PersonaNotFound(String),

    /// Authentication failure (fatal — the session cannot proceed)
    #[error("auth error: {0}")]
    Auth(String),

    /// Network-level failure talking to a provider
    #[error("network error: {0}")]
    Network(String),

    /// Provider connection dropped mid-utterance or mid-response
    #[error("provider disconnected: {0}")]
    Disconnected(String),

    /// Audio device error (capture or playback)
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Operation aborted by a barge-in interruption
    #[error("cancelled by interruption")]
    Cancelled,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether the session must terminate on this error.
    ///
    /// Everything else is absorbed at the turn boundary: the current
    /// utterance or response is abandoned and the pipeline returns to idle.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Config(_))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                Self::Disconnected("websocket closed".to_string())
            }
            WsError::Http(resp)
                if resp.status().as_u16() == 401 || resp.status().as_u16() == 403 =>
            {
                Self::Auth(format!("websocket handshake rejected ({})", resp.status()))
            }
            other => Self::Network(other.to_string()),
        }
    }
}
