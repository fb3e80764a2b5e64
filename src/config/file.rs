//! TOML configuration file loading
//!
//! Supports `~/.config/parley/config.toml` as a persistent config source.
//! All fields are optional — the file is a partial overlay on top of
//! defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ParleyConfigFile {
    /// Persona identifier (e.g. "xiaoyou")
    #[serde(default)]
    pub persona: Option<String>,

    /// Pipeline shape ("realtime" or "split")
    #[serde(default)]
    pub pipeline: Option<String>,

    /// Provider endpoints and credentials
    #[serde(default)]
    pub provider: ProviderFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Turn-taking configuration
    #[serde(default)]
    pub turn: TurnFileConfig,
}

/// Provider endpoints and credentials
#[derive(Debug, Default, Deserialize)]
pub struct ProviderFileConfig {
    /// API key (prefer the env var; the file is a fallback for dev setups)
    pub api_key: Option<String>,

    /// Realtime duplex WebSocket URL
    pub realtime_url: Option<String>,

    /// Streaming recognition WebSocket URL
    pub asr_url: Option<String>,

    /// Chat completions base URL
    pub chat_url: Option<String>,

    /// Speech synthesis base URL
    pub tts_url: Option<String>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Recognition model (e.g. "paraformer-realtime-v2")
    pub asr_model: Option<String>,

    /// Chat model (e.g. "qwen-turbo")
    pub llm_model: Option<String>,

    /// Synthesis model (e.g. "cosyvoice-v2")
    pub tts_model: Option<String>,

    /// Synthesis voice identifier (defaults to the persona's voice)
    pub tts_voice: Option<String>,

    /// Realtime duplex model
    pub realtime_model: Option<String>,

    /// Stream chat replies instead of waiting for the full text
    pub stream_chat: Option<bool>,

    /// Playback sample rate in Hz
    pub playback_sample_rate: Option<u32>,
}

/// Turn-taking configuration
#[derive(Debug, Default, Deserialize)]
pub struct TurnFileConfig {
    /// Conversation turns kept as chat context
    pub history_turns: Option<usize>,

    /// Seconds to wait for a final transcript after recording stops
    pub finalize_timeout_secs: Option<u64>,

    /// Max characters per synthesis chunk
    pub max_tts_chars: Option<usize>,
}

/// Path of the config file, if a config directory exists
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("parley").join("config.toml"))
}

/// Load the TOML config file, falling back to defaults on any problem
#[must_use]
pub fn load_config_file() -> ParleyConfigFile {
    let Some(path) = config_file_path() else {
        return ParleyConfigFile::default();
    };

    if !path.exists() {
        return ParleyConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ParleyConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ParleyConfigFile::default()
        }
    }
}
