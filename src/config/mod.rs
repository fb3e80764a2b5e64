//! Configuration management for the Parley pipeline

pub mod file;

use std::time::Duration;

use crate::provider::Credentials;
use crate::{Error, Persona, Result};
use crate::audio::{CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE};

/// Which provider shape drives the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineMode {
    /// One duplex socket multiplexing ASR+LLM+TTS with server-side VAD
    #[default]
    Realtime,

    /// Separate ASR socket, chat endpoint and synthesis endpoint with
    /// client-side turn detection
    Split,
}

impl PipelineMode {
    /// Parse from a config string
    ///
    /// # Errors
    ///
    /// Returns error on an unknown mode name
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "realtime" => Ok(Self::Realtime),
            "split" => Ok(Self::Split),
            other => Err(Error::Config(format!(
                "unknown pipeline mode '{other}' (expected 'realtime' or 'split')"
            ))),
        }
    }
}

impl std::fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Realtime => write!(f, "realtime"),
            Self::Split => write!(f, "split"),
        }
    }
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Capture sample rate in Hz
    pub capture_sample_rate: u32,

    /// Playback sample rate in Hz
    pub playback_sample_rate: u32,

    /// Recognition model for the split pipeline
    pub asr_model: String,

    /// Chat model for the split pipeline
    pub llm_model: String,

    /// Synthesis model for the split pipeline
    pub tts_model: String,

    /// Synthesis voice identifier
    pub tts_voice: String,

    /// Realtime duplex model
    pub realtime_model: String,

    /// Stream chat replies instead of waiting for the full text
    pub stream_chat: bool,
}

/// Turn-taking configuration
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Conversation turns kept as chat context (oldest dropped first)
    pub history_turns: usize,

    /// Bounded wait for a final transcript after recording stops; on
    /// timeout the last partial is used
    pub finalize_timeout: Duration,

    /// Max characters per synthesis chunk; longer sentences are truncated
    /// with an explicit marker
    pub max_tts_chars: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            history_turns: 6,
            finalize_timeout: Duration::from_secs(8),
            max_tts_chars: 120,
        }
    }
}

/// Parley pipeline configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Active persona
    pub persona: Persona,

    /// Pipeline shape
    pub pipeline: PipelineMode,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// Provider credentials and endpoints (read once, never mutated)
    pub credentials: Credentials,

    /// Turn-taking configuration
    pub turn: TurnConfig,
}

impl Config {
    /// Load configuration for a persona
    ///
    /// Layering: env > TOML file > persona > default.
    ///
    /// # Errors
    ///
    /// Returns error if the persona cannot be loaded or the API key is
    /// missing everywhere
    pub fn load(persona_id: Option<&str>) -> Result<Self> {
        let fc = file::load_config_file();

        let persona_id = persona_id
            .map(ToString::to_string)
            .or(fc.persona.clone())
            .unwrap_or_else(|| "xiaoyou".to_string());
        let persona = Persona::load(&persona_id)?;

        // Credentials: env > toml. Never embedded in source.
        let api_key = std::env::var("PARLEY_API_KEY")
            .or_else(|_| std::env::var("DASHSCOPE_API_KEY"))
            .ok()
            .or(fc.provider.api_key)
            .ok_or_else(|| {
                Error::Config(
                    "no API key: set PARLEY_API_KEY (or DASHSCOPE_API_KEY), or provider.api_key in config.toml"
                        .to_string(),
                )
            })?;

        let credentials = Credentials {
            api_key,
            realtime_url: std::env::var("PARLEY_REALTIME_URL")
                .ok()
                .or(fc.provider.realtime_url)
                .unwrap_or_else(|| {
                    "wss://dashscope.aliyuncs.com/api-ws/v1/realtime".to_string()
                }),
            asr_url: std::env::var("PARLEY_ASR_URL")
                .ok()
                .or(fc.provider.asr_url)
                .unwrap_or_else(|| {
                    "wss://dashscope.aliyuncs.com/api-ws/v1/inference".to_string()
                }),
            chat_url: std::env::var("PARLEY_CHAT_URL")
                .ok()
                .or(fc.provider.chat_url)
                .unwrap_or_else(|| {
                    "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string()
                }),
            tts_url: std::env::var("PARLEY_TTS_URL")
                .ok()
                .or(fc.provider.tts_url)
                .unwrap_or_else(|| {
                    "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string()
                }),
        };

        let pipeline = std::env::var("PARLEY_PIPELINE")
            .ok()
            .or(fc.pipeline)
            .map(|s| PipelineMode::parse(&s))
            .transpose()?
            .unwrap_or_default();

        let voice = VoiceConfig {
            capture_sample_rate: CAPTURE_SAMPLE_RATE,
            playback_sample_rate: fc
                .voice
                .playback_sample_rate
                .unwrap_or(PLAYBACK_SAMPLE_RATE),
            asr_model: std::env::var("PARLEY_ASR_MODEL")
                .ok()
                .or(fc.voice.asr_model)
                .unwrap_or_else(|| "paraformer-realtime-v2".to_string()),
            llm_model: std::env::var("PARLEY_LLM_MODEL")
                .ok()
                .or(fc.voice.llm_model)
                .unwrap_or_else(|| "qwen-turbo".to_string()),
            tts_model: std::env::var("PARLEY_TTS_MODEL")
                .ok()
                .or(fc.voice.tts_model)
                .unwrap_or_else(|| "cosyvoice-v2".to_string()),
            tts_voice: std::env::var("PARLEY_TTS_VOICE")
                .ok()
                .or(fc.voice.tts_voice)
                .unwrap_or_else(|| persona.voice.clone()),
            realtime_model: std::env::var("PARLEY_REALTIME_MODEL")
                .ok()
                .or(fc.voice.realtime_model)
                .unwrap_or_else(|| "qwen-omni-turbo-realtime".to_string()),
            stream_chat: fc.voice.stream_chat.unwrap_or(true),
        };

        let default_turn = TurnConfig::default();
        let turn = TurnConfig {
            history_turns: fc.turn.history_turns.unwrap_or(default_turn.history_turns),
            finalize_timeout: fc
                .turn
                .finalize_timeout_secs
                .map_or(default_turn.finalize_timeout, Duration::from_secs),
            max_tts_chars: fc.turn.max_tts_chars.unwrap_or(default_turn.max_tts_chars),
        };

        Ok(Self {
            persona,
            pipeline,
            voice,
            credentials,
            turn,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_mode_parse() {
        assert_eq!(PipelineMode::parse("realtime").unwrap(), PipelineMode::Realtime);
        assert_eq!(PipelineMode::parse("SPLIT").unwrap(), PipelineMode::Split);
        assert!(PipelineMode::parse("hybrid").is_err());
    }

    #[test]
    fn test_turn_defaults() {
        let turn = TurnConfig::default();
        assert_eq!(turn.history_turns, 6);
        assert_eq!(turn.finalize_timeout, Duration::from_secs(8));
    }
}
