//! Selectable recognition models and synthesis voices
//!
//! Static tables backing the interactive pickers and the `list-voices`
//! subcommand. These describe what the configured provider account offers;
//! the pipeline itself only sees the chosen identifiers.

/// A selectable recognition model
#[derive(Debug, Clone, Copy)]
pub struct AsrModelInfo {
    /// Model identifier sent to the provider
    pub name: &'static str,

    /// Human-readable description for the picker
    pub description: &'static str,
}

/// Recognition models available on the streaming endpoint
pub const ASR_MODELS: &[AsrModelInfo] = &[
    AsrModelInfo {
        name: "gummy-chat-v1",
        description: "多语言对话模型，支持实时翻译",
    },
    AsrModelInfo {
        name: "paraformer-realtime-v2",
        description: "中文实时语音识别模型",
    },
];

/// A selectable synthesis voice
#[derive(Debug, Clone, Copy)]
pub struct TtsVoiceInfo {
    /// Voice identifier sent to the provider
    pub name: &'static str,

    /// Spoken language or dialect
    pub language: &'static str,

    /// Human-readable description for the picker
    pub description: &'static str,

    /// Synthesis model this voice belongs to
    pub model: &'static str,
}

/// Synthesis voices available on the synthesis endpoint
pub const TTS_VOICES: &[TtsVoiceInfo] = &[
    TtsVoiceInfo {
        name: "longxiaochun_v2",
        language: "普通话",
        description: "标准普通话女声",
        model: "cosyvoice-v2",
    },
    TtsVoiceInfo {
        name: "longyingyan",
        language: "普通话",
        description: "义正言辞普通话女声",
        model: "cosyvoice-v2",
    },
    TtsVoiceInfo {
        name: "longjiayi_v2",
        language: "粤语",
        description: "粤语女声",
        model: "cosyvoice-v2",
    },
    TtsVoiceInfo {
        name: "longyuan_v2",
        language: "普通话",
        description: "温柔治愈女声",
        model: "cosyvoice-v2",
    },
    TtsVoiceInfo {
        name: "longhan_v2",
        language: "普通话",
        description: "温柔普通话男声",
        model: "cosyvoice-v2",
    },
    TtsVoiceInfo {
        name: "Dylan",
        language: "北京话",
        description: "北京话男声",
        model: "qwen-tts",
    },
    TtsVoiceInfo {
        name: "Jada",
        language: "吴语",
        description: "吴语女声",
        model: "qwen-tts",
    },
    TtsVoiceInfo {
        name: "Sunny",
        language: "四川话",
        description: "四川话女声",
        model: "qwen-tts",
    },
];

/// Look up a voice by identifier
#[must_use]
pub fn find_voice(name: &str) -> Option<&'static TtsVoiceInfo> {
    TTS_VOICES.iter().find(|v| v.name == name)
}

/// Look up a recognition model by identifier
#[must_use]
pub fn find_asr_model(name: &str) -> Option<&'static AsrModelInfo> {
    ASR_MODELS.iter().find(|m| m.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_lookup() {
        assert!(find_voice("longxiaochun_v2").is_some());
        assert!(find_voice("unknown-voice").is_none());
        assert!(find_asr_model("paraformer-realtime-v2").is_some());
    }

    #[test]
    fn test_voice_models_are_known() {
        for voice in TTS_VOICES {
            assert!(matches!(voice.model, "cosyvoice-v2" | "qwen-tts"));
        }
    }
}
