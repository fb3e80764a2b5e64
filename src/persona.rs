//! Persona configuration
//!
//! A persona defines who the assistant is for one session: its system
//! prompt, the synthesis voice it speaks with, and its language. Personas
//! are read-only for the lifetime of a session.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Identity and voice of the assistant for one session
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    /// Unique identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// System prompt prepended to every chat request
    pub system_prompt: String,

    /// Synthesis voice identifier
    pub voice: String,

    /// Primary language tag (e.g. "zh-CN", "en-US")
    pub language: String,

    /// Line spoken when the session starts
    #[serde(default)]
    pub greeting: Option<String>,
}

/// Embedded persona data for when no local files are available
const EMBEDDED_PERSONAS: &[(&str, &str)] = &[
    ("xiaoyou", include_str!("../personas/xiaoyou.json")),
    ("chelsie", include_str!("../personas/chelsie.json")),
];

impl Persona {
    /// Load a persona by id.
    ///
    /// Priority: `PARLEY_PERSONAS_DIR` (dev override) then embedded data.
    ///
    /// # Errors
    ///
    /// Returns `PersonaNotFound` if the id matches no source
    pub fn load(persona_id: &str) -> Result<Self> {
        if let Ok(dir) = std::env::var("PARLEY_PERSONAS_DIR") {
            let path = std::path::PathBuf::from(&dir).join(format!("{persona_id}.json"));
            if path.exists() {
                let content = std::fs::read_to_string(&path)?;
                let persona: Self = serde_json::from_str(&content).map_err(|e| {
                    Error::Config(format!("failed to parse {persona_id}.json: {e}"))
                })?;
                tracing::info!(persona_id, path = %path.display(), "loaded persona from PARLEY_PERSONAS_DIR");
                return Ok(persona);
            }
            tracing::warn!(
                persona_id,
                dir = %dir,
                "PARLEY_PERSONAS_DIR set but persona not found, trying embedded"
            );
        }

        Self::load_embedded(persona_id)
    }

    /// Load an embedded persona compiled into the binary
    ///
    /// # Errors
    ///
    /// Returns `PersonaNotFound` if the id is not embedded
    pub fn load_embedded(persona_id: &str) -> Result<Self> {
        EMBEDDED_PERSONAS
            .iter()
            .find(|(id, _)| *id == persona_id)
            .and_then(|(_, json)| {
                let persona: Self = serde_json::from_str(json).ok()?;
                tracing::debug!(persona_id, "loaded persona from embedded data");
                Some(persona)
            })
            .ok_or_else(|| Error::PersonaNotFound(persona_id.to_string()))
    }

    /// Ids of the personas compiled into the binary
    #[must_use]
    pub fn embedded_ids() -> Vec<&'static str> {
        EMBEDDED_PERSONAS.iter().map(|(id, _)| *id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_personas_parse() {
        for id in Persona::embedded_ids() {
            let persona = Persona::load_embedded(id).unwrap();
            assert_eq!(persona.id, id);
            assert!(!persona.system_prompt.is_empty());
            assert!(!persona.voice.is_empty());
        }
    }

    #[test]
    fn test_unknown_persona() {
        let err = Persona::load_embedded("nobody").unwrap_err();
        assert!(matches!(err, Error::PersonaNotFound(_)));
    }
}
