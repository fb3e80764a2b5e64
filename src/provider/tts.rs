//! Speech synthesis client (split pipeline)
//!
//! Posts text to an HTTP synthesis endpoint and decodes the returned WAV
//! into PCM16 samples at the session playback rate. A rate mismatch in the
//! returned audio is a configuration error, never resampled away.

use async_trait::async_trait;

use super::{Credentials, SpeechSynthesizer};
use crate::audio::wav_to_samples;
use crate::{Error, Result};

/// Speech synthesis client
pub struct TtsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
    sample_rate: u32,
}

impl TtsClient {
    /// Create a synthesis client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(
        credentials: &Credentials,
        model: String,
        voice: String,
        sample_rate: u32,
    ) -> Result<Self> {
        if credentials.api_key.is_empty() {
            return Err(Error::Config("API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: credentials.tts_url.trim_end_matches('/').to_string(),
            api_key: credentials.api_key.clone(),
            model,
            voice,
            sample_rate,
        })
    }

    /// The configured voice identifier
    #[must_use]
    pub fn voice(&self) -> &str {
        &self.voice
    }
}

#[async_trait]
impl SpeechSynthesizer for TtsClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<i16>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            response_format: &'a str,
            sample_rate: u32,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: "wav",
            sample_rate: self.sample_rate,
        };

        tracing::debug!(
            voice = %self.voice,
            text_chars = text.chars().count(),
            "starting synthesis"
        );

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Tts(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::Auth(format!("TTS API rejected credentials ({status})")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("TTS API error {status}: {body}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Tts(e.to_string()))?;

        let samples = wav_to_samples(&audio, self.sample_rate)?;
        tracing::debug!(samples = samples.len(), "synthesis complete");
        Ok(samples)
    }
}
