//! Chat completion client (split pipeline)
//!
//! Talks to an OpenAI-compatible `/chat/completions` endpoint, optionally
//! consuming the SSE stream so reply text can be surfaced as it arrives.

use async_trait::async_trait;
use futures::StreamExt;

use super::{ChatBackend, ChatMessage, Credentials};
use crate::{Error, Result};

/// Max tokens for voice replies; long answers defeat spoken playback
const MAX_TOKENS: u32 = 1024;

/// Non-streaming completion response
#[derive(serde::Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(serde::Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// One SSE chunk of a streaming completion
#[derive(serde::Deserialize)]
struct ChatChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(serde::Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(serde::Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// Chat completions client
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    stream: bool,
}

impl ChatClient {
    /// Create a chat client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(credentials: &Credentials, model: String, stream: bool) -> Result<Self> {
        if credentials.api_key.is_empty() {
            return Err(Error::Config("API key required for chat".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: credentials.chat_url.trim_end_matches('/').to_string(),
            api_key: credentials.api_key.clone(),
            model,
            temperature: 0.5,
            stream,
        })
    }

    async fn chat_blocking(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "max_tokens": MAX_TOKENS,
            "temperature": self.temperature,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::Auth(format!("chat API rejected credentials ({status})")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Network(format!("chat API error {status}: {body}")));
        }

        let result: ChatResponse = response.json().await?;
        let text = result
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        tracing::debug!(reply_chars = text.chars().count(), "chat completion received");
        Ok(text)
    }

    async fn chat_streaming(
        &self,
        messages: &[ChatMessage],
        on_delta: Option<&(dyn for<'a> Fn(&'a str) + Send + Sync)>,
    ) -> Result<String> {
        let request = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
            "max_tokens": MAX_TOKENS,
            "temperature": self.temperature,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::Auth(format!("chat API rejected credentials ({status})")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Network(format!("chat API error {status}: {body}")));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut full = String::new();

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Network(format!("chat stream error: {e}")))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_string();
                buffer.drain(..=newline);

                let Some(payload) = line.strip_prefix("data:").map(str::trim) else {
                    continue;
                };
                if payload == "[DONE]" {
                    break 'outer;
                }

                match serde_json::from_str::<ChatChunk>(payload) {
                    Ok(parsed) => {
                        if let Some(content) =
                            parsed.choices.first().and_then(|c| c.delta.content.as_deref())
                        {
                            if !content.is_empty() {
                                full.push_str(content);
                                if let Some(cb) = on_delta {
                                    cb(content);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping unparseable stream chunk");
                    }
                }
            }
        }

        tracing::debug!(reply_chars = full.chars().count(), "chat stream complete");
        Ok(full)
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        on_delta: Option<&(dyn for<'a> Fn(&'a str) + Send + Sync)>,
    ) -> Result<String> {
        if self.stream {
            self.chat_streaming(messages, on_delta).await
        } else {
            let text = self.chat_blocking(messages).await?;
            if let Some(cb) = on_delta {
                cb(&text);
            }
            Ok(text)
        }
    }
}
