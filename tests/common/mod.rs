//! Shared test helpers: scripted chat and synthesis backends

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use parley::audio::PlaybackQueue;
use parley::provider::{ChatBackend, ChatMessage, SpeechSynthesizer};
use parley::{Error, Result};

/// Chat backend returning a fixed reply
pub struct MockChat {
    pub reply: String,
    pub delay: Option<Duration>,
    pub fail: bool,
}

impl MockChat {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            delay: None,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: String::new(),
            delay: None,
            fail: true,
        }
    }
}

#[async_trait]
impl ChatBackend for MockChat {
    async fn chat(
        &self,
        _messages: &[ChatMessage],
        on_delta: Option<&(dyn for<'a> Fn(&'a str) + Send + Sync)>,
    ) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(Error::Network("mock chat failure".to_string()));
        }
        if let Some(cb) = on_delta {
            cb(&self.reply);
        }
        Ok(self.reply.clone())
    }
}

/// Synthesis backend producing a fixed number of samples per character,
/// with hooks to simulate failures and mid-call interruptions
pub struct MockTts {
    pub samples_per_char: usize,
    pub fail: bool,
    /// Cancel this token during the first synthesize call (simulates a
    /// barge-in landing while synthesis is in flight)
    pub cancel_on_call: Option<CancellationToken>,
    /// Flush this queue during the first synthesize call (simulates the
    /// interruption path racing the producer)
    pub flush_on_call: Option<Arc<PlaybackQueue>>,
    /// Every chunk of text synthesized, in order
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockTts {
    pub fn speaking() -> Self {
        Self {
            samples_per_char: 10,
            fail: false,
            cancel_on_call: None,
            flush_on_call: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::speaking()
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for MockTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<i16>> {
        self.calls.lock().unwrap().push(text.to_string());

        if self.fail {
            return Err(Error::Tts("mock synthesis failure".to_string()));
        }
        if let Some(token) = &self.cancel_on_call {
            token.cancel();
        }
        if let Some(queue) = &self.flush_on_call {
            queue.flush();
        }

        Ok(vec![100; text.chars().count() * self.samples_per_char])
    }
}
