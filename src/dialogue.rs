//! Dialogue orchestration
//!
//! Drives one conversation turn end-to-end: finalized utterance in, chat
//! reply out through synthesis into the playback queue, while staying
//! responsive to the interruption signal. History is only committed for
//! turns that complete; a cancelled turn leaves no partial assistant
//! message behind.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::audio::{AudioFrame, PlaybackQueue};
use crate::provider::{ChatBackend, ChatMessage, SpeechSynthesizer};
use crate::{Error, Result};

/// Marker appended when a single overlong sentence had to be cut
const TRUNCATION_MARKER: &str = "（回复已截断）";

/// How one `respond` call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespondOutcome {
    /// Reply synthesized and queued for playback
    Spoken,

    /// Reply produced but synthesis failed; surfaced as text only
    TextOnly,

    /// Interrupted by barge-in; history untouched
    Cancelled,
}

/// Orchestrates chat and synthesis for the split pipeline
pub struct DialogueOrchestrator {
    llm: Arc<dyn ChatBackend>,
    tts: Arc<dyn SpeechSynthesizer>,
    playback: Arc<PlaybackQueue>,
    system_prompt: String,
    history: VecDeque<ChatMessage>,
    history_turns: usize,
    max_tts_chars: usize,
    frame_samples: usize,
    next_seq: u64,
}

impl DialogueOrchestrator {
    /// Create an orchestrator
    #[must_use]
    pub fn new(
        llm: Arc<dyn ChatBackend>,
        tts: Arc<dyn SpeechSynthesizer>,
        playback: Arc<PlaybackQueue>,
        system_prompt: String,
        history_turns: usize,
        max_tts_chars: usize,
        frame_samples: usize,
    ) -> Self {
        Self {
            llm,
            tts,
            playback,
            system_prompt,
            history: VecDeque::new(),
            history_turns,
            max_tts_chars,
            frame_samples,
            next_seq: 0,
        }
    }

    /// Committed conversation history (most recent last)
    #[must_use]
    pub fn history(&self) -> &VecDeque<ChatMessage> {
        &self.history
    }

    /// Drop all committed history
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Run one turn: chat, segment, synthesize, enqueue.
    ///
    /// Cancellable at every await point via `cancel`; a cancelled call
    /// returns [`RespondOutcome::Cancelled`] without committing the turn to
    /// history. Frames are enqueued under the playback generation captured
    /// at reply time, so anything synthesized after a flush is discarded by
    /// the queue instead of playing behind a newer turn.
    ///
    /// # Errors
    ///
    /// Returns error if the chat request fails; synthesis failures degrade
    /// to a text-only outcome instead
    pub async fn respond(
        &mut self,
        utterance: &str,
        cancel: &CancellationToken,
    ) -> Result<RespondOutcome> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Err(Error::Stt("empty utterance".to_string()));
        }

        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage::system(&self.system_prompt));
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::user(utterance));

        let reply = tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!("cancelled before chat completed");
                return Ok(RespondOutcome::Cancelled);
            }
            result = self.llm.chat(&messages, None) => result?,
        };

        if reply.trim().is_empty() {
            tracing::warn!("chat returned an empty reply");
            return Err(Error::Network("empty reply from chat provider".to_string()));
        }
        tracing::info!(reply_chars = reply.chars().count(), "reply received");

        let generation = self.playback.generation();
        let mut outcome = RespondOutcome::Spoken;

        for chunk in segment_reply(&reply, self.max_tts_chars) {
            if cancel.is_cancelled() {
                return Ok(RespondOutcome::Cancelled);
            }

            let samples = tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("cancelled during synthesis");
                    return Ok(RespondOutcome::Cancelled);
                }
                result = self.tts.synthesize(&chunk) => match result {
                    Ok(samples) => samples,
                    Err(e) => {
                        // Reply still stands as text; skip playback
                        tracing::warn!(error = %e, "synthesis failed, reply is text-only");
                        outcome = RespondOutcome::TextOnly;
                        break;
                    }
                },
            };

            if !self.enqueue_samples(&samples, generation, cancel) {
                return Ok(RespondOutcome::Cancelled);
            }
        }

        if cancel.is_cancelled() {
            return Ok(RespondOutcome::Cancelled);
        }

        // Commit only completed turns
        self.history.push_back(ChatMessage::user(utterance));
        self.history.push_back(ChatMessage::assistant(&reply));
        while self.history.len() > self.history_turns * 2 {
            self.history.pop_front();
        }

        Ok(outcome)
    }

    /// Synthesize a standalone line (greeting, apology) outside any turn.
    /// Never touches history.
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn speak(&mut self, text: &str) -> Result<()> {
        let generation = self.playback.generation();
        let samples = self.tts.synthesize(text).await?;
        let cancel = CancellationToken::new();
        self.enqueue_samples(&samples, generation, &cancel);
        Ok(())
    }

    /// Enqueue synthesized samples as playback frames in generation order.
    /// Returns `false` if the frames went stale (a flush happened) or the
    /// call was cancelled mid-enqueue.
    fn enqueue_samples(
        &mut self,
        samples: &[i16],
        generation: u64,
        cancel: &CancellationToken,
    ) -> bool {
        for chunk in samples.chunks(self.frame_samples) {
            if cancel.is_cancelled() {
                return false;
            }
            let frame = AudioFrame::new(self.next_seq, chunk.to_vec());
            self.next_seq += 1;

            if !self.playback.enqueue(frame, generation) {
                if self.playback.generation() == generation {
                    // Queue stayed full for the whole bounded wait
                    tracing::warn!("playback backpressure, frame dropped");
                    continue;
                }
                tracing::debug!("playback flushed mid-turn, discarding remaining audio");
                return false;
            }
        }
        true
    }
}

/// Split a reply into synthesis chunks at sentence boundaries.
///
/// Sentences accumulate into a chunk until `max_chars` would be exceeded; a
/// single sentence longer than `max_chars` is cut there with an explicit
/// truncation marker so the listener knows content was dropped.
#[must_use]
pub fn segment_reply(text: &str, max_chars: usize) -> Vec<String> {
    const TERMINATORS: &[char] = &['。', '！', '？', '!', '?', '.', '；', ';', '\n'];

    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if TERMINATORS.contains(&c) {
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        sentences.push(current);
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut chunk = String::new();
    let mut chunk_chars = 0usize;

    for sentence in sentences {
        let trimmed = sentence.trim();
        if trimmed.is_empty() {
            continue;
        }
        let sentence_chars = trimmed.chars().count();

        if sentence_chars > max_chars {
            if chunk_chars > 0 {
                chunks.push(std::mem::take(&mut chunk));
                chunk_chars = 0;
            }
            let mut cut: String = trimmed.chars().take(max_chars).collect();
            cut.push_str(TRUNCATION_MARKER);
            chunks.push(cut);
            continue;
        }

        if chunk_chars + sentence_chars > max_chars && chunk_chars > 0 {
            chunks.push(std::mem::take(&mut chunk));
            chunk_chars = 0;
        }
        chunk.push_str(trimmed);
        chunk_chars += sentence_chars;
    }
    if chunk_chars > 0 {
        chunks.push(chunk);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_short_reply_is_one_chunk() {
        let chunks = segment_reply("你好哦！今天想去哪里呢？", 50);
        assert_eq!(chunks, vec!["你好哦！今天想去哪里呢？"]);
    }

    #[test]
    fn test_segment_splits_at_sentence_boundary() {
        let chunks = segment_reply("第一句话。第二句话。第三句话。", 8);
        assert_eq!(chunks, vec!["第一句话。", "第二句话。", "第三句话。"]);
    }

    #[test]
    fn test_segment_overlong_sentence_truncated() {
        let long = "啊".repeat(30);
        let chunks = segment_reply(&long, 10);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].starts_with(&"啊".repeat(10)));
        assert!(chunks[0].ends_with(TRUNCATION_MARKER));
        assert_eq!(chunks[0].chars().count(), 10 + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn test_segment_merges_up_to_limit() {
        let chunks = segment_reply("好的。明白。收到。", 12);
        assert_eq!(chunks, vec!["好的。明白。收到。"]);
    }

    #[test]
    fn test_segment_empty_reply() {
        assert!(segment_reply("", 50).is_empty());
        assert!(segment_reply("   \n  ", 50).is_empty());
    }
}
