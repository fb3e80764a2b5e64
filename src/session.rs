//! Conversation session lifecycle
//!
//! One [`ConversationSession`] owns the audio devices, the provider
//! connection(s), the turn controller and the dialogue orchestrator, and
//! wires the event flow between them. Everything lives in the session
//! object — no module-level queues or flags — so multiple sessions can
//! coexist in one process.
//!
//! Runs on the caller's task: cpal streams are not `Send`, so the session
//! future stays where it was created (the binary awaits it from `main`).

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::audio::{
    AudioCapture, AudioFrame, AudioPlayback, FRAME_MS, FRAME_SAMPLES, PlaybackQueue, VadEvent,
    VoiceActivityDetector, pcm_bytes_to_samples,
};
use crate::config::{Config, PipelineMode};
use crate::dialogue::{DialogueOrchestrator, RespondOutcome};
use crate::provider::{
    AsrClient, ChatClient, ControlEvent, DuplexProvider, ProviderEvent, RealtimeClient, TtsClient,
};
use crate::turn::{TurnAction, TurnController, TurnEvent, TurnObserver};
use crate::Result;

/// Spoken when an utterance produced no recognizable text
const RETRY_PROMPT: &str = "抱歉，我没有听清，请再说一遍。";

/// Spoken when a turn failed on a recoverable provider error
const ERROR_PROMPT: &str = "抱歉，我暂时无法回答，请稍后再试。";

/// Outcome notices from a spawned respond task
enum Notice {
    Started {
        response_id: String,
    },
    Finished {
        response_id: String,
        result: Result<RespondOutcome>,
    },
}

/// The respond task currently in flight, if any.
///
/// Notices are matched against the id so a cancelled task finishing late
/// cannot disturb the turn that superseded it.
#[derive(Default)]
struct ActiveResponse {
    id: Option<String>,
    cancel: Option<CancellationToken>,
}

/// Logs turn milestones; the session's default observer
struct LogObserver;

impl TurnObserver for LogObserver {
    fn on_partial(&self, text: &str) {
        tracing::debug!(text = %text, "partial transcript");
    }

    fn on_utterance(&self, text: &str) {
        tracing::info!(text = %text, "utterance finalized");
    }

    fn on_interrupted(&self) {
        tracing::info!("assistant interrupted by user speech");
    }

    fn on_response_done(&self) {
        tracing::debug!("response complete");
    }
}

/// Process-wide lifecycle object for one voice conversation
pub struct ConversationSession {
    config: Config,
}

impl ConversationSession {
    /// Create a session from configuration
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the session until shutdown is requested or a fatal error occurs
    ///
    /// # Errors
    ///
    /// Returns error on authentication, configuration or device
    /// initialization failure; provider hiccups are absorbed per turn
    #[allow(clippy::future_not_send)]
    pub async fn run(self, shutdown_rx: &mut mpsc::Receiver<()>) -> Result<()> {
        tracing::info!(
            persona = %self.config.persona.name,
            pipeline = %self.config.pipeline,
            "starting conversation session"
        );

        match self.config.pipeline {
            PipelineMode::Realtime => self.run_realtime(shutdown_rx).await,
            PipelineMode::Split => self.run_split(shutdown_rx).await,
        }
    }

    /// Realtime pipeline: one duplex socket, server-side turn detection
    #[allow(clippy::future_not_send, clippy::too_many_lines)]
    async fn run_realtime(&self, shutdown_rx: &mut mpsc::Receiver<()>) -> Result<()> {
        let mut capture =
            AudioCapture::new(self.config.voice.capture_sample_rate, FRAME_SAMPLES)?;
        let mut playback = AudioPlayback::new(self.config.voice.playback_sample_rate)?;
        let queue = playback.queue();

        let mut client = RealtimeClient::connect(
            &self.config.credentials,
            &self.config.voice.realtime_model,
            &self.config.voice.tts_voice,
            &self.config.persona.system_prompt,
        )
        .await?;

        let mut turn = TurnController::new(false);
        turn.set_observer(Box::new(LogObserver));

        capture.start()?;
        playback.start()?;
        tracing::info!(session_id = %client.session_id(), "listening");

        // Frames synthesized for the response in flight carry the playback
        // generation captured when it started; a barge-in flush bumps the
        // generation and strands the stragglers.
        let mut response_generation = queue.generation();
        let mut next_seq: u64 = 0;
        let frame_samples = (self.config.voice.playback_sample_rate / 1000 * FRAME_MS) as usize;

        let mut tick = tokio::time::interval(Duration::from_millis(u64::from(FRAME_MS)));

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("shutdown requested");
                    break;
                }

                _ = tick.tick() => {
                    let mut lost = false;
                    for frame in capture.drain() {
                        if let Err(e) = client.send_audio(&frame).await {
                            tracing::warn!(error = %e, "audio send failed");
                            lost = true;
                            break;
                        }
                    }
                    if lost {
                        turn.on_event(TurnEvent::ProviderLost);
                        break;
                    }
                }

                event = client.next_event() => {
                    let Some(event) = event else {
                        turn.on_event(TurnEvent::ProviderLost);
                        tracing::warn!("provider event stream ended");
                        break;
                    };

                    match event {
                        ProviderEvent::SpeechStarted => {
                            let actions = turn.on_event(TurnEvent::SpeechStarted);
                            Self::execute_realtime(&client, &queue, actions).await;
                        }
                        ProviderEvent::SpeechStopped => {
                            turn.on_event(TurnEvent::SpeechStopped);
                        }
                        ProviderEvent::PartialTranscript { text } => {
                            turn.on_event(TurnEvent::PartialTranscript(text));
                        }
                        ProviderEvent::FinalTranscript { text } => {
                            // The provider generates the reply itself; the
                            // forwarded utterance is informational here
                            turn.on_event(TurnEvent::FinalTranscript(text));
                        }
                        ProviderEvent::ResponseStarted { response_id } => {
                            response_generation = queue.generation();
                            let actions = turn.on_event(TurnEvent::ResponseStarted { response_id });
                            Self::execute_realtime(&client, &queue, actions).await;
                        }
                        ProviderEvent::ResponseItem { item_id } => {
                            turn.on_event(TurnEvent::ResponseItem { item_id });
                        }
                        ProviderEvent::TextDelta { text } => {
                            tracing::debug!(text = %text, "assistant text");
                            turn.on_event(TurnEvent::ResponseText { chars: text.chars().count() });
                        }
                        ProviderEvent::AudioDelta { pcm } => {
                            turn.on_event(TurnEvent::ResponseAudio { bytes: pcm.len() });
                            for chunk in pcm_bytes_to_samples(&pcm).chunks(frame_samples) {
                                let frame = AudioFrame::new(next_seq, chunk.to_vec());
                                next_seq += 1;
                                // Stale generations are rejected by the queue
                                queue.enqueue(frame, response_generation);
                            }
                        }
                        ProviderEvent::ResponseDone => {
                            turn.on_event(TurnEvent::ResponseDone);
                        }
                        ProviderEvent::ProviderError { message } => {
                            // Absorbed: whatever was in flight is treated as
                            // done and the next turn starts clean
                            tracing::warn!(error = %message, "provider error, abandoning turn");
                            turn.on_event(TurnEvent::ResponseDone);
                        }
                        ProviderEvent::Disconnected => {
                            turn.on_event(TurnEvent::ProviderLost);
                            tracing::warn!("provider disconnected");
                            break;
                        }
                    }
                }
            }
        }

        client.close().await;
        capture.stop();
        playback.stop();
        tracing::info!("session stopped");
        Ok(())
    }

    /// Execute controller decisions against the realtime provider
    async fn execute_realtime(
        client: &RealtimeClient,
        queue: &Arc<PlaybackQueue>,
        actions: Vec<TurnAction>,
    ) {
        for action in actions {
            match action {
                TurnAction::CancelResponse => {
                    if let Err(e) = client.send_control(ControlEvent::CancelResponse).await {
                        tracing::warn!(error = %e, "cancel send failed");
                    }
                }
                TurnAction::FlushPlayback => {
                    let drained = queue.flush();
                    tracing::debug!(drained, "playback flushed");
                }
                TurnAction::ForwardUtterance(text) => {
                    tracing::info!(text = %text, "user said");
                }
                TurnAction::PromptRetry => {
                    tracing::debug!("nothing recognized");
                }
            }
        }
    }

    /// Split pipeline: local VAD, streaming recognizer, chat + synthesis
    #[allow(clippy::future_not_send, clippy::too_many_lines, clippy::cognitive_complexity)]
    async fn run_split(&self, shutdown_rx: &mut mpsc::Receiver<()>) -> Result<()> {
        let mut capture =
            AudioCapture::new(self.config.voice.capture_sample_rate, FRAME_SAMPLES)?;
        let mut playback = AudioPlayback::new(self.config.voice.playback_sample_rate)?;
        let queue = playback.queue();

        let llm = Arc::new(ChatClient::new(
            &self.config.credentials,
            self.config.voice.llm_model.clone(),
            self.config.voice.stream_chat,
        )?);
        let tts = Arc::new(TtsClient::new(
            &self.config.credentials,
            self.config.voice.tts_model.clone(),
            self.config.voice.tts_voice.clone(),
            self.config.voice.playback_sample_rate,
        )?);

        let frame_samples =
            (self.config.voice.playback_sample_rate / 1000 * FRAME_MS) as usize;
        let orchestrator = Arc::new(Mutex::new(DialogueOrchestrator::new(
            llm,
            tts,
            Arc::clone(&queue),
            self.config.persona.system_prompt.clone(),
            self.config.turn.history_turns,
            self.config.turn.max_tts_chars,
            frame_samples,
        )));

        let mut asr = Some(
            AsrClient::connect(
                &self.config.credentials,
                &self.config.voice.asr_model,
                self.config.voice.capture_sample_rate,
            )
            .await?,
        );

        let mut turn = TurnController::new(true);
        turn.set_observer(Box::new(LogObserver));
        let mut vad = VoiceActivityDetector::new();

        let (notice_tx, mut notice_rx) = mpsc::channel::<Notice>(8);
        let mut active = ActiveResponse::default();
        let mut finalize_at: Option<Instant> = None;

        capture.start()?;
        playback.start()?;
        tracing::info!("listening");

        if let Some(greeting) = self.config.persona.greeting.clone() {
            Self::say(&orchestrator, greeting);
        }

        let mut tick = tokio::time::interval(Duration::from_millis(u64::from(FRAME_MS)));

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("shutdown requested");
                    break;
                }

                _ = tick.tick() => {
                    for frame in capture.drain() {
                        let edge = vad.process(&frame.samples);

                        if edge == Some(VadEvent::SpeechStarted) {
                            if asr.is_none() {
                                asr = self.reconnect_asr().await;
                            }
                            if let Some(client) = &asr {
                                if let Err(e) = client.start_utterance().await {
                                    tracing::warn!(error = %e, "recognizer unavailable");
                                }
                            }
                            finalize_at = None;
                            let actions = turn.on_event(TurnEvent::SpeechStarted);
                            self.execute_split(
                                &orchestrator, &queue, &notice_tx,
                                &mut active, actions,
                            );
                        }

                        if vad.is_speaking() {
                            if let Some(client) = &asr {
                                if let Err(e) = client.send_audio(&frame).await {
                                    tracing::warn!(error = %e, "recognizer send failed");
                                    asr = None;
                                }
                            }
                        }

                        if edge == Some(VadEvent::SpeechStopped) {
                            turn.on_event(TurnEvent::SpeechStopped);
                            if let Some(client) = &asr {
                                let _ = client.send_control(ControlEvent::CommitAudio).await;
                            }
                            if turn.pending_finalization() {
                                finalize_at =
                                    Some(Instant::now() + self.config.turn.finalize_timeout);
                            }
                        }
                    }
                }

                event = async {
                    match asr.as_mut() {
                        Some(client) => client.next_event().await,
                        None => std::future::pending().await,
                    }
                } => {
                    let Some(event) = event else {
                        turn.on_event(TurnEvent::ProviderLost);
                        finalize_at = None;
                        asr = None;
                        continue;
                    };

                    let turn_event = match event {
                        ProviderEvent::PartialTranscript { text } => {
                            Some(TurnEvent::PartialTranscript(text))
                        }
                        ProviderEvent::FinalTranscript { text } => {
                            finalize_at = None;
                            Some(TurnEvent::FinalTranscript(text))
                        }
                        ProviderEvent::Disconnected => {
                            tracing::warn!("recognizer disconnected");
                            finalize_at = None;
                            asr = None;
                            Some(TurnEvent::ProviderLost)
                        }
                        ProviderEvent::ProviderError { message } => {
                            tracing::warn!(error = %message, "recognizer error");
                            None
                        }
                        other => {
                            tracing::debug!(event = ?other, "unexpected recognizer event");
                            None
                        }
                    };

                    if let Some(turn_event) = turn_event {
                        let actions = turn.on_event(turn_event);
                        self.execute_split(
                            &orchestrator, &queue, &notice_tx,
                            &mut active, actions,
                        );
                    }
                }

                () = async {
                    match finalize_at {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                } => {
                    finalize_at = None;
                    let actions = turn.on_event(TurnEvent::FinalizeTimeout);
                    self.execute_split(
                        &orchestrator, &queue, &notice_tx,
                        &mut active, actions,
                    );
                }

                notice = notice_rx.recv() => {
                    let Some(notice) = notice else { continue };
                    match notice {
                        Notice::Started { response_id } => {
                            // A task cancelled before its start notice
                            // landed is already dead to the controller
                            if active.id.as_deref() != Some(response_id.as_str()) {
                                tracing::debug!(response_id = %response_id, "stale response start");
                                continue;
                            }
                            let actions = turn.on_event(TurnEvent::ResponseStarted { response_id });
                            self.execute_split(
                                &orchestrator, &queue, &notice_tx,
                                &mut active, actions,
                            );
                        }
                        Notice::Finished { response_id, result } => {
                            if active.id.as_deref() != Some(response_id.as_str()) {
                                tracing::debug!(response_id = %response_id, "stale response finish");
                                continue;
                            }
                            active.id = None;
                            active.cancel = None;
                            turn.on_event(TurnEvent::ResponseDone);
                            match result {
                                Ok(RespondOutcome::Spoken) => {}
                                Ok(RespondOutcome::TextOnly) => {
                                    tracing::warn!("reply delivered as text only (synthesis failed)");
                                }
                                Ok(RespondOutcome::Cancelled) => {
                                    tracing::debug!("turn cancelled by barge-in");
                                }
                                Err(e) if e.is_fatal() => return Err(e),
                                Err(e) => {
                                    // Recoverable: apologize and stay ready
                                    tracing::warn!(error = %e, "turn failed");
                                    Self::say(&orchestrator, ERROR_PROMPT.to_string());
                                }
                            }
                        }
                    }
                }
            }
        }

        if let Some(token) = active.cancel.take() {
            token.cancel();
        }
        if let Some(client) = &asr {
            client.close().await;
        }
        capture.stop();
        playback.stop();
        tracing::info!("session stopped");
        Ok(())
    }

    /// Execute controller decisions against the split pipeline
    fn execute_split(
        &self,
        orchestrator: &Arc<Mutex<DialogueOrchestrator>>,
        queue: &Arc<PlaybackQueue>,
        notice_tx: &mpsc::Sender<Notice>,
        active: &mut ActiveResponse,
        actions: Vec<TurnAction>,
    ) {
        for action in actions {
            match action {
                TurnAction::ForwardUtterance(text) => {
                    let token = CancellationToken::new();
                    let response_id = format!("resp_{}", uuid::Uuid::new_v4().simple());
                    active.id = Some(response_id.clone());
                    active.cancel = Some(token.clone());

                    let orch = Arc::clone(orchestrator);
                    let ntx = notice_tx.clone();
                    tokio::spawn(async move {
                        let _ = ntx
                            .send(Notice::Started {
                                response_id: response_id.clone(),
                            })
                            .await;
                        let result = {
                            let mut o = orch.lock().await;
                            o.respond(&text, &token).await
                        };
                        let _ = ntx.send(Notice::Finished { response_id, result }).await;
                    });
                }
                TurnAction::CancelResponse => {
                    active.id = None;
                    if let Some(token) = active.cancel.take() {
                        token.cancel();
                        tracing::debug!("respond task cancelled");
                    }
                }
                TurnAction::FlushPlayback => {
                    let drained = queue.flush();
                    tracing::debug!(drained, "playback flushed");
                }
                TurnAction::PromptRetry => {
                    Self::say(orchestrator, RETRY_PROMPT.to_string());
                }
            }
        }
    }

    /// Speak a standalone line without blocking the event loop
    fn say(orchestrator: &Arc<Mutex<DialogueOrchestrator>>, text: String) {
        let orch = Arc::clone(orchestrator);
        tokio::spawn(async move {
            let mut o = orch.lock().await;
            if let Err(e) = o.speak(&text).await {
                tracing::warn!(error = %e, "failed to speak prompt");
            }
        });
    }

    /// Reconnect the recognizer after a drop; the turn that noticed the
    /// drop was abandoned, the next one retries
    async fn reconnect_asr(&self) -> Option<AsrClient> {
        match AsrClient::connect(
            &self.config.credentials,
            &self.config.voice.asr_model,
            self.config.voice.capture_sample_rate,
        )
        .await
        {
            Ok(client) => {
                tracing::info!("recognizer reconnected");
                Some(client)
            }
            Err(e) => {
                tracing::warn!(error = %e, "recognizer reconnect failed");
                None
            }
        }
    }
}
