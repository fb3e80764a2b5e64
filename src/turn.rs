//! Turn-taking state machine
//!
//! The single writer of "who is talking" state. All other components submit
//! events here and execute the decisions handed back; nothing else mutates
//! turn or response state, which keeps the capture, playback and network
//! sides free of cross-locking.
//!
//! The controller is synchronous and pure apart from its observer hook, so
//! every ordering the providers can produce is testable without audio
//! hardware or sockets.

/// Turn-taking state.
///
/// A fourth situation exists — user speech detected while the assistant is
/// responding — but it is resolved inside the same event dispatch by the
/// interruption sequence, so it is never observable as a stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Nobody is talking
    Idle,

    /// The user is speaking
    UserSpeaking,

    /// The assistant is generating or playing a reply
    AssistantResponding,
}

/// Event consumed by the controller, in provider-emission order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// The user started speaking
    SpeechStarted,

    /// The user stopped speaking; a final transcript is now pending
    SpeechStopped,

    /// Unstable transcript of the in-progress utterance
    PartialTranscript(String),

    /// Confirmed transcript for the pending utterance
    FinalTranscript(String),

    /// The bounded wait for a final transcript expired
    FinalizeTimeout,

    /// The assistant began a response
    ResponseStarted {
        /// Server-assigned response identifier
        response_id: String,
    },

    /// An output item was added to the active response
    ResponseItem {
        /// Server-assigned item identifier
        item_id: String,
    },

    /// Response text arrived (bookkeeping only)
    ResponseText {
        /// Number of characters in the fragment
        chars: usize,
    },

    /// Response audio arrived (bookkeeping only)
    ResponseAudio {
        /// Number of PCM bytes in the chunk
        bytes: usize,
    },

    /// The active response finished or was cancelled upstream
    ResponseDone,

    /// The provider connection dropped
    ProviderLost,
}

/// Decision handed back to the session for execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnAction {
    /// A finalized utterance is ready for the dialogue layer
    ForwardUtterance(String),

    /// Send a cancel-response control message upstream
    CancelResponse,

    /// Discard all queued-but-unplayed audio
    FlushPlayback,

    /// Nothing was recognized; prompt the user to repeat
    PromptRetry,
}

/// Observer hooks for UI/logging; decoupled from turn decisions
pub trait TurnObserver: Send {
    /// A partial transcript was observed (advisory)
    fn on_partial(&self, _text: &str) {}

    /// An utterance was finalized and forwarded
    fn on_utterance(&self, _text: &str) {}

    /// The assistant was interrupted by user speech
    fn on_interrupted(&self) {}

    /// The assistant finished a reply
    fn on_response_done(&self) {}
}

/// One user speech turn, from speech start to finalization
#[derive(Debug, Default)]
struct Utterance {
    /// Last non-empty partial; never regresses to empty once set
    last_partial: String,

    /// Recording has stopped; a final transcript (or timeout) is due
    awaiting_final: bool,
}

/// One assistant reply in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSession {
    /// Server-assigned response identifier
    pub response_id: String,

    /// Current output item, once known
    pub item_id: Option<String>,

    /// Characters of reply text accumulated so far
    pub text_chars: usize,

    /// Bytes of reply audio accumulated so far
    pub audio_bytes: usize,
}

/// The turn-taking state machine
pub struct TurnController {
    state: TurnState,
    utterance: Option<Utterance>,
    response: Option<ResponseSession>,
    /// Split pipelines have no server VAD while the assistant speaks, so a
    /// partial transcript arriving mid-response is itself the barge-in
    /// signal
    barge_in_on_partial: bool,
    observer: Option<Box<dyn TurnObserver>>,
}

impl TurnController {
    /// Create a controller
    #[must_use]
    pub fn new(barge_in_on_partial: bool) -> Self {
        Self {
            state: TurnState::Idle,
            utterance: None,
            response: None,
            barge_in_on_partial,
            observer: None,
        }
    }

    /// Register an observer for UI/logging callbacks
    pub fn set_observer(&mut self, observer: Box<dyn TurnObserver>) {
        self.observer = Some(observer);
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> TurnState {
        self.state
    }

    /// The active response, if any
    #[must_use]
    pub fn active_response(&self) -> Option<&ResponseSession> {
        self.response.as_ref()
    }

    /// Whether an utterance is awaiting its final transcript
    #[must_use]
    pub fn pending_finalization(&self) -> bool {
        self.utterance.as_ref().is_some_and(|u| u.awaiting_final)
    }

    /// Consume one event, returning the actions to execute.
    ///
    /// Actions are ordered: a cancel always precedes the flush it pairs
    /// with, so stale audio is gone before any newer frame can be enqueued.
    pub fn on_event(&mut self, event: TurnEvent) -> Vec<TurnAction> {
        match event {
            TurnEvent::SpeechStarted => self.on_speech_started(),
            TurnEvent::SpeechStopped => {
                if self.state == TurnState::UserSpeaking {
                    self.state = TurnState::Idle;
                    if let Some(u) = self.utterance.as_mut() {
                        u.awaiting_final = true;
                    }
                }
                Vec::new()
            }
            TurnEvent::PartialTranscript(text) => self.on_partial(text),
            TurnEvent::FinalTranscript(text) => self.on_final(&text),
            TurnEvent::FinalizeTimeout => self.on_finalize_timeout(),
            TurnEvent::ResponseStarted { response_id } => self.on_response_started(response_id),
            TurnEvent::ResponseItem { item_id } => {
                if let Some(resp) = self.response.as_mut() {
                    resp.item_id = Some(item_id);
                }
                Vec::new()
            }
            TurnEvent::ResponseText { chars } => {
                if let Some(resp) = self.response.as_mut() {
                    resp.text_chars += chars;
                }
                Vec::new()
            }
            TurnEvent::ResponseAudio { bytes } => {
                if let Some(resp) = self.response.as_mut() {
                    resp.audio_bytes += bytes;
                }
                Vec::new()
            }
            TurnEvent::ResponseDone => {
                self.finish_response();
                Vec::new()
            }
            TurnEvent::ProviderLost => {
                // Same shape as a completed response plus an abandoned
                // utterance: back to idle, ready for a retry next turn
                tracing::warn!("provider lost, abandoning current turn");
                self.finish_response();
                self.utterance = None;
                self.state = TurnState::Idle;
                Vec::new()
            }
        }
    }

    fn on_speech_started(&mut self) -> Vec<TurnAction> {
        match self.state {
            TurnState::Idle => {
                self.state = TurnState::UserSpeaking;
                self.utterance = Some(Utterance::default());
                Vec::new()
            }
            TurnState::UserSpeaking => Vec::new(),
            TurnState::AssistantResponding => {
                // Barge-in: the user always wins over an in-flight reply
                let actions = self.interrupt();
                self.state = TurnState::UserSpeaking;
                self.utterance = Some(Utterance::default());
                actions
            }
        }
    }

    fn on_partial(&mut self, text: String) -> Vec<TurnAction> {
        if self.barge_in_on_partial && self.state == TurnState::AssistantResponding {
            tracing::debug!(text = %text, "partial transcript during response, treating as barge-in");
            let actions = self.interrupt();
            self.state = TurnState::UserSpeaking;
            let mut utterance = Utterance::default();
            if !text.trim().is_empty() {
                utterance.last_partial.clone_from(&text);
            }
            self.utterance = Some(utterance);
            if let Some(obs) = &self.observer {
                obs.on_partial(&text);
            }
            // Actions already include the cancel+flush pair
            return actions;
        }

        if !text.trim().is_empty() {
            if let Some(u) = self.utterance.as_mut() {
                u.last_partial.clone_from(&text);
            }
        }
        if let Some(obs) = &self.observer {
            obs.on_partial(&text);
        }
        Vec::new()
    }

    fn on_final(&mut self, text: &str) -> Vec<TurnAction> {
        // A final landing while the assistant responds is advisory only
        // (realtime providers deliver the user transcript after the
        // response has already started); forwarding it would race a second
        // response into flight.
        if self.state == TurnState::AssistantResponding {
            if let Some(obs) = &self.observer {
                obs.on_utterance(text);
            }
            self.utterance = None;
            return Vec::new();
        }

        let utterance = self.utterance.take().unwrap_or_default();
        self.state = TurnState::Idle;

        let effective = if text.trim().is_empty() {
            // Empty final: retain the last non-empty partial rather than
            // regressing the utterance to nothing
            utterance.last_partial
        } else {
            text.to_string()
        };

        if effective.trim().is_empty() {
            tracing::debug!("empty final transcript, nothing to forward");
            return Vec::new();
        }

        if let Some(obs) = &self.observer {
            obs.on_utterance(&effective);
        }
        vec![TurnAction::ForwardUtterance(effective)]
    }

    fn on_finalize_timeout(&mut self) -> Vec<TurnAction> {
        let Some(utterance) = self.utterance.take() else {
            return Vec::new();
        };
        if !utterance.awaiting_final {
            // Stale timer; the utterance was superseded
            self.utterance = Some(utterance);
            return Vec::new();
        }

        self.state = TurnState::Idle;

        if utterance.last_partial.trim().is_empty() {
            tracing::debug!("finalize timeout with nothing recognized");
            return vec![TurnAction::PromptRetry];
        }

        // Deliberate fallback, not data loss: the provider never confirmed,
        // so the last good partial stands in for the final
        tracing::info!(text = %utterance.last_partial, "finalize timeout, using last partial");
        if let Some(obs) = &self.observer {
            obs.on_utterance(&utterance.last_partial);
        }
        vec![TurnAction::ForwardUtterance(utterance.last_partial)]
    }

    fn on_response_started(&mut self, response_id: String) -> Vec<TurnAction> {
        let mut actions = Vec::new();

        if self.response.is_some() {
            // Only valid after an explicit cancel-and-clear; cancel the
            // stale one rather than leak two live responses
            tracing::warn!(response_id = %response_id, "response started while one is active, cancelling stale");
            actions.push(TurnAction::CancelResponse);
        }

        self.response = Some(ResponseSession {
            response_id,
            item_id: None,
            text_chars: 0,
            audio_bytes: 0,
        });

        match self.state {
            TurnState::Idle => {
                self.state = TurnState::AssistantResponding;
            }
            TurnState::UserSpeaking => {
                // The user is already talking; their turn wins before any
                // reply audio can start
                tracing::debug!("response started under user speech, cancelling immediately");
                self.response = None;
                actions.push(TurnAction::CancelResponse);
                actions.push(TurnAction::FlushPlayback);
            }
            TurnState::AssistantResponding => {}
        }

        actions
    }

    /// The interruption sequence. Idempotent: with no active response it is
    /// a no-op beyond clearing the playback queue.
    fn interrupt(&mut self) -> Vec<TurnAction> {
        let mut actions = Vec::new();

        if let Some(resp) = self.response.take() {
            tracing::info!(
                response_id = %resp.response_id,
                text_chars = resp.text_chars,
                audio_bytes = resp.audio_bytes,
                "interrupting active response"
            );
            actions.push(TurnAction::CancelResponse);
            if let Some(obs) = &self.observer {
                obs.on_interrupted();
            }
        }

        actions.push(TurnAction::FlushPlayback);
        actions
    }

    fn finish_response(&mut self) {
        if self.response.take().is_some() {
            if let Some(obs) = &self.observer {
                obs.on_response_done();
            }
        }
        if self.state == TurnState::AssistantResponding {
            self.state = TurnState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_never_transitions() {
        let mut turn = TurnController::new(false);
        turn.on_event(TurnEvent::SpeechStarted);
        let actions = turn.on_event(TurnEvent::PartialTranscript("你".to_string()));
        assert!(actions.is_empty());
        assert_eq!(turn.state(), TurnState::UserSpeaking);
    }

    #[test]
    fn test_empty_final_with_partial_falls_back() {
        let mut turn = TurnController::new(false);
        turn.on_event(TurnEvent::SpeechStarted);
        turn.on_event(TurnEvent::PartialTranscript("你好".to_string()));
        let actions = turn.on_event(TurnEvent::FinalTranscript(String::new()));
        assert_eq!(
            actions,
            vec![TurnAction::ForwardUtterance("你好".to_string())]
        );
    }

    #[test]
    fn test_interrupt_without_response_only_flushes() {
        let mut turn = TurnController::new(false);
        turn.on_event(TurnEvent::ResponseStarted {
            response_id: "r1".to_string(),
        });
        turn.on_event(TurnEvent::ResponseDone);

        let actions = turn.on_event(TurnEvent::SpeechStarted);
        assert_eq!(actions, vec![]);
        assert_eq!(turn.state(), TurnState::UserSpeaking);
    }
}
