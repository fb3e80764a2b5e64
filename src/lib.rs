//! Parley - full-duplex voice interaction pipeline for AI assistants
//!
//! This library provides the core of a voice conversation loop:
//! - Audio capture/playback with bounded queues and a flush barrier
//! - A turn-taking state machine with barge-in interruption
//! - Dialogue orchestration (chat history, sentence-chunked synthesis)
//! - Provider adapters for realtime duplex and split ASR/LLM/TTS backends
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 ConversationSession                   │
//! │  capture ─▶ provider ─▶ TurnController ─▶ dialogue   │
//! │     ▲                        │                │       │
//! │     │                 barge-in: cancel        ▼       │
//! │  microphone              + flush ──────▶ playback    │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The turn controller is the single writer of "who is talking" state;
//! capture, playback and the network side communicate with it through
//! bounded channels and act on the decisions it returns.

pub mod audio;
pub mod catalog;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod persona;
pub mod provider;
pub mod session;
pub mod turn;

pub use config::{Config, PipelineMode, TurnConfig, VoiceConfig};
pub use dialogue::{DialogueOrchestrator, RespondOutcome, segment_reply};
pub use error::{Error, Result};
pub use persona::Persona;
pub use provider::{
    AsrClient, ChatBackend, ChatClient, ChatMessage, ControlEvent, Credentials, DuplexProvider,
    ProviderEvent, RealtimeClient, SpeechSynthesizer, TtsClient,
};
pub use session::ConversationSession;
pub use turn::{ResponseSession, TurnAction, TurnController, TurnEvent, TurnObserver, TurnState};
