//! Audio capture and playback
//!
//! Thin wrappers over the default input/output devices plus the queue
//! discipline the rest of the pipeline relies on: bounded capture queue with
//! drop-oldest backpressure, bounded playback queue with a flush barrier for
//! barge-in, and an energy-based voice activity detector for pipelines where
//! the server does not do turn detection.

mod capture;
mod frame;
mod playback;
mod vad;

pub use capture::AudioCapture;
pub use frame::{AudioFrame, pcm_bytes_to_samples, samples_to_pcm_bytes, samples_to_wav, wav_to_samples};
pub use playback::{AudioPlayback, PlaybackQueue};
pub use vad::{VadEvent, VoiceActivityDetector};

/// Sample rate for audio capture (16kHz for speech recognition)
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// Sample rate for playback (matches common TTS output)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Capture frame length in milliseconds
pub const FRAME_MS: u32 = 100;

/// Samples per capture frame at [`CAPTURE_SAMPLE_RATE`]
#[allow(clippy::cast_possible_truncation)]
pub const FRAME_SAMPLES: usize = (CAPTURE_SAMPLE_RATE / 1000 * FRAME_MS) as usize;
