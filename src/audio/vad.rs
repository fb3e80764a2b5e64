//! Voice activity detection
//!
//! Energy-based detector for pipelines where the provider does not do
//! server-side turn detection. Emits speech-start/speech-stop edges from
//! captured frames; transcription still decides what was said.

/// Minimum normalized RMS energy to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech before a start edge fires (samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Silence duration that ends an utterance (samples at 16kHz).
/// Matches the 900ms server-side VAD hangover used by realtime providers.
const SILENCE_SAMPLES: usize = 14400;

/// Detected speech boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    /// User started speaking
    SpeechStarted,
    /// User stopped speaking
    SpeechStopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for speech
    Idle,
    /// Energy above threshold, accumulating toward a start edge
    Tentative,
    /// Start edge emitted, waiting for trailing silence
    Speaking,
}

/// Detects speech activity in a stream of capture frames
pub struct VoiceActivityDetector {
    threshold: f32,
    state: State,
    speech_samples: usize,
    silence_samples: usize,
}

impl VoiceActivityDetector {
    /// Create a detector with the default energy threshold
    #[must_use]
    pub fn new() -> Self {
        Self::with_threshold(ENERGY_THRESHOLD)
    }

    /// Create a detector with an explicit energy threshold
    #[must_use]
    pub const fn with_threshold(threshold: f32) -> Self {
        Self {
            threshold,
            state: State::Idle,
            speech_samples: 0,
            silence_samples: 0,
        }
    }

    /// Process one capture frame, returning a boundary edge if one fired
    pub fn process(&mut self, samples: &[i16]) -> Option<VadEvent> {
        let energy = calculate_energy(samples);
        let is_speech = energy > self.threshold;

        match self.state {
            State::Idle => {
                if is_speech {
                    self.state = State::Tentative;
                    self.speech_samples = samples.len();
                    self.silence_samples = 0;
                    tracing::trace!(energy, "speech candidate");
                }
                None
            }
            State::Tentative => {
                if is_speech {
                    self.speech_samples += samples.len();
                    self.silence_samples = 0;
                    if self.speech_samples >= MIN_SPEECH_SAMPLES {
                        self.state = State::Speaking;
                        tracing::debug!("speech started");
                        return Some(VadEvent::SpeechStarted);
                    }
                } else {
                    self.silence_samples += samples.len();
                    // Blip, not speech
                    if self.silence_samples > SILENCE_SAMPLES / 2 {
                        self.reset();
                    }
                }
                None
            }
            State::Speaking => {
                if is_speech {
                    self.silence_samples = 0;
                } else {
                    self.silence_samples += samples.len();
                    if self.silence_samples > SILENCE_SAMPLES {
                        self.reset();
                        tracing::debug!("speech stopped");
                        return Some(VadEvent::SpeechStopped);
                    }
                }
                None
            }
        }
    }

    /// Whether the detector is inside an utterance
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.state == State::Speaking
    }

    /// Reset to idle, abandoning any in-progress edge
    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.speech_samples = 0;
        self.silence_samples = 0;
    }
}

impl Default for VoiceActivityDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Calculate normalized RMS energy of PCM16 samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples
        .iter()
        .map(|&s| {
            let f = f32::from(s) / 32768.0;
            f * f
        })
        .sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loud(n: usize) -> Vec<i16> {
        vec![16000; n]
    }

    fn quiet(n: usize) -> Vec<i16> {
        vec![0; n]
    }

    #[test]
    fn test_energy_calculation() {
        assert!(calculate_energy(&quiet(100)) < 0.001);
        assert!(calculate_energy(&loud(100)) > 0.4);
    }

    #[test]
    fn test_start_edge_after_min_speech() {
        let mut vad = VoiceActivityDetector::new();

        // One short frame is not enough
        assert_eq!(vad.process(&loud(1600)), None);

        // Crossing the minimum fires the start edge once
        let mut started = 0;
        for _ in 0..4 {
            if vad.process(&loud(1600)) == Some(VadEvent::SpeechStarted) {
                started += 1;
            }
        }
        assert_eq!(started, 1);
        assert!(vad.is_speaking());
    }

    #[test]
    fn test_stop_edge_after_silence() {
        let mut vad = VoiceActivityDetector::new();
        for _ in 0..4 {
            vad.process(&loud(1600));
        }
        assert!(vad.is_speaking());

        let mut stopped = false;
        for _ in 0..12 {
            if vad.process(&quiet(1600)) == Some(VadEvent::SpeechStopped) {
                stopped = true;
                break;
            }
        }
        assert!(stopped);
        assert!(!vad.is_speaking());
    }

    #[test]
    fn test_blip_does_not_trigger() {
        let mut vad = VoiceActivityDetector::new();
        assert_eq!(vad.process(&loud(1600)), None);
        for _ in 0..8 {
            assert_eq!(vad.process(&quiet(1600)), None);
        }
        assert!(!vad.is_speaking());
    }
}
