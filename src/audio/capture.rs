//! Audio capture from microphone

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use super::AudioFrame;
use crate::{Error, Result};

/// Bound on the capture queue, in frames (~3 seconds at 100ms frames).
///
/// Live audio has no recovery value once stale, so overflow drops the
/// oldest frame rather than blocking the device callback.
const CAPTURE_QUEUE_FRAMES: usize = 32;

struct CaptureState {
    /// Samples accumulated toward the next full frame
    pending: Vec<i16>,
    /// Completed frames awaiting the consumer
    queue: VecDeque<AudioFrame>,
    /// Sequence number for the next completed frame
    next_seq: u64,
    /// Frames discarded because the consumer stalled
    dropped: u64,
}

/// Captures fixed-size PCM frames from the default input device
pub struct AudioCapture {
    #[allow(dead_code)]
    device: Device,
    config: StreamConfig,
    sample_rate: u32,
    frame_samples: usize,
    state: Arc<Mutex<CaptureState>>,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Create a new audio capture instance
    ///
    /// # Errors
    ///
    /// Returns error if no input device supports mono at `sample_rate`
    pub fn new(sample_rate: u32, frame_samples: usize) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            sample_rate,
            frame_samples,
            state: Arc::new(Mutex::new(CaptureState {
                pending: Vec::new(),
                queue: VecDeque::new(),
                next_seq: 0,
                dropped: 0,
            })),
            stream: None,
        })
    }

    /// Start capturing audio
    ///
    /// Restartable: a new recording session continues the frame sequence.
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be built or started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let state = Arc::clone(&self.state);
        let frame_samples = self.frame_samples;
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device".to_string()))?;

        let config = self.config.clone();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let Ok(mut st) = state.lock() else { return };

                    for &sample in data {
                        #[allow(clippy::cast_possible_truncation)]
                        let s = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                        st.pending.push(s);
                    }

                    while st.pending.len() >= frame_samples {
                        let rest = st.pending.split_off(frame_samples);
                        let samples = std::mem::replace(&mut st.pending, rest);
                        let seq = st.next_seq;
                        st.next_seq += 1;

                        if st.queue.len() >= CAPTURE_QUEUE_FRAMES {
                            st.queue.pop_front();
                            st.dropped += 1;
                        }
                        st.queue.push_back(AudioFrame::new(seq, samples));
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop capturing audio and release the device
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Take all completed frames captured since the last call
    #[must_use]
    pub fn drain(&self) -> Vec<AudioFrame> {
        self.state
            .lock()
            .map(|mut st| st.queue.drain(..).collect())
            .unwrap_or_default()
    }

    /// Discard any queued frames and the partial frame in progress
    pub fn clear(&self) {
        if let Ok(mut st) = self.state.lock() {
            st.queue.clear();
            st.pending.clear();
        }
    }

    /// Frames dropped so far because the consumer stalled
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.state.lock().map(|st| st.dropped).unwrap_or(0)
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Get the sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
