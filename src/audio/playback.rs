//! Audio playback to speakers
//!
//! Playback is split in two: [`PlaybackQueue`] carries the ordering and
//! flush-barrier discipline and has no device dependency, [`AudioPlayback`]
//! feeds it to the default output device. The interruption path only ever
//! touches the queue.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use super::AudioFrame;
use crate::{Error, Result};

/// Bound on the playback queue, in frames
const PLAYBACK_QUEUE_FRAMES: usize = 64;

/// How long a producer may wait for queue space before giving up
const ENQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

struct Inner {
    frames: VecDeque<AudioFrame>,
    generation: u64,
    closed: bool,
}

/// Bounded FIFO of frames awaiting playback, with a generation barrier.
///
/// Frames are played in strict enqueue order. `flush()` atomically drains
/// everything queued-but-unplayed and bumps the generation; a producer that
/// captured an older generation before synthesizing has its late frames
/// rejected on arrival, so audio from a cancelled response can never land
/// behind a newer response's frames. The frame currently being written to
/// the device is outside the queue and always finishes.
pub struct PlaybackQueue {
    inner: Mutex<Inner>,
    space: Condvar,
    available: Condvar,
    capacity: usize,
}

impl PlaybackQueue {
    /// Create a queue with the default capacity
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_capacity(PLAYBACK_QUEUE_FRAMES)
    }

    /// Create a queue with an explicit capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                frames: VecDeque::new(),
                generation: 0,
                closed: false,
            }),
            space: Condvar::new(),
            available: Condvar::new(),
            capacity,
        })
    }

    /// Current generation. Producers capture this before synthesizing and
    /// pass it back on enqueue.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.lock().map(|g| g.generation).unwrap_or(0)
    }

    /// Enqueue a frame produced under `generation`.
    ///
    /// Returns `false` if the frame is stale (a flush happened since the
    /// producer captured the generation), the queue is closed, or no space
    /// opened up within the bounded wait.
    pub fn enqueue(&self, frame: AudioFrame, generation: u64) -> bool {
        let deadline = Instant::now() + ENQUEUE_TIMEOUT;
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };

        loop {
            if inner.closed || inner.generation != generation {
                return false;
            }
            if inner.frames.len() < self.capacity {
                inner.frames.push_back(frame);
                self.available.notify_one();
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!("playback queue full, dropping frame");
                return false;
            }
            let (guard, _) = match self.space.wait_timeout(inner, deadline - now) {
                Ok(r) => r,
                Err(_) => return false,
            };
            inner = guard;
        }
    }

    /// Atomically drain all queued-but-unplayed frames and advance the
    /// generation barrier. Returns the number of frames discarded.
    ///
    /// Safe to call from the interruption path concurrently with playback;
    /// the in-progress frame finishes, strictly-earlier queued frames are
    /// guaranteed not played.
    pub fn flush(&self) -> usize {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        let drained = inner.frames.len();
        inner.frames.clear();
        inner.generation += 1;
        self.space.notify_all();
        drained
    }

    /// Non-blocking pop for the device callback
    #[must_use]
    pub fn try_pop(&self) -> Option<AudioFrame> {
        let mut inner = self.inner.lock().ok()?;
        let frame = inner.frames.pop_front();
        if frame.is_some() {
            self.space.notify_one();
        }
        frame
    }

    /// Pop with a bounded wait. Returns `None` on timeout or close.
    #[must_use]
    pub fn pop_timeout(&self, timeout: Duration) -> Option<AudioFrame> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock().ok()?;

        loop {
            if let Some(frame) = inner.frames.pop_front() {
                self.space.notify_one();
                return Some(frame);
            }
            if inner.closed {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self.available.wait_timeout(inner, deadline - now).ok()?;
            inner = guard;
        }
    }

    /// Close the queue; pending and future enqueues fail, poppers drain
    /// whatever is left
    pub fn close(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.closed = true;
        }
        self.space.notify_all();
        self.available.notify_all();
    }

    /// Number of queued frames
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().map(|g| g.frames.len()).unwrap_or(0)
    }

    /// Whether the queue is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Plays queued frames to the default output device
pub struct AudioPlayback {
    #[allow(dead_code)]
    device: Device,
    config: StreamConfig,
    sample_rate: u32,
    queue: Arc<PlaybackQueue>,
    stream: Option<Stream>,
}

impl AudioPlayback {
    /// Create a new audio playback instance
    ///
    /// # Errors
    ///
    /// Returns error if no output device supports `sample_rate`
    pub fn new(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(sample_rate)
                        && c.max_sample_rate() >= SampleRate(sample_rate)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            device,
            config,
            sample_rate,
            queue: PlaybackQueue::new(),
            stream: None,
        })
    }

    /// Handle to the playback queue for producers and the interruption path
    #[must_use]
    pub fn queue(&self) -> Arc<PlaybackQueue> {
        Arc::clone(&self.queue)
    }

    /// Get the sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Start the output stream
    ///
    /// # Errors
    ///
    /// Returns error if the output stream cannot be built or started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".to_string()))?;

        let config = self.config.clone();
        let channels = config.channels as usize;
        let queue = Arc::clone(&self.queue);

        // The frame being written lives here, outside the queue: a flush
        // drops queued frames but lets this one finish, so interruption
        // never cuts mid-frame.
        let mut current: VecDeque<i16> = VecDeque::new();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for out_frame in data.chunks_mut(channels) {
                        if current.is_empty() {
                            if let Some(next) = queue.try_pop() {
                                current.extend(next.samples);
                            }
                        }
                        let sample = current
                            .pop_front()
                            .map_or(0.0, |s| f32::from(s) / 32768.0);
                        for out in out_frame.iter_mut() {
                            *out = sample;
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio playback started");
        Ok(())
    }

    /// Stop playback and release the device
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio playback stopped");
        }
    }

    /// Block until the queue has drained, up to `timeout`.
    ///
    /// Used by the hardware test subcommands; the live pipeline never waits
    /// on playback.
    pub fn wait_until_idle(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while !self.queue.is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
        // Let the device drain its last buffer
        std::thread::sleep(Duration::from_millis(100));
    }
}

impl Drop for AudioPlayback {
    fn drop(&mut self) {
        self.stop();
        self.queue.close();
    }
}
