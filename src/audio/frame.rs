//! PCM audio frames

use crate::{Error, Result};

/// An immutable buffer of 16-bit mono PCM samples.
///
/// Frames are tagged with a monotonically increasing sequence number by
/// whichever side produced them (capture or TTS synthesis). Once a frame is
/// enqueued for playback or network transmission it has a single consumer;
/// nothing else reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Producer-assigned sequence number, monotonically increasing
    pub seq: u64,

    /// Signed 16-bit mono PCM samples
    pub samples: Vec<i16>,
}

impl AudioFrame {
    /// Create a frame from raw samples
    #[must_use]
    pub const fn new(seq: u64, samples: Vec<i16>) -> Self {
        Self { seq, samples }
    }

    /// Frame duration in milliseconds at the given sample rate
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn duration_ms(&self, sample_rate: u32) -> u64 {
        (self.samples.len() as u64 * 1000) / u64::from(sample_rate)
    }

    /// Number of samples in the frame
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the frame holds no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Encode samples as little-endian PCM16 bytes for the wire
#[must_use]
pub fn samples_to_pcm_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}

/// Decode little-endian PCM16 bytes into samples
///
/// A trailing odd byte is dropped; providers occasionally split deltas
/// mid-sample and the next delta re-aligns.
#[must_use]
pub fn pcm_bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Convert samples to WAV bytes for HTTP STT/TTS APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Decode WAV bytes into mono PCM16 samples, checking the sample rate.
///
/// Rate mismatches are a configuration error — the pipeline never resamples
/// silently.
///
/// # Errors
///
/// Returns error if the WAV is malformed, not mono 16-bit, or its sample
/// rate differs from `expected_rate`
pub fn wav_to_samples(wav: &[u8], expected_rate: u32) -> Result<Vec<i16>> {
    let cursor = std::io::Cursor::new(wav);
    let mut reader = hound::WavReader::new(cursor).map_err(|e| Error::Audio(e.to_string()))?;

    let spec = reader.spec();
    if spec.channels != 1 || spec.bits_per_sample != 16 {
        return Err(Error::Config(format!(
            "expected mono 16-bit WAV, got {} channels at {} bits",
            spec.channels, spec.bits_per_sample
        )));
    }
    if spec.sample_rate != expected_rate {
        return Err(Error::Config(format!(
            "WAV sample rate {} does not match configured playback rate {expected_rate}",
            spec.sample_rate
        )));
    }

    reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Audio(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_byte_roundtrip() {
        let samples = vec![0i16, 1, -1, i16::MAX, i16::MIN, 1234];
        let bytes = samples_to_pcm_bytes(&samples);
        assert_eq!(bytes.len(), samples.len() * 2);
        assert_eq!(pcm_bytes_to_samples(&bytes), samples);
    }

    #[test]
    fn test_pcm_bytes_odd_tail_dropped() {
        let samples = pcm_bytes_to_samples(&[0x34, 0x12, 0xff]);
        assert_eq!(samples, vec![0x1234]);
    }

    #[test]
    fn test_wav_rate_mismatch_is_config_error() {
        let wav = samples_to_wav(&[0, 100, -100], 16000).unwrap();
        let err = wav_to_samples(&wav, 24000).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_frame_duration() {
        let frame = AudioFrame::new(0, vec![0; 1600]);
        assert_eq!(frame.duration_ms(16000), 100);
    }
}
