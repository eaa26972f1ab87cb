//! Decoded PCM buffer handed to the playback controller.

use std::io::{Cursor, Read};
use std::path::Path;

use crate::playback::PlaybackError;

/// Interleaved `f32` PCM in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / usize::from(self.channels)
    }

    /// Length of the buffer in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Decode a WAV file from disk.
    pub fn from_wav_file(path: &Path) -> Result<Self, PlaybackError> {
        let reader = hound::WavReader::open(path)
            .map_err(|e| PlaybackError::Decode(format!("{}: {e}", path.display())))?;
        Self::decode(reader)
    }

    /// Decode an in-memory WAV file.
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self, PlaybackError> {
        let reader = hound::WavReader::new(Cursor::new(bytes))
            .map_err(|e| PlaybackError::Decode(e.to_string()))?;
        Self::decode(reader)
    }

    fn decode<R: Read>(reader: hound::WavReader<R>) -> Result<Self, PlaybackError> {
        let spec = reader.spec();
        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>(),
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<Vec<_>, _>>()
            }
        }
        .map_err(|e| PlaybackError::Decode(e.to_string()))?;

        Ok(Self::new(samples, spec.sample_rate, spec.channels))
    }
}
