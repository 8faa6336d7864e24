use std::io::Cursor;

use hound::{SampleFormat, WavReader};
use tracing::info;

use crate::{PulseError, Result};

/// Immutable decoded audio with interleaved samples.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    sample_rate: u32,
    channels: u16,
    samples: Vec<f32>,
}

impl PcmBuffer {
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<f32>) -> Result<Self> {
        if sample_rate == 0 {
            return Err(PulseError::InvalidInput("sample rate must be positive"));
        }
        if channels == 0 {
            return Err(PulseError::InvalidInput("buffer needs at least one channel"));
        }
        if samples.len() % usize::from(channels) != 0 {
            return Err(PulseError::InvalidInput(
                "sample count is not a multiple of the channel count",
            ));
        }

        Ok(Self {
            sample_rate,
            channels,
            samples,
        })
    }

    pub fn from_mono(sample_rate: u32, samples: Vec<f32>) -> Result<Self> {
        Self::new(sample_rate, 1, samples)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Frame index at `seconds`, clamped to the buffer length.
    pub fn frame_at(&self, seconds: f64) -> usize {
        if !(seconds > 0.0) {
            return 0;
        }
        ((seconds * f64::from(self.sample_rate)) as usize).min(self.frames())
    }

    /// Channel average of one frame.
    pub fn mono_frame(&self, frame: usize) -> f32 {
        let channels = usize::from(self.channels);
        let start = frame * channels;
        match self.samples.get(start..start + channels) {
            Some(chunk) => chunk.iter().sum::<f32>() / channels as f32,
            None => 0.0,
        }
    }

    /// Fills `out` with the mono mix of the frames just before `end_frame`.
    /// Positions outside the buffer read as silence.
    pub fn copy_mono_window(&self, end_frame: usize, out: &mut [f32]) {
        let first = end_frame as isize - out.len() as isize;
        for (offset, slot) in out.iter_mut().enumerate() {
            let frame = first + offset as isize;
            *slot = if frame < 0 {
                0.0
            } else {
                self.mono_frame(frame as usize)
            };
        }
    }
}

/// Turns encoded bytes into a [`PcmBuffer`].
pub trait Decoder {
    fn decode(&self, bytes: &[u8]) -> Result<PcmBuffer>;
}

/// RIFF/WAVE decoder for integer and float PCM.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl Decoder for WavDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<PcmBuffer> {
        let reader = WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();

        let samples = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()?,
            SampleFormat::Int => {
                if !(1..=32).contains(&spec.bits_per_sample) {
                    return Err(PulseError::Decode(format!(
                        "unsupported bit depth {}",
                        spec.bits_per_sample
                    )));
                }
                let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|sample| sample.map(|value| value as f32 * scale))
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        let buffer = PcmBuffer::new(spec.sample_rate, spec.channels, samples)
            .map_err(|err| PulseError::Decode(err.to_string()))?;

        info!(
            sample_rate = buffer.sample_rate(),
            channels = buffer.channels(),
            duration = buffer.duration_seconds(),
            "decoded wav"
        );
        Ok(buffer)
    }
}
