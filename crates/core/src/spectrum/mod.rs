use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{analysis::SILENT_SAMPLE, AnalyserConfig, PcmBuffer, Result};

/// Windowed FFT analyser producing byte snapshots in the conventional
/// analyser-node format: smoothed magnitudes mapped from a decibel range onto
/// `0..=255`, and time-domain samples centred on 128.
pub struct SpectrumAnalyser {
    config: AnalyserConfig,
    plan: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    samples: Vec<f32>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    smoothed: Vec<f32>,
}

impl SpectrumAnalyser {
    pub fn new(config: AnalyserConfig) -> Result<Self> {
        config.validate()?;
        let size = config.fft_size;
        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(size);
        let scratch = plan.make_scratch_vec();
        let spectrum = plan.make_output_vec();
        let input = plan.make_input_vec();
        let window = (0..size).map(|index| blackman_value(index, size)).collect();

        Ok(Self {
            plan,
            window,
            samples: vec![0.0; size],
            input,
            spectrum,
            scratch,
            smoothed: vec![0.0; size / 2],
            config,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.config.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.config.fft_size / 2
    }

    /// Forgets smoothing state, e.g. when playback restarts elsewhere.
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|value| *value = 0.0);
    }

    /// Loads the mono mix of the frames leading up to `end_frame`.
    pub fn load_window(&mut self, buffer: &PcmBuffer, end_frame: usize) {
        buffer.copy_mono_window(end_frame, &mut self.samples);
    }

    /// Loads samples directly. Shorter input is zero padded at the front.
    pub fn load_samples(&mut self, samples: &[f32]) {
        let size = self.samples.len();
        let take = samples.len().min(size);
        let pad = size - take;
        self.samples[..pad].iter_mut().for_each(|value| *value = 0.0);
        self.samples[pad..].copy_from_slice(&samples[samples.len() - take..]);
    }

    /// Runs the FFT over the loaded window and writes byte magnitudes. Bins
    /// beyond [`bin_count`](Self::bin_count) are zeroed.
    pub fn byte_frequency_data(&mut self, out: &mut [u8]) -> Result<()> {
        let windowed = self.input.iter_mut().zip(&self.samples).zip(&self.window);
        for ((input, sample), weight) in windowed {
            *input = sample * weight;
        }

        self.plan
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)?;

        let size = self.config.fft_size as f32;
        let smoothing = self.config.smoothing;
        let range = self.config.max_decibels - self.config.min_decibels;

        for (index, slot) in out.iter_mut().enumerate() {
            let Some(smoothed) = self.smoothed.get_mut(index) else {
                *slot = 0;
                continue;
            };
            let magnitude = self.spectrum[index].norm() / size;
            *smoothed = smoothing * *smoothed + (1.0 - smoothing) * magnitude;

            *slot = if *smoothed > 0.0 && smoothed.is_finite() {
                let decibels = 20.0 * smoothed.log10();
                let scaled = 255.0 / range * (decibels - self.config.min_decibels);
                scaled.floor().clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }
        Ok(())
    }

    /// Writes the loaded window as unsigned bytes. Extra output is silence.
    pub fn byte_time_domain_data(&self, out: &mut [u8]) {
        for (index, slot) in out.iter_mut().enumerate() {
            *slot = match self.samples.get(index) {
                Some(sample) => (128.0 * (1.0 + sample)).floor().clamp(0.0, 255.0) as u8,
                None => SILENT_SAMPLE,
            };
        }
    }
}

impl fmt::Debug for SpectrumAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyser")
            .field("config", &self.config)
            .finish()
    }
}

fn blackman_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    let phase = 2.0 * PI * index as f32 / len as f32;
    0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyser() -> SpectrumAnalyser {
        SpectrumAnalyser::new(AnalyserConfig {
            smoothing: 0.0,
            ..Default::default()
        })
        .unwrap()
    }

    fn sine(frequency: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (2.0 * PI * frequency * n as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn silence_produces_zero_bins() {
        let mut analyser = analyser();
        analyser.load_samples(&[0.0; 1024]);
        let mut bins = vec![1u8; analyser.bin_count()];
        analyser.byte_frequency_data(&mut bins).unwrap();

        assert!(bins.iter().all(|&bin| bin == 0));
    }

    #[test]
    fn tone_peaks_in_its_bin() {
        let mut analyser = analyser();
        // 1024-point FFT at 44.1 kHz: bin 40 is centred on ~1722.7 Hz.
        let frequency = 40.0 * 44_100.0 / 1024.0;
        analyser.load_samples(&sine(frequency, 44_100.0, 1024));
        let mut bins = vec![0u8; analyser.bin_count()];
        analyser.byte_frequency_data(&mut bins).unwrap();

        assert_eq!(bins[40], 255);
        for (index, &value) in bins.iter().enumerate() {
            if value == 255 {
                assert!((37..=43).contains(&index), "unexpected peak at bin {index}");
            }
        }
        assert_eq!(bins[400], 0);
    }

    #[test]
    fn smoothing_carries_energy_forward() {
        let mut analyser = SpectrumAnalyser::new(AnalyserConfig::default()).unwrap();
        let frequency = 40.0 * 44_100.0 / 1024.0;
        let mut bins = vec![0u8; analyser.bin_count()];

        analyser.load_samples(&sine(frequency, 44_100.0, 1024));
        analyser.byte_frequency_data(&mut bins).unwrap();
        analyser.load_samples(&[0.0; 1024]);
        analyser.byte_frequency_data(&mut bins).unwrap();
        assert!(bins[40] > 0);

        analyser.reset();
        analyser.byte_frequency_data(&mut bins).unwrap();
        assert_eq!(bins[40], 0);
    }

    #[test]
    fn time_domain_is_centred_on_128() {
        let mut analyser = analyser();
        analyser.load_samples(&[0.0, 1.0, -1.0, 0.5]);
        let mut out = vec![0u8; 1030];
        analyser.byte_time_domain_data(&mut out);

        assert_eq!(out[0], 128);
        assert_eq!(&out[1020..1024], &[128, 255, 0, 192]);
        assert_eq!(out[1029], SILENT_SAMPLE);
    }

    #[test]
    fn rejects_invalid_fft_size() {
        let config = AnalyserConfig {
            fft_size: 1000,
            ..Default::default()
        };
        assert!(SpectrumAnalyser::new(config).is_err());
    }
}
