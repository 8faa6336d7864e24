use serde::{Deserialize, Serialize};

use crate::FeatureConfig;

/// Largest magnitude an 8-bit snapshot can carry.
const MAX_MAGNITUDE: f32 = 255.0;

/// Byte value of a silent sample in an unsigned 8-bit time-domain snapshot.
pub const SILENT_SAMPLE: u8 = 128;

/// Band levels reduced from one frequency snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpectralBands {
    pub volume: f32,
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    /// Mean squared magnitude across all bins. Feeds the beat detector only.
    pub energy: f64,
}

/// Reduces frequency snapshots to normalised bass/mid/treble/volume levels.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Band boundaries `(bass_end, mid_end)` for a snapshot of `bins` bins.
    pub fn band_edges(&self, bins: usize) -> (usize, usize) {
        let bass_end = ((self.config.bass_fraction * bins as f64).floor() as usize).min(bins);
        let mid_end =
            ((self.config.mid_fraction * bins as f64).floor() as usize).clamp(bass_end, bins);
        (bass_end, mid_end)
    }

    /// An empty snapshot yields all-zero bands.
    pub fn extract(&self, bins: &[u8]) -> SpectralBands {
        if bins.is_empty() {
            return SpectralBands::default();
        }

        let (bass_end, mid_end) = self.band_edges(bins.len());
        let mut sums = [0u64; 3];
        let mut squares = 0u64;

        for (index, &magnitude) in bins.iter().enumerate() {
            let band = if index < bass_end {
                0
            } else if index < mid_end {
                1
            } else {
                2
            };
            let magnitude = u64::from(magnitude);
            sums[band] += magnitude;
            squares += magnitude * magnitude;
        }

        let total: u64 = sums.iter().sum();
        let counts = [bass_end, mid_end - bass_end, bins.len() - mid_end];

        SpectralBands {
            volume: self.normalise(average(total, bins.len())),
            bass: self.normalise(average(sums[0], counts[0])),
            mid: self.normalise(average(sums[1], counts[1])),
            treble: self.normalise(average(sums[2], counts[2])),
            energy: squares as f64 / bins.len() as f64,
        }
    }

    /// Maps a raw band average onto `[0, 1]` with a sub-linear curve so quiet
    /// bands stay visible.
    pub fn normalise(&self, average: f32) -> f32 {
        (average / MAX_MAGNITUDE)
            .clamp(0.0, 1.0)
            .powf(self.config.exponent)
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(FeatureConfig::default())
    }
}

fn average(sum: u64, count: usize) -> f32 {
    sum as f32 / count.max(1) as f32
}

/// Per-tick output handed to renderers.
///
/// The raw snapshots borrow buffers the engine rewrites on the next tick;
/// copy them (or take a [`FeatureSummary`]) to keep anything longer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureRecord<'a> {
    pub volume: f32,
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub is_beat: bool,
    pub raw_frequency: &'a [u8],
    pub raw_time_domain: &'a [u8],
}

impl<'a> FeatureRecord<'a> {
    pub fn from_bands(
        bands: &SpectralBands,
        is_beat: bool,
        raw_frequency: &'a [u8],
        raw_time_domain: &'a [u8],
    ) -> Self {
        Self {
            volume: bands.volume,
            bass: bands.bass,
            mid: bands.mid,
            treble: bands.treble,
            is_beat,
            raw_frequency,
            raw_time_domain,
        }
    }

    /// Neutral record: every level zero, no beat.
    pub fn silent(raw_frequency: &'a [u8], raw_time_domain: &'a [u8]) -> Self {
        Self::from_bands(&SpectralBands::default(), false, raw_frequency, raw_time_domain)
    }

    pub fn summary(&self) -> FeatureSummary {
        FeatureSummary {
            volume: self.volume,
            bass: self.bass,
            mid: self.mid,
            treble: self.treble,
            is_beat: self.is_beat,
        }
    }
}

/// Owned, serialisable scalar part of a [`FeatureRecord`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub volume: f32,
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub is_beat: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::default()
    }

    #[test]
    fn zero_snapshot_is_silent() {
        let bands = extractor().extract(&[0u8; 512]);

        assert_eq!(bands, SpectralBands::default());
    }

    #[test]
    fn empty_snapshot_is_silent() {
        assert_eq!(extractor().extract(&[]), SpectralBands::default());
    }

    #[test]
    fn band_edges_follow_fractions() {
        assert_eq!(extractor().band_edges(512), (51, 256));
        assert_eq!(extractor().band_edges(10), (1, 5));
        assert_eq!(extractor().band_edges(3), (0, 1));
        assert_eq!(extractor().band_edges(1), (0, 0));
    }

    #[test]
    fn full_scale_snapshot_saturates() {
        let bands = extractor().extract(&[255u8; 64]);

        assert_eq!(bands.volume, 1.0);
        assert_eq!(bands.bass, 1.0);
        assert_eq!(bands.mid, 1.0);
        assert_eq!(bands.treble, 1.0);
        assert_eq!(bands.energy, 255.0 * 255.0);
    }

    #[test]
    fn bands_are_isolated() {
        // 20 bins: bass [0, 2), mid [2, 10), treble [10, 20)
        let mut bins = [0u8; 20];
        bins[0] = 255;
        bins[1] = 255;

        let bands = extractor().extract(&bins);
        assert_eq!(bands.bass, 1.0);
        assert_eq!(bands.mid, 0.0);
        assert_eq!(bands.treble, 0.0);
        assert!((bands.volume - extractor().normalise(25.5)).abs() < 1e-6);
        assert!((bands.energy - 2.0 * 255.0 * 255.0 / 20.0).abs() < 1e-9);
    }

    #[test]
    fn curve_boosts_quiet_levels() {
        let extractor = extractor();
        let quiet = extractor.normalise(25.5);

        assert!((quiet - 0.1f32.powf(0.8)).abs() < 1e-6);
        assert!(quiet > 0.1);
    }

    #[test]
    fn empty_bass_band_does_not_divide_by_zero() {
        let bands = extractor().extract(&[200u8, 200, 200]);

        assert_eq!(bands.bass, 0.0);
        assert!(bands.mid > 0.0 && bands.treble > 0.0);
        assert!(bands.volume.is_finite());
    }

    #[test]
    fn summary_keeps_scalars() {
        let bins = [10u8; 8];
        let time = [SILENT_SAMPLE; 8];
        let bands = extractor().extract(&bins);
        let record = FeatureRecord::from_bands(&bands, true, &bins, &time);

        let summary = record.summary();
        assert!(summary.is_beat);
        assert_eq!(summary.volume, record.volume);
    }
}
