use serde::{Deserialize, Serialize};

use crate::{PulseError, Result};

/// Top-level configuration structure for the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub analyser: AnalyserConfig,
    pub features: FeatureConfig,
    pub beat: BeatConfig,
    pub clock: ClockConfig,
}

impl AppConfig {
    /// Parses a JSON document. Missing fields fall back to their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.analyser.validate()?;
        self.features.validate()?;
        self.beat.validate()?;
        self.clock.validate()
    }
}

/// Settings of the reference FFT analysis primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyserConfig {
    pub fft_size: usize,
    /// Weight of the previous frame when smoothing magnitudes over time.
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: 1024,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AnalyserConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.fft_size.is_power_of_two() || !(32..=32_768).contains(&self.fft_size) {
            return Err(PulseError::InvalidConfig(format!(
                "fft_size must be a power of two between 32 and 32768, got {}",
                self.fft_size
            )));
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(PulseError::InvalidConfig(format!(
                "smoothing must lie in [0, 1], got {}",
                self.smoothing
            )));
        }
        if !(self.min_decibels < self.max_decibels) {
            return Err(PulseError::InvalidConfig(
                "min_decibels must be below max_decibels".to_string(),
            ));
        }
        Ok(())
    }
}

/// Band layout and normalisation curve of the feature extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Fraction of the bins that belongs to the bass band.
    pub bass_fraction: f64,
    /// Fraction of the bins at which the mid band ends.
    pub mid_fraction: f64,
    /// Exponent applied to the 0-1 band average.
    pub exponent: f32,
    /// Length of the placeholder snapshots handed out for silent ticks.
    pub fallback_len: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            bass_fraction: 0.1,
            mid_fraction: 0.5,
            exponent: 0.8,
            fallback_len: 512,
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0 <= self.bass_fraction
            && self.bass_fraction <= self.mid_fraction
            && self.mid_fraction <= 1.0)
        {
            return Err(PulseError::InvalidConfig(format!(
                "band fractions must satisfy 0 <= bass ({}) <= mid ({}) <= 1",
                self.bass_fraction, self.mid_fraction
            )));
        }
        if !(self.exponent.is_finite() && self.exponent > 0.0) {
            return Err(PulseError::InvalidConfig(format!(
                "exponent must be positive, got {}",
                self.exponent
            )));
        }
        Ok(())
    }
}

/// Tuning of the adaptive beat detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatConfig {
    pub history_len: usize,
    pub base_threshold: f64,
    /// Multiplier floor applied when the bass band is silent.
    pub bass_floor: f64,
    /// Additional multiplier per unit of normalised bass.
    pub bass_weight: f64,
    pub epsilon: f64,
    pub cooldown_ms: f64,
    /// Frame length assumed when no previous tick is known.
    pub nominal_frame_ms: f64,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            history_len: 60,
            base_threshold: 1.3,
            bass_floor: 0.8,
            bass_weight: 0.5,
            epsilon: 1e-4,
            cooldown_ms: 150.0,
            nominal_frame_ms: 16.67,
        }
    }
}

impl BeatConfig {
    pub fn validate(&self) -> Result<()> {
        let factors = [
            ("base_threshold", self.base_threshold),
            ("bass_floor", self.bass_floor),
            ("bass_weight", self.bass_weight),
            ("epsilon", self.epsilon),
        ];
        if let Some((name, value)) = factors.iter().find(|(_, value)| !value.is_finite()) {
            return Err(PulseError::InvalidConfig(format!(
                "{name} must be finite, got {value}"
            )));
        }
        if self.history_len == 0 {
            return Err(PulseError::InvalidConfig(
                "history_len must be at least 1".to_string(),
            ));
        }
        if !(self.nominal_frame_ms > 0.0 && self.cooldown_ms >= 0.0) {
            return Err(PulseError::InvalidConfig(
                "frame and cooldown durations must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Distance from the end of the track within which an unclassified
    /// completion counts as the track having played out.
    pub end_tolerance_seconds: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            end_tolerance_seconds: 0.1,
        }
    }
}

impl ClockConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.end_tolerance_seconds >= 0.0) {
            return Err(PulseError::InvalidConfig(
                "end_tolerance_seconds must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = AppConfig::from_json_str(r#"{ "beat": { "cooldown_ms": 200.0 } }"#).unwrap();

        assert_eq!(config.beat.cooldown_ms, 200.0);
        assert_eq!(config.beat.history_len, 60);
        assert_eq!(config.analyser.fft_size, 1024);
    }

    #[test]
    fn rejects_non_power_of_two_fft() {
        let err = AppConfig::from_json_str(r#"{ "analyser": { "fft_size": 1000 } }"#).unwrap_err();
        assert!(format!("{err}").contains("fft_size"));
    }

    #[test]
    fn rejects_non_finite_beat_factors() {
        let nan_threshold = BeatConfig {
            base_threshold: f64::NAN,
            ..Default::default()
        };
        let err = nan_threshold.validate().unwrap_err();
        assert!(format!("{err}").contains("base_threshold"));

        let infinite_epsilon = BeatConfig {
            epsilon: f64::INFINITY,
            ..Default::default()
        };
        assert!(infinite_epsilon.validate().is_err());

        let nan_weight = BeatConfig {
            bass_weight: f64::NAN,
            ..Default::default()
        };
        assert!(nan_weight.validate().is_err());
    }

    #[test]
    fn rejects_inverted_bands() {
        let config = FeatureConfig {
            bass_fraction: 0.6,
            mid_fraction: 0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
