//! Core library for the Music Pulse engine.
//!
//! The crate keeps audio-reactive renderers in step with playback. A
//! [`PlaybackClock`] maps the track timeline onto wall-clock time across play,
//! pause and seek; a [`FeatureExtractor`] reduces each frequency snapshot to
//! normalised volume and bass/mid/treble levels; a [`BeatDetector`] flags
//! energy spikes against a rolling, bass-weighted average. [`AudioEngine`]
//! owns one session and runs the three in order once per tick.
//!
//! Decoding and audio output sit behind the [`Decoder`] and [`OutputDevice`]
//! traits. [`WavDecoder`] and [`OfflineOutput`] are reference implementations
//! that need no audio hardware.

pub mod analysis;
pub mod audio;
pub mod beat;
pub mod config;
pub mod decode;
pub mod error;
pub mod output;
pub mod render;
pub mod spectrum;
pub mod timeline;

pub use analysis::{FeatureExtractor, FeatureRecord, FeatureSummary, SpectralBands};
pub use audio::{AudioEngine, Tick};
pub use beat::{BeatDetector, EnergyHistory};
pub use config::{AnalyserConfig, AppConfig, BeatConfig, ClockConfig, FeatureConfig};
pub use decode::{Decoder, PcmBuffer, WavDecoder};
pub use error::{PulseError, Result};
pub use output::{OfflineOutput, OutputDevice};
pub use render::{FeatureConsumer, RenderGraph};
pub use spectrum::SpectrumAnalyser;
pub use timeline::{
    Completion, ManualClock, PlaybackClock, PlaybackState, StopReason, SystemClock, WallClock,
};
