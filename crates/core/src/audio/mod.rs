use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    analysis::SILENT_SAMPLE, AppConfig, BeatDetector, Completion, Decoder, FeatureExtractor,
    FeatureRecord, OutputDevice, PcmBuffer, PlaybackClock, PlaybackState, PulseError, Result,
    StopReason, SystemClock, WallClock,
};

/// Everything a renderer receives for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick<'a> {
    /// Current offset into the track, `None` while nothing is loaded.
    pub offset_seconds: Option<f64>,
    /// Wall time since the previous tick.
    pub elapsed_ms: f64,
    pub features: FeatureRecord<'a>,
}

/// Owns one playback session: the clock, the feature pipeline and the output
/// device. Drive it by calling [`tick`](Self::tick) once per rendered frame.
#[derive(Debug)]
pub struct AudioEngine<D: OutputDevice, C: WallClock = SystemClock> {
    device: D,
    wall_clock: C,
    clock: PlaybackClock,
    buffer: Option<Arc<PcmBuffer>>,
    extractor: FeatureExtractor,
    beats: BeatDetector,
    frequency: Vec<u8>,
    time_domain: Vec<u8>,
    silent_frequency: Vec<u8>,
    silent_time_domain: Vec<u8>,
    last_tick: Option<f64>,
    nominal_frame_ms: f64,
}

impl<D: OutputDevice> AudioEngine<D, SystemClock> {
    /// Creates an engine timed by the system's monotonic clock.
    pub fn with_system_clock(device: D, config: &AppConfig) -> Result<Self> {
        Self::new(device, SystemClock::new(), config)
    }
}

impl<D: OutputDevice, C: WallClock> AudioEngine<D, C> {
    pub fn new(device: D, wall_clock: C, config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let fallback_len = config.features.fallback_len;

        Ok(Self {
            frequency: vec![0; device.frequency_bin_count()],
            time_domain: vec![SILENT_SAMPLE; device.time_domain_len()],
            device,
            wall_clock,
            clock: PlaybackClock::new(config.clock.end_tolerance_seconds),
            buffer: None,
            extractor: FeatureExtractor::new(config.features.clone()),
            beats: BeatDetector::new(config.beat.clone()),
            silent_frequency: vec![0; fallback_len],
            silent_time_domain: vec![SILENT_SAMPLE; fallback_len],
            last_tick: None,
            nominal_frame_ms: config.beat.nominal_frame_ms,
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn buffer(&self) -> Option<&PcmBuffer> {
        self.buffer.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    pub fn duration(&self) -> Option<f64> {
        self.clock.duration()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.clock.state()
    }

    pub fn beat_detector(&self) -> &BeatDetector {
        &self.beats
    }

    /// Decodes `bytes` and makes the result the current track. Any previous
    /// track is dropped first, so a decode failure leaves nothing loaded.
    pub fn load(&mut self, bytes: &[u8], decoder: &impl Decoder) -> Result<()> {
        self.unload();
        let buffer = decoder.decode(bytes).map_err(|err| {
            warn!(%err, "failed to load track");
            err
        })?;
        self.load_buffer(buffer)
    }

    pub fn load_buffer(&mut self, buffer: PcmBuffer) -> Result<()> {
        self.unload();
        let duration = buffer.duration_seconds();
        if !duration.is_finite() {
            return Err(PulseError::InvalidInput("track duration is not finite"));
        }

        self.clock.load(duration);
        self.buffer = Some(Arc::new(buffer));
        info!(duration, "track loaded");
        Ok(())
    }

    /// Stops playback and forgets the current track.
    pub fn unload(&mut self) {
        if self.clock.is_playing() {
            self.device.stop();
        }
        if self.buffer.take().is_some() {
            debug!("track unloaded");
        }
        self.clock.unload();
        self.beats.reset();
        self.last_tick = None;
    }

    /// Starts playback at `from` (clamped to the track), replacing a running
    /// segment. A device failure leaves the session exactly as it was.
    pub fn play(&mut self, from: f64) -> Result<f64> {
        let buffer = self.buffer.clone().ok_or(PulseError::NoBufferLoaded)?;
        let offset = self.clock.clamp_offset(from)?;

        if let Err(err) = self.device.start(buffer, offset) {
            warn!(%err, offset, "output device refused to start");
            return Err(err);
        }
        self.sync_snapshot_lengths();
        let now = self.wall_clock.now_seconds();
        self.clock.play(offset, now)
    }

    /// Resumes from the paused offset.
    pub fn resume(&mut self) -> Result<f64> {
        let offset = self.current_offset().ok_or(PulseError::NoBufferLoaded)?;
        self.play(offset)
    }

    /// Freezes the clock, then stops the device. Beat history starts over on
    /// the next play.
    pub fn pause(&mut self) -> Result<f64> {
        let now = self.wall_clock.now_seconds();
        let was_playing = self.clock.is_playing();
        let offset = self.clock.pause(now)?;
        if was_playing {
            self.device.stop();
        }
        self.beats.reset();
        Ok(offset)
    }

    /// Moves playback to `target`. While playing the device is restarted at
    /// the new offset; if that fails the session is left paused where it was.
    pub fn seek(&mut self, target: f64) -> Result<f64> {
        let now = self.wall_clock.now_seconds();
        let target = self.clock.clamp_offset(target)?;
        if !self.clock.is_playing() {
            return self.clock.seek(target, now);
        }

        let buffer = self.buffer.clone().ok_or(PulseError::NoBufferLoaded)?;
        let previous = self.clock.pause(now)?;
        self.device.stop();
        if let Err(err) = self.device.start(buffer, target) {
            warn!(%err, previous, target, "output device failed to restart after seek");
            self.beats.reset();
            return Err(err);
        }
        self.sync_snapshot_lengths();
        let now = self.wall_clock.now_seconds();
        self.clock.play(target, now)
    }

    pub fn current_offset(&self) -> Option<f64> {
        self.clock.current_offset(self.wall_clock.now_seconds())
    }

    /// Runs one frame of the pipeline: completion handling, clock read,
    /// snapshot reads, band extraction and beat detection, in that order.
    pub fn tick(&mut self) -> Tick<'_> {
        let now = self.wall_clock.now_seconds();
        let elapsed_ms = match self.last_tick {
            Some(previous) => ((now - previous) * 1_000.0).max(0.0),
            None => self.nominal_frame_ms,
        };
        self.last_tick = Some(now);

        self.handle_completion(now);
        let offset_seconds = self.clock.current_offset(now);

        if !self.clock.is_playing() && !self.frequency.is_empty() {
            // Idle ticks keep the device's snapshot lengths.
            self.frequency.fill(0);
            self.time_domain.fill(SILENT_SAMPLE);
            return Tick {
                offset_seconds,
                elapsed_ms,
                features: FeatureRecord::silent(&self.frequency, &self.time_domain),
            };
        }
        if !self.clock.is_playing() || !self.read_snapshots() {
            return Tick {
                offset_seconds,
                elapsed_ms,
                features: FeatureRecord::silent(
                    &self.silent_frequency,
                    &self.silent_time_domain,
                ),
            };
        }

        let bands = self.extractor.extract(&self.frequency);
        let is_beat = self.beats.update(bands.energy, bands.bass, now * 1_000.0);

        Tick {
            offset_seconds,
            elapsed_ms,
            features: FeatureRecord::from_bands(
                &bands,
                is_beat,
                &self.frequency,
                &self.time_domain,
            ),
        }
    }

    fn handle_completion(&mut self, now: f64) {
        let Some(completion) = self.device.poll_completion() else {
            return;
        };
        let reason = match completion {
            Completion::Reported(reason) => reason,
            Completion::Unclassified => self.clock.classify_completion(now),
        };

        match reason {
            StopReason::NaturallyEnded if self.clock.is_playing() => {
                self.clock.finish();
                self.beats.reset();
                info!("track played to the end");
            }
            _ => debug!(?reason, "ignoring output completion"),
        }
    }

    /// Returns false when the snapshots are unusable for this tick.
    fn read_snapshots(&mut self) -> bool {
        if self.frequency.is_empty() {
            return false;
        }
        let read = self
            .device
            .read_frequency(&mut self.frequency)
            .and_then(|()| self.device.read_time_domain(&mut self.time_domain));
        match read {
            Ok(()) => true,
            Err(err) => {
                debug!(%err, "snapshot read failed");
                false
            }
        }
    }

    fn sync_snapshot_lengths(&mut self) {
        self.frequency.resize(self.device.frequency_bin_count(), 0);
        self.time_domain
            .resize(self.device.time_domain_len(), SILENT_SAMPLE);
    }
}
