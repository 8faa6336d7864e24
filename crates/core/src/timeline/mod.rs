use std::{cell::Cell, rc::Rc, time::Instant};

use tracing::debug;

use crate::{PulseError, Result};

/// Source of wall-clock time for the playback clock and beat detector.
pub trait WallClock {
    /// Seconds on a monotonic timeline with an arbitrary origin.
    fn now_seconds(&self) -> f64;
}

/// Monotonic clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for SystemClock {
    fn now_seconds(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Clock that only moves when told to. Clones share the same time, so a
/// driver can hand one copy to the engine and advance another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(seconds: f64) -> Self {
        let clock = Self::new();
        clock.set(seconds);
        clock
    }

    pub fn set(&self, seconds: f64) {
        self.now.set(seconds);
    }

    pub fn advance(&self, delta_seconds: f64) {
        self.now.set(self.now.get() + delta_seconds);
    }
}

impl WallClock for ManualClock {
    fn now_seconds(&self) -> f64 {
        self.now.get()
    }
}

/// Why the output primitive stopped rendering a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The buffer was rendered to its end.
    NaturallyEnded,
    /// Rendering was stopped on request.
    Interrupted,
}

/// Completion notification raised by an output primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Reported(StopReason),
    /// The primitive cannot tell a natural end from a stop; the clock decides
    /// from elapsed time.
    Unclassified,
}

/// Mutable playback record. When `is_playing` is false the current offset is
/// exactly `paused_offset_seconds`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub paused_offset_seconds: f64,
    pub resumed_at_seconds: f64,
}

/// Maps the track timeline onto wall-clock time across play, pause and seek.
///
/// The clock never reads time itself: every operation takes `now` from the
/// caller, which keeps all reads within a tick consistent.
#[derive(Debug, Clone, Default)]
pub struct PlaybackClock {
    duration: Option<f64>,
    state: PlaybackState,
    end_tolerance: f64,
}

impl PlaybackClock {
    pub fn new(end_tolerance_seconds: f64) -> Self {
        Self {
            duration: None,
            state: PlaybackState::default(),
            end_tolerance: end_tolerance_seconds.max(0.0),
        }
    }

    /// Starts a fresh timeline for a track, paused at offset zero.
    pub fn load(&mut self, duration_seconds: f64) {
        self.duration = Some(duration_seconds.max(0.0));
        self.state = PlaybackState::default();
    }

    pub fn unload(&mut self) {
        self.duration = None;
        self.state = PlaybackState::default();
    }

    pub fn is_loaded(&self) -> bool {
        self.duration.is_some()
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Clamps an offset into `[0, duration]`. NaN maps to the start.
    pub fn clamp_offset(&self, offset: f64) -> Result<f64> {
        let duration = self.duration.ok_or(PulseError::NoBufferLoaded)?;
        if offset.is_nan() {
            return Ok(0.0);
        }
        Ok(offset.clamp(0.0, duration))
    }

    pub fn play(&mut self, from: f64, now: f64) -> Result<f64> {
        let from = self.clamp_offset(from)?;
        self.state = PlaybackState {
            is_playing: true,
            paused_offset_seconds: from,
            resumed_at_seconds: now,
        };
        debug!(offset = from, "clock playing");
        Ok(from)
    }

    /// Freezes the timeline at the current offset and returns it.
    pub fn pause(&mut self, now: f64) -> Result<f64> {
        let offset = self.current_offset(now).ok_or(PulseError::NoBufferLoaded)?;
        self.state.paused_offset_seconds = offset;
        self.state.is_playing = false;
        debug!(offset, "clock paused");
        Ok(offset)
    }

    /// Moves the timeline to `target`. A playing clock keeps playing from the
    /// new offset.
    pub fn seek(&mut self, target: f64, now: f64) -> Result<f64> {
        let target = self.clamp_offset(target)?;
        self.state.paused_offset_seconds = target;
        if self.state.is_playing {
            self.state.resumed_at_seconds = now;
        }
        debug!(offset = target, playing = self.state.is_playing, "clock seek");
        Ok(target)
    }

    /// The track played out: rewind to the start and stop.
    pub fn finish(&mut self) {
        if self.duration.is_some() {
            self.state = PlaybackState::default();
            debug!("clock reached natural end");
        }
    }

    pub fn current_offset(&self, now: f64) -> Option<f64> {
        let duration = self.duration?;
        if !self.state.is_playing {
            return Some(self.state.paused_offset_seconds);
        }
        Some(self.raw_offset(now).clamp(0.0, duration))
    }

    /// Decides whether an unclassified completion was the track running out.
    pub fn classify_completion(&self, now: f64) -> StopReason {
        match self.duration {
            Some(duration)
                if self.state.is_playing && self.raw_offset(now) >= duration - self.end_tolerance =>
            {
                StopReason::NaturallyEnded
            }
            _ => StopReason::Interrupted,
        }
    }

    fn raw_offset(&self, now: f64) -> f64 {
        let elapsed = now - self.state.resumed_at_seconds;
        let elapsed = if elapsed.is_finite() { elapsed.max(0.0) } else { 0.0 };
        elapsed + self.state.paused_offset_seconds
    }
}
