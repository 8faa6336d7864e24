use tracing::trace;

use crate::BeatConfig;

/// Fixed-capacity FIFO of recent energy values. Pushing past capacity evicts
/// the oldest entry.
#[derive(Debug, Clone)]
pub struct EnergyHistory {
    slots: Vec<f64>,
    write: usize,
    len: usize,
}

impl EnergyHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![0.0; capacity.max(1)],
            write: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, value: f64) {
        let capacity = self.slots.len();
        self.slots[self.write] = value;
        self.write = (self.write + 1) % capacity;
        if self.len < capacity {
            self.len += 1;
        }
    }

    pub fn mean(&self) -> Option<f64> {
        if self.len == 0 {
            return None;
        }
        Some(self.iter().sum::<f64>() / self.len as f64)
    }

    /// Values from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        let capacity = self.slots.len();
        let start = (self.write + capacity - self.len) % capacity;
        (0..self.len).map(move |i| self.slots[(start + i) % capacity])
    }

    pub fn clear(&mut self) {
        self.write = 0;
        self.len = 0;
    }
}

/// Flags energy spikes that rise above a bass-weighted rolling average, with a
/// cooldown between consecutive beats.
#[derive(Debug, Clone)]
pub struct BeatDetector {
    config: BeatConfig,
    history: EnergyHistory,
    since_last_beat_ms: f64,
    last_tick_ms: Option<f64>,
}

impl BeatDetector {
    pub fn new(config: BeatConfig) -> Self {
        Self {
            history: EnergyHistory::new(config.history_len),
            config,
            since_last_beat_ms: 0.0,
            last_tick_ms: None,
        }
    }

    pub fn history(&self) -> &EnergyHistory {
        &self.history
    }

    pub fn since_last_beat_ms(&self) -> f64 {
        self.since_last_beat_ms
    }

    /// Multiplier over the average energy a spike must exceed. Louder bass
    /// raises the bar.
    pub fn dynamic_threshold(&self, bass: f32) -> f64 {
        let bass = if bass.is_finite() {
            f64::from(bass.clamp(0.0, 1.0))
        } else {
            0.0
        };
        self.config.base_threshold * (self.config.bass_floor + self.config.bass_weight * bass)
    }

    /// Consumes one tick of energy and reports whether it is a beat.
    pub fn update(&mut self, energy: f64, bass: f32, now_ms: f64) -> bool {
        let elapsed_ms = match self.last_tick_ms {
            Some(previous) if now_ms.is_finite() => (now_ms - previous).max(0.0),
            _ => self.config.nominal_frame_ms,
        };
        if now_ms.is_finite() {
            self.last_tick_ms = Some(now_ms);
        }
        self.since_last_beat_ms += elapsed_ms;

        if !energy.is_finite() || energy < 0.0 {
            trace!(energy, "ignoring unusable energy value");
            return false;
        }

        let mut is_beat = false;
        if let Some(average) = self.history.mean() {
            let threshold = average * self.dynamic_threshold(bass) + self.config.epsilon;
            if energy > threshold && self.since_last_beat_ms > self.config.cooldown_ms {
                trace!(energy, threshold, "beat");
                self.since_last_beat_ms = 0.0;
                is_beat = true;
            }
        }

        self.history.push(energy);
        is_beat
    }

    /// Forgets history and timing, as on a new track or a pause.
    pub fn reset(&mut self) {
        self.history.clear();
        self.since_last_beat_ms = 0.0;
        self.last_tick_ms = None;
    }
}

impl Default for BeatDetector {
    fn default() -> Self {
        Self::new(BeatConfig::default())
    }
}
