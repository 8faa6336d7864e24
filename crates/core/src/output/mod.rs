use std::sync::Arc;

use tracing::debug;

use crate::{
    AnalyserConfig, Completion, PcmBuffer, PulseError, Result, SpectrumAnalyser, StopReason,
    WallClock,
};

/// Audio output plus analysis tap driven by the engine.
///
/// Calls must not block. Snapshot lengths have to stay the same for the life
/// of the device.
pub trait OutputDevice {
    /// Begins rendering `buffer` from `offset_seconds`, replacing any running
    /// segment.
    fn start(&mut self, buffer: Arc<PcmBuffer>, offset_seconds: f64) -> Result<()>;

    /// Stops on request. A stopped segment must not later report a natural end.
    fn stop(&mut self);

    fn frequency_bin_count(&self) -> usize;

    fn time_domain_len(&self) -> usize;

    fn read_frequency(&mut self, out: &mut [u8]) -> Result<()>;

    fn read_time_domain(&mut self, out: &mut [u8]) -> Result<()>;

    /// Returns the pending completion notification, at most once per segment.
    fn poll_completion(&mut self) -> Option<Completion>;
}

#[derive(Debug)]
struct Segment {
    buffer: Arc<PcmBuffer>,
    start_offset: f64,
    started_at: f64,
}

/// Output that "plays" against a wall clock without touching audio hardware.
/// Snapshots come from a [`SpectrumAnalyser`] looking at the frames just
/// before the virtual playhead.
#[derive(Debug)]
pub struct OfflineOutput<C: WallClock> {
    clock: C,
    analyser: SpectrumAnalyser,
    segment: Option<Segment>,
}

impl<C: WallClock> OfflineOutput<C> {
    pub fn new(clock: C, config: AnalyserConfig) -> Result<Self> {
        Ok(Self {
            clock,
            analyser: SpectrumAnalyser::new(config)?,
            segment: None,
        })
    }

    pub fn is_running(&self) -> bool {
        self.segment.is_some()
    }

    /// Virtual playhead of the running segment.
    pub fn position_seconds(&self) -> Option<f64> {
        self.segment.as_ref().map(|segment| self.position_of(segment))
    }

    fn position_of(&self, segment: &Segment) -> f64 {
        let elapsed = (self.clock.now_seconds() - segment.started_at).max(0.0);
        (segment.start_offset + elapsed).min(segment.buffer.duration_seconds())
    }

    fn load_current_window(&mut self) -> Result<()> {
        let segment = self
            .segment
            .as_ref()
            .ok_or_else(|| PulseError::device("output is not running"))?;
        let end_frame = segment.buffer.frame_at(self.position_of(segment));
        self.analyser.load_window(&segment.buffer, end_frame);
        Ok(())
    }
}

impl<C: WallClock> OutputDevice for OfflineOutput<C> {
    fn start(&mut self, buffer: Arc<PcmBuffer>, offset_seconds: f64) -> Result<()> {
        let start_offset = offset_seconds.clamp(0.0, buffer.duration_seconds());
        self.analyser.reset();
        self.segment = Some(Segment {
            buffer,
            start_offset,
            started_at: self.clock.now_seconds(),
        });
        debug!(offset = start_offset, "offline output started");
        Ok(())
    }

    fn stop(&mut self) {
        if self.segment.take().is_some() {
            debug!("offline output stopped");
        }
    }

    fn frequency_bin_count(&self) -> usize {
        self.analyser.bin_count()
    }

    fn time_domain_len(&self) -> usize {
        self.analyser.fft_size()
    }

    fn read_frequency(&mut self, out: &mut [u8]) -> Result<()> {
        self.load_current_window()?;
        self.analyser.byte_frequency_data(out)
    }

    fn read_time_domain(&mut self, out: &mut [u8]) -> Result<()> {
        self.load_current_window()?;
        self.analyser.byte_time_domain_data(out);
        Ok(())
    }

    fn poll_completion(&mut self) -> Option<Completion> {
        let segment = self.segment.as_ref()?;
        if self.position_of(segment) < segment.buffer.duration_seconds() {
            return None;
        }
        self.segment = None;
        debug!("offline output reached end of buffer");
        Some(Completion::Reported(StopReason::NaturallyEnded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;

    fn tone_buffer(seconds: f64) -> Arc<PcmBuffer> {
        let sample_rate = 8_000;
        let frames = (seconds * sample_rate as f64) as usize;
        let samples = (0..frames)
            .map(|n| (n as f32 * 0.3).sin() * 0.8)
            .collect();
        Arc::new(PcmBuffer::from_mono(sample_rate, samples).unwrap())
    }

    fn output(clock: &ManualClock) -> OfflineOutput<ManualClock> {
        OfflineOutput::new(clock.clone(), AnalyserConfig::default()).unwrap()
    }

    #[test]
    fn reports_natural_end_once() {
        let clock = ManualClock::new();
        let mut output = output(&clock);
        output.start(tone_buffer(1.0), 0.5).unwrap();

        clock.advance(0.4);
        assert_eq!(output.poll_completion(), None);

        clock.advance(0.2);
        assert_eq!(
            output.poll_completion(),
            Some(Completion::Reported(StopReason::NaturallyEnded))
        );
        assert_eq!(output.poll_completion(), None);
        assert!(!output.is_running());
    }

    #[test]
    fn stopped_output_never_completes() {
        let clock = ManualClock::new();
        let mut output = output(&clock);
        output.start(tone_buffer(1.0), 0.0).unwrap();
        output.stop();

        clock.advance(5.0);
        assert_eq!(output.poll_completion(), None);
        let mut bins = vec![0u8; output.frequency_bin_count()];
        assert!(output.read_frequency(&mut bins).is_err());
    }

    #[test]
    fn snapshots_follow_the_playhead() {
        let clock = ManualClock::new();
        let mut output = output(&clock);
        let mut bins = vec![0u8; output.frequency_bin_count()];
        let mut wave = vec![0u8; output.time_domain_len()];

        output.start(tone_buffer(2.0), 0.0).unwrap();
        output.read_frequency(&mut bins).unwrap();
        output.read_time_domain(&mut wave).unwrap();
        assert!(bins.iter().all(|&bin| bin == 0));
        assert!(wave.iter().all(|&sample| sample == 128));

        clock.advance(0.5);
        assert_eq!(output.position_seconds(), Some(0.5));
        output.read_frequency(&mut bins).unwrap();
        output.read_time_domain(&mut wave).unwrap();
        assert!(bins.iter().any(|&bin| bin > 0));
        assert!(wave.iter().any(|&sample| sample != 128));
    }
}
