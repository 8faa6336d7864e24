use std::fmt;

use crate::{Result, Tick};

/// Receives the per-tick feature record. Consumers get read-only access and
/// must copy anything they want to keep past the call.
pub trait FeatureConsumer {
    fn consume(&mut self, tick: &Tick<'_>) -> Result<()>;
}

impl<F> FeatureConsumer for F
where
    F: FnMut(&Tick<'_>) -> Result<()>,
{
    fn consume(&mut self, tick: &Tick<'_>) -> Result<()> {
        self(tick)
    }
}

/// Fans each tick out to every registered consumer in registration order.
#[derive(Default)]
pub struct RenderGraph {
    consumers: Vec<Box<dyn FeatureConsumer>>,
    dispatched: u64,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, consumer: impl FeatureConsumer + 'static) {
        self.consumers.push(Box::new(consumer));
    }

    pub fn register_fn<F>(&mut self, consumer: F)
    where
        F: FnMut(&Tick<'_>) -> Result<()> + 'static,
    {
        self.consumers.push(Box::new(consumer));
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    /// Number of ticks handed out so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Stops at the first consumer error.
    pub fn dispatch(&mut self, tick: &Tick<'_>) -> Result<()> {
        for consumer in &mut self.consumers {
            consumer.consume(tick)?;
        }
        self.dispatched += 1;
        Ok(())
    }
}

impl fmt::Debug for RenderGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderGraph")
            .field("consumers", &self.consumers.len())
            .field("dispatched", &self.dispatched)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{FeatureRecord, FeatureSummary, PulseError};

    fn tick<'a>(bins: &'a [u8], wave: &'a [u8], is_beat: bool) -> Tick<'a> {
        let mut features = FeatureRecord::silent(bins, wave);
        features.is_beat = is_beat;
        features.volume = 0.5;
        Tick {
            offset_seconds: Some(1.0),
            elapsed_ms: 16.0,
            features,
        }
    }

    #[test]
    fn dispatches_to_every_consumer_in_order() {
        let seen: Rc<RefCell<Vec<(&'static str, FeatureSummary)>>> = Rc::default();
        let mut graph = RenderGraph::new();
        for name in ["first", "second"] {
            let seen = Rc::clone(&seen);
            graph.register_fn(move |tick| {
                seen.borrow_mut().push((name, tick.features.summary()));
                Ok(())
            });
        }

        let bins = [0u8; 4];
        let wave = [128u8; 4];
        graph.dispatch(&tick(&bins, &wave, true)).unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "first");
        assert_eq!(seen[1].0, "second");
        assert!(seen[1].1.is_beat);
        assert_eq!(graph.dispatched(), 1);
    }

    #[test]
    fn stops_at_first_error() {
        let calls = Rc::new(RefCell::new(0));
        let mut graph = RenderGraph::new();
        graph.register_fn(|_| Err(PulseError::msg("renderer lost")));
        let counter = Rc::clone(&calls);
        graph.register_fn(move |_| {
            *counter.borrow_mut() += 1;
            Ok(())
        });

        let bins = [0u8; 4];
        let wave = [128u8; 4];
        assert!(graph.dispatch(&tick(&bins, &wave, false)).is_err());
        assert_eq!(*calls.borrow(), 0);
        assert_eq!(graph.dispatched(), 0);
    }
}
