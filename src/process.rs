use crate::beat::{Beat, BeatDetector, Tick};
use crate::config::Config;
use crate::decoder::Sample;
use crate::error::Result;
use crate::filter::BandPass;
use crate::queue::{IntakeQueue, Popped};
use crate::rate::RateEstimator;

/// What the pipeline hands to the rendering side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    Beat { beat: Beat, bpm: Option<u32> },
    Overrun { discarded: usize },
}

/// Filter, detector and rate estimator for one session, driven one sample
/// per tick.
pub struct Pipeline<D: BeatDetector> {
    config: Config,
    filter: BandPass,
    detector: D,
    state: Option<D::State>,
    rate: RateEstimator,
    position: u64,
    filtered: f32,
}

impl<D: BeatDetector> Pipeline<D> {
    pub fn new(config: &Config, detector: D) -> Result<Self> {
        config.validate()?;
        let state = detector.start();
        Ok(Pipeline {
            config: config.clone(),
            filter: BandPass::from_config(config)?,
            rate: RateEstimator::new(config.sample_rate, config.smoothing_ratio),
            detector: detector,
            state: Some(state),
            position: 0,
            filtered: 0.0,
        })
    }

    /// One scheduler tick: overflow check, then at most one sample.
    pub fn tick(&mut self, queue: &IntakeQueue) -> Vec<Event> {
        match queue.tick() {
            Popped::Sample(sample) => self.process(sample),
            Popped::Empty => vec![],
            Popped::Overrun { discarded } => {
                warn!(
                    "intake overrun, dropped {} queued samples (capacity {})",
                    discarded,
                    queue.capacity()
                );
                vec![Event::Overrun {
                    discarded: discarded,
                }]
            }
        }
    }

    pub fn process(&mut self, sample: Sample) -> Vec<Event> {
        self.filtered = self.filter.single_step(sample.value);
        let tick = Tick {
            position: self.position,
            sample: sample,
            filtered: self.filtered,
        };
        self.position += 1;

        let state = self
            .state
            .take()
            .expect("detector state is only missing while a tick is in flight");
        let (state, beats) = self.detector.detect(state, &tick);
        self.state = Some(state);

        beats
            .into_iter()
            .map(|beat| {
                let bpm = self.rate.beat(beat.timestamp);
                debug!(
                    "beat at {} (ts {}), bpm {:?}",
                    beat.position, beat.timestamp, bpm
                );
                Event::Beat {
                    beat: beat,
                    bpm: bpm,
                }
            })
            .collect()
    }

    /// Drops all session state, as if the pipeline had just been built.
    pub fn restart(&mut self) {
        self.filter.reset();
        self.state = Some(self.detector.start());
        self.rate = RateEstimator::new(self.config.sample_rate, self.config.smoothing_ratio);
        self.position = 0;
        self.filtered = 0.0;
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Live filter output of the last processed sample.
    pub fn filtered(&self) -> f32 {
        self.filtered
    }

    pub fn bpm(&self) -> Option<u32> {
        self.rate.bpm()
    }
}
