use std::collections::VecDeque;

use crate::config::{Config, DetectorKind};
use crate::decoder::Sample;
use crate::dual_slope::{DualSlope, DualSlopeState};
use crate::error::Result;
use crate::filter::BandPass;

/// Everything a detector gets to see for one tick.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Tick {
    /// Number of samples consumed in this session before this one.
    pub position: u64,
    pub sample: Sample,
    /// Output of the live band-pass for `sample`.
    pub filtered: f32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Beat {
    pub position: u64,
    pub timestamp: u32,
}

impl Beat {
    /// Slot of this beat in a display ring of `len` points.
    pub fn slot(&self, len: usize) -> usize {
        assert!(len != 0);
        (self.position % len as u64) as usize
    }
}

/// A beat detection strategy. The detector itself only holds tuning; all
/// mutable state is threaded through `detect` so a session restart is just
/// a fresh `start()`.
pub trait BeatDetector {
    type State;

    fn start(&self) -> Self::State;

    // feed one tick into the detector and return the beats it confirmed
    fn detect(&self, state: Self::State, incoming: &Tick) -> (Self::State, Vec<Beat>);
}

/// Windowed adaptive threshold with a rising edge refractory filter.
pub struct ThresholdDetector {
    band_pass: BandPass,
    window_size: usize,
    refractory: usize,
    ratio: f32,
    floor: f32,
}

#[derive(Clone, Debug)]
pub struct ThresholdState {
    window: VecDeque<f32>,
    rising_edge: VecDeque<bool>,
}

impl ThresholdDetector {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(ThresholdDetector {
            band_pass: BandPass::from_config(config)?,
            window_size: config.window_size,
            refractory: config.refractory,
            ratio: config.threshold_ratio,
            floor: config.amplitude_floor,
        })
    }

    fn window_max(&self, state: &ThresholdState) -> Option<f32> {
        if state.window.len() < self.window_size {
            return None;
        }
        let max = self
            .band_pass
            .multi_step(state.window.iter().cloned())
            .into_iter()
            .fold(std::f32::NEG_INFINITY, f32::max);
        if max > self.floor {
            Some(max)
        } else {
            None
        }
    }
}

impl BeatDetector for ThresholdDetector {
    type State = ThresholdState;

    fn start(&self) -> ThresholdState {
        ThresholdState {
            window: VecDeque::with_capacity(self.window_size + 1),
            rising_edge: std::iter::repeat(false).take(self.refractory).collect(),
        }
    }

    fn detect(&self, mut state: ThresholdState, incoming: &Tick) -> (ThresholdState, Vec<Beat>) {
        state.window.push_back(incoming.sample.value);
        if state.window.len() > self.window_size {
            state.window.pop_front();
        }

        let candidate = match self.window_max(&state) {
            Some(max) => incoming.filtered >= max * self.ratio,
            None => false,
        };

        // only the first candidate after a quiet refractory period counts
        let quiet = state.rising_edge.iter().all(|c| !c);
        if self.refractory != 0 {
            state.rising_edge.pop_front();
            state.rising_edge.push_back(candidate);
        }

        let beats = if candidate && quiet {
            vec![Beat {
                position: incoming.position,
                timestamp: incoming.sample.timestamp,
            }]
        } else {
            vec![]
        };
        (state, beats)
    }
}

/// Detector picked at runtime from `Config::detector`.
pub enum Strategy {
    Threshold(ThresholdDetector),
    DualSlope(DualSlope),
}

pub enum StrategyState {
    Threshold(ThresholdState),
    DualSlope(DualSlopeState),
}

impl Strategy {
    pub fn from_config(config: &Config) -> Result<Strategy> {
        Ok(match config.detector {
            DetectorKind::Threshold => Strategy::Threshold(ThresholdDetector::new(config)?),
            DetectorKind::DualSlope => Strategy::DualSlope(DualSlope::new(config)),
        })
    }
}

impl BeatDetector for Strategy {
    type State = StrategyState;

    fn start(&self) -> StrategyState {
        match *self {
            Strategy::Threshold(ref d) => StrategyState::Threshold(d.start()),
            Strategy::DualSlope(ref d) => StrategyState::DualSlope(d.start()),
        }
    }

    fn detect(&self, state: StrategyState, incoming: &Tick) -> (StrategyState, Vec<Beat>) {
        match (self, state) {
            (&Strategy::Threshold(ref d), StrategyState::Threshold(s)) => {
                let (s, beats) = d.detect(s, incoming);
                (StrategyState::Threshold(s), beats)
            }
            (&Strategy::DualSlope(ref d), StrategyState::DualSlope(s)) => {
                let (s, beats) = d.detect(s, incoming);
                (StrategyState::DualSlope(s), beats)
            }
            _ => panic!("detector state does not belong to this strategy"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop, prop_assert, proptest, ProptestConfig};

    fn config() -> Config {
        Config::with_sample_rate(360.0)
    }

    fn run<D: BeatDetector>(detector: &D, signal: &[f32]) -> Vec<Beat> {
        let mut filter = BandPass::from_config(&config()).unwrap();
        let mut state = detector.start();
        let mut beats = vec![];
        for (i, v) in signal.iter().enumerate() {
            let tick = Tick {
                position: i as u64,
                sample: Sample::new(i as u32, *v),
                filtered: filter.single_step(*v),
            };
            let (next, mut found) = detector.detect(state, &tick);
            state = next;
            beats.append(&mut found);
        }
        beats
    }

    fn impulse_train(n: usize, period: usize, offset: usize) -> Vec<f32> {
        (0..n)
            .map(|i| if i >= offset && (i - offset) % period == 0 { 1.0 } else { 0.0 })
            .collect()
    }

    #[test]
    fn test_beats_follow_impulses() {
        let detector = ThresholdDetector::new(&config()).unwrap();
        let beats = run(&detector, &impulse_train(3600, 72, 10));

        // every spike once the window is full, 22 ticks of filter delay late
        let expected: Vec<u64> = (5..50u64).map(|k| 10 + 72 * k + 22).collect();
        let found: Vec<u64> = beats.iter().map(|b| b.position).collect();
        assert_eq!(found.len(), 45);
        assert_eq!(found, expected);
    }

    #[test]
    fn test_flat_signal_has_no_beats() {
        let detector = ThresholdDetector::new(&config()).unwrap();
        assert!(run(&detector, &vec![0.0; 2000]).is_empty());
    }

    #[test]
    fn test_noise_below_floor_has_no_beats() {
        let mut cfg = config();
        cfg.amplitude_floor = 0.05;
        let detector = ThresholdDetector::new(&cfg).unwrap();
        // deterministic pseudo noise, amplitude 0.01
        let noise: Vec<f32> = (0..3000u32)
            .map(|i| ((i.wrapping_mul(2_654_435_761) >> 16) as f32 / 65536.0 - 0.5) * 0.02)
            .collect();
        assert!(run(&detector, &noise).is_empty());
    }

    #[test]
    fn test_fresh_start_forgets_history() {
        let detector = ThresholdDetector::new(&config()).unwrap();
        let signal = impulse_train(1200, 72, 10);
        let first = run(&detector, &signal);
        let second = run(&detector, &signal);
        assert_eq!(first, second);
    }

    #[test]
    fn test_slot_wraps() {
        let beat = Beat {
            position: 1234,
            timestamp: 99,
        };
        assert_eq!(beat.slot(100), 34);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_refractory_spacing(signal in prop::collection::vec(-1.0f32..1.0, 400..1200)) {
            let mut cfg = config();
            cfg.window_size = 50;
            cfg.refractory = 20;
            let detector = ThresholdDetector::new(&cfg).unwrap();
            let beats = run(&detector, &signal);
            for pair in beats.windows(2) {
                prop_assert!(pair[1].position - pair[0].position > 20);
            }
        }
    }
}
