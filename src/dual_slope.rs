//! Multi-scale dual-slope QRS detection.
//!
//! For every index the steepest and flattest slopes towards samples 27 to
//! 63 ms to the left and to the right are compared. A QRS complex shows up as
//! a steep rise on one side and a steep fall on the other. The detector needs
//! samples after the candidate, so it is naturally a batch algorithm; the
//! streaming form runs it `h_range` samples behind the live tick and reports
//! a prefix of what the batch form finds over the same input.

use std::collections::VecDeque;

use crate::beat::{Beat, BeatDetector, Tick};
use crate::config::Config;
use crate::decoder::Sample;
use crate::stats::{RollingMean, Smoothed};

const SHORT_SCALE_SECS: f32 = 0.027;
const LONG_SCALE_SECS: f32 = 0.063;

// Slope limits in units of full_scale / sample_rate.
const INITIAL_DIFF_THRESHOLD: f32 = 2.125;
const INITIAL_AVERAGE_DIFF: f32 = 8.125;
const AVERAGE_UPPER_LIMIT: f32 = 10.0;
const AVERAGE_LOWER_LIMIT: f32 = 5.0;
const SLOPE_LOWER_LIMIT: f32 = 0.75;
const HIGH_DIFF_THRESHOLD: f32 = 3.75;
const MID_DIFF_THRESHOLD: f32 = 2.125;
const LOW_DIFF_THRESHOLD: f32 = 1.875;

pub struct DualSlope {
    sample_rate: f32,
    full_scale: f32,
    l_range: usize,
    h_range: usize,
    min_index_delta: f64,
    peak_gate: f32,
    initial_peak: f32,
    history: usize,
}

#[derive(Clone, Debug)]
pub struct DualSlopeState {
    diff_threshold: f32,
    recent_diff: Smoothed<RollingMean>,
    recent_peak: Smoothed<RollingMean>,
    last_index: u64,
    buffer: VecDeque<Sample>,
    pending: Option<Beat>,
}

impl DualSlopeState {
    pub fn diff_threshold(&self) -> f32 {
        self.diff_threshold
    }

    pub fn average_peak(&self) -> f32 {
        self.recent_peak.value().unwrap_or(0.0)
    }
}

/// An accepted candidate: index of the refined peak and whether it
/// supersedes the previous detection.
#[derive(Copy, Clone, Debug, PartialEq)]
struct Detection {
    peak: usize,
    replaces: bool,
}

#[derive(Default)]
struct Slopes {
    max: Option<f32>,
    min: Option<f32>,
}

impl Slopes {
    fn add(&mut self, slope: f32) {
        self.max = Some(self.max.map_or(slope, |m| f32::max(m, slope)));
        self.min = Some(self.min.map_or(slope, |m| f32::min(m, slope)));
    }
}

// slopes of matching sign and at least `limit` steep
fn same_sign_above(a: f32, b: f32, limit: f32) -> bool {
    f32::min(a.abs(), b.abs()) > limit && (a > 0.0) == (b > 0.0)
}

impl DualSlope {
    pub fn new(config: &Config) -> Self {
        let fs = config.sample_rate;
        assert!(fs > 0.0);
        let ds = &config.dual_slope;
        DualSlope {
            sample_rate: fs,
            full_scale: ds.full_scale,
            l_range: (SHORT_SCALE_SECS * fs).floor() as usize,
            h_range: (LONG_SCALE_SECS * fs).floor() as usize,
            min_index_delta: (ds.min_spacing_secs * fs) as f64,
            peak_gate: ds.peak_gate,
            initial_peak: ds.initial_peak,
            history: ds.history,
        }
    }

    fn scaled(&self, units: f32) -> f32 {
        self.full_scale * units / self.sample_rate
    }

    fn evaluate(&self, state: &mut DualSlopeState, source: &[f32], index: usize, base: u64) -> Option<Detection> {
        let value = source[index] * self.full_scale;
        let mut left = Slopes::default();
        let mut right = Slopes::default();

        // a zero distance carries no slope
        for i in usize::max(self.l_range, 1)..self.h_range {
            let distance = i as f32;
            if let Some(l) = index.checked_sub(i) {
                left.add((value - source[l] * self.full_scale) / distance);
            }
            if let Some(r) = source.get(index + i) {
                right.add((value - r * self.full_scale) / distance);
            }
        }

        let (l_max, l_min, r_max, r_min) = match (left.max, left.min, right.max, right.min) {
            (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
            _ => return None,
        };

        let rising = r_max - l_min;
        let falling = l_max - r_min;
        let diff = f32::max(rising, falling);
        if !(diff > state.diff_threshold) {
            return None;
        }
        let lower = self.scaled(SLOPE_LOWER_LIMIT);
        let shaped = if falling > rising {
            same_sign_above(l_max, r_min, lower)
        } else {
            same_sign_above(r_max, l_min, lower)
        };
        if !shaped {
            return None;
        }

        if !(value > state.average_peak() * self.peak_gate) {
            return None;
        }

        let position = base + index as u64;
        let mut replaces = false;
        if !(position as f64 - state.last_index as f64 > self.min_index_delta) {
            // too close to the previous peak, keep whichever is steeper
            if diff > state.recent_diff.rule().newest().unwrap_or(0.0) {
                replaces = true;
            } else {
                return None;
            }
        }

        // refine to the loudest sample around the candidate
        let from = index.saturating_sub(self.h_range);
        let to = usize::min(index + self.h_range, source.len() - 1);
        let mut peak = index;
        let mut loudest = value.abs();
        for i in from..=to {
            let v = (source[i] * self.full_scale).abs();
            if v > loudest {
                loudest = v;
                peak = i;
            }
        }

        let average_diff = state.recent_diff.push(diff);
        state.diff_threshold = if average_diff > self.scaled(AVERAGE_UPPER_LIMIT) {
            self.scaled(HIGH_DIFF_THRESHOLD)
        } else if average_diff > self.scaled(AVERAGE_LOWER_LIMIT) {
            self.scaled(MID_DIFF_THRESHOLD)
        } else {
            self.scaled(LOW_DIFF_THRESHOLD)
        };
        state.recent_peak.push(loudest);
        state.last_index = base + peak as u64;

        Some(Detection {
            peak: peak,
            replaces: replaces,
        })
    }

    /// Offline detection over a complete recording. Returns the refined peak
    /// indices.
    pub fn detect_batch(&self, source: &[f32]) -> Vec<usize> {
        let mut state = self.start();
        let mut peaks: Vec<usize> = vec![];
        for index in 0..source.len() {
            if let Some(found) = self.evaluate(&mut state, source, index, 0) {
                if found.replaces {
                    peaks.pop();
                }
                peaks.push(found.peak);
            }
        }
        peaks
    }
}

impl BeatDetector for DualSlope {
    type State = DualSlopeState;

    fn start(&self) -> DualSlopeState {
        DualSlopeState {
            diff_threshold: self.scaled(INITIAL_DIFF_THRESHOLD),
            recent_diff: Smoothed::rolling(self.history, self.scaled(INITIAL_AVERAGE_DIFF)),
            recent_peak: Smoothed::rolling(self.history, self.initial_peak),
            last_index: 0,
            buffer: VecDeque::with_capacity(2 * self.h_range + 2),
            pending: None,
        }
    }

    fn detect(&self, mut state: DualSlopeState, incoming: &Tick) -> (DualSlopeState, Vec<Beat>) {
        let span = 2 * self.h_range + 1;
        state.buffer.push_back(incoming.sample);
        if state.buffer.len() > span {
            state.buffer.pop_front();
        }
        let mut beats = vec![];
        if state.buffer.len() <= self.h_range {
            return (state, beats);
        }

        // the centre sits h_range before the live tick, with a shorter left
        // side until the buffer has filled up
        let index = state.buffer.len() - 1 - self.h_range;
        let base = incoming.position + 1 - state.buffer.len() as u64;
        let center = base + index as u64;
        let values: Vec<f32> = state.buffer.iter().map(|s| s.value).collect();

        if let Some(found) = self.evaluate(&mut state, &values, index, base) {
            let beat = Beat {
                position: base + found.peak as u64,
                timestamp: state.buffer[found.peak].timestamp,
            };
            if !found.replaces {
                beats.extend(state.pending.take());
            }
            state.pending = Some(beat);
        }

        // once out of replacement range the pending peak is final
        if state.pending.is_some() && center as f64 - state.last_index as f64 > self.min_index_delta {
            beats.extend(state.pending.take());
        }
        (state, beats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn detector() -> DualSlope {
        DualSlope::new(&Config::with_sample_rate(360.0))
    }

    fn spikes(n: usize, period: usize, offset: usize) -> Vec<f32> {
        (0..n)
            .map(|i| if i >= offset && (i - offset) % period == 0 { 1.0 } else { 0.0 })
            .collect()
    }

    // narrow triangle peaking at offset + 5
    fn qrs_train(n: usize, period: usize, offset: usize) -> Vec<f32> {
        let mut signal = vec![0.0; n];
        let mut start = offset;
        while start < n {
            for k in 0..12 {
                if start + k < n {
                    signal[start + k] = if k < 6 { k as f32 / 5.0 } else { (11 - k) as f32 / 5.0 };
                }
            }
            start += period;
        }
        signal
    }

    fn stream(detector: &DualSlope, source: &[f32]) -> Vec<usize> {
        let mut state = detector.start();
        let mut found = vec![];
        for (i, v) in source.iter().enumerate() {
            let tick = Tick {
                position: i as u64,
                sample: Sample::new(i as u32, *v),
                filtered: 0.0,
            };
            let (next, beats) = detector.detect(state, &tick);
            state = next;
            found.extend(beats.iter().map(|b| b.position as usize));
        }
        found
    }

    #[test]
    fn test_ranges_follow_sample_rate() {
        let d = detector();
        assert_eq!(d.l_range, 9);
        assert_eq!(d.h_range, 22);
        assert!((d.min_index_delta - 72.0).abs() < 1e-3);
    }

    #[test]
    fn test_batch_finds_spikes() {
        let peaks = detector().detect_batch(&spikes(3600, 180, 50));
        let expected: Vec<usize> = (0..20).map(|k| 50 + 180 * k).collect();
        assert_eq!(peaks, expected);
    }

    #[test]
    fn test_batch_refines_to_apex() {
        let peaks = detector().detect_batch(&qrs_train(3600, 288, 100));
        let expected: Vec<usize> = (0..13).map(|k| 105 + 288 * k).collect();
        assert_eq!(peaks, expected);
    }

    #[test]
    fn test_stream_matches_batch_away_from_the_end() {
        let d = detector();
        let signal = qrs_train(3600, 288, 100);
        let batch = d.detect_batch(&signal);
        let live = stream(&d, &signal);
        // the last peak is still pending when the input stops
        assert_eq!(&live[..], &batch[..batch.len() - 1]);
    }

    #[test]
    fn test_quiet_noise_is_ignored() {
        let noise: Vec<f32> = (0..3600u32)
            .map(|i| ((i.wrapping_mul(2_654_435_761) >> 16) as f32 / 65536.0 - 0.5) * 0.002)
            .collect();
        assert!(detector().detect_batch(&noise).is_empty());
        assert!(stream(&detector(), &noise).is_empty());
    }

    #[test]
    fn test_thresholds_adapt_after_peaks() {
        let d = detector();
        let mut state = d.start();
        let initial = state.diff_threshold();
        let signal = spikes(400, 180, 50);
        for index in 0..signal.len() {
            d.evaluate(&mut state, &signal, index, 0);
        }
        assert!(state.diff_threshold() != initial);
        assert!(state.average_peak() > d.initial_peak);
    }

    #[test]
    fn test_tiny_rate_never_detects() {
        // ranges collapse to nothing below ~40 Hz
        let mut config = Config::with_sample_rate(30.0);
        config.low_cut_hz = 1.0;
        config.high_cut_hz = 5.0;
        let d = DualSlope::new(&config);
        assert!(d.detect_batch(&spikes(300, 30, 5)).is_empty());
    }

    #[test]
    fn test_stronger_candidate_replaces_close_one() {
        let mut signal = vec![0.0; 720];
        signal[100] = 0.5;
        signal[140] = 1.0;
        signal[400] = 1.0;
        let d = detector();
        assert_eq!(d.detect_batch(&signal), vec![140, 400]);
        assert_eq!(stream(&d, &signal), vec![140, 400]);
    }

    #[test]
    fn test_small_spike_after_large_peaks_is_gated() {
        let mut signal = spikes(1800, 180, 50);
        for v in signal.iter_mut().skip(1400) {
            *v = 0.0;
        }
        signal[1490] = 0.3;
        let expected: Vec<usize> = (0..8).map(|k| 50 + 180 * k).collect();
        assert_eq!(detector().detect_batch(&signal), expected);

        // the same spike on its own passes the initial gate
        let mut alone = vec![0.0; 1800];
        alone[1490] = 0.3;
        assert_eq!(detector().detect_batch(&alone), vec![1490]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_stream_is_a_prefix_of_batch(signal in prop::collection::vec(-1.0f32..1.0, 200..800)) {
            let d = detector();
            let batch = d.detect_batch(&signal);
            let live = stream(&d, &signal);
            prop_assert!(live.len() <= batch.len());
            prop_assert_eq!(&live[..], &batch[..live.len()]);
        }
    }
}
