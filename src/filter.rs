use biquad::{Biquad, Coefficients, DirectForm2Transposed, Hertz, Type};
use num::ToPrimitive;

use crate::config::Config;
use crate::error::{Error, Result};

/// Causal IIR band-pass made of `order` identical biquad sections in series.
///
/// Each section is an RBJ constant-peak band-pass centred between the cut
/// frequencies with `Q = center / bandwidth`. This is not a Butterworth
/// design: the cascade narrows the passband as `order` grows and the edges
/// are not maximally flat.
///
/// The streaming state is only touched by `single_step`; `multi_step` runs a
/// fresh cascade over a snapshot so a normalisation window never leaks into
/// the live output.
pub struct BandPass {
    coefficients: Coefficients<f32>,
    sections: Vec<DirectForm2Transposed<f32>>,
}

impl BandPass {
    pub fn new(sample_rate: f32, center_hz: f32, bandwidth_hz: f32, order: usize) -> Result<BandPass> {
        assert!(order != 0);
        let fs = Hertz::<f32>::from_hz(sample_rate).map_err(|e| Error::Filter {
            reason: format!("sample rate {}: {:?}", sample_rate, e),
        })?;
        let f0 = Hertz::<f32>::from_hz(center_hz).map_err(|e| Error::Filter {
            reason: format!("center frequency {}: {:?}", center_hz, e),
        })?;
        let q = center_hz / bandwidth_hz;
        let coefficients =
            Coefficients::<f32>::from_params(Type::BandPass, fs, f0, q).map_err(|e| Error::Filter {
                reason: format!("{} Hz / Q {}: {:?}", center_hz, q, e),
            })?;

        Ok(BandPass {
            coefficients: coefficients,
            sections: BandPass::cascade(coefficients, order),
        })
    }

    pub fn from_config(config: &Config) -> Result<BandPass> {
        BandPass::new(
            config.sample_rate,
            config.center_hz(),
            config.bandwidth_hz(),
            config.filter_order,
        )
    }

    fn cascade(coefficients: Coefficients<f32>, order: usize) -> Vec<DirectForm2Transposed<f32>> {
        (0..order)
            .map(|_| DirectForm2Transposed::<f32>::new(coefficients))
            .collect()
    }

    fn run(sections: &mut [DirectForm2Transposed<f32>], input: f32) -> f32 {
        sections.iter_mut().fold(input, |x, section| section.run(x))
    }

    pub fn order(&self) -> usize {
        self.sections.len()
    }

    /// Feeds one raw reading through the live filter.
    pub fn single_step(&mut self, input: f32) -> f32 {
        BandPass::run(&mut self.sections, input)
    }

    /// Filters `window` from a zeroed state, leaving the live state alone.
    pub fn multi_step<I, S>(&self, window: I) -> Vec<f32>
    where
        I: IntoIterator<Item = S>,
        S: ToPrimitive,
    {
        let mut sections = BandPass::cascade(self.coefficients, self.order());
        window
            .into_iter()
            .map(|v| BandPass::run(&mut sections, v.to_f32().unwrap_or(0.0)))
            .collect()
    }

    pub fn reset(&mut self) {
        self.sections = BandPass::cascade(self.coefficients, self.order());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn filter() -> BandPass {
        BandPass::from_config(&Config::with_sample_rate(360.0)).unwrap()
    }

    fn sine(freq: f32, n: usize) -> Vec<f32> {
        (0..n).map(|i| (2.0 * PI * freq * i as f32 / 360.0).sin()).collect()
    }

    fn peak(values: &[f32]) -> f32 {
        values.iter().fold(0.0, |m, v| f32::max(m, v.abs()))
    }

    #[test]
    fn test_modes_share_the_recurrence() {
        let input = sine(14.0, 200);
        let mut live = filter();
        let streamed: Vec<f32> = input.iter().map(|v| live.single_step(*v)).collect();
        let batch = filter().multi_step(input.iter().cloned());
        assert_eq!(streamed, batch);
    }

    #[test]
    fn test_multi_step_does_not_touch_live_state() {
        let mut a = filter();
        let mut b = filter();
        for v in sine(10.0, 50) {
            a.single_step(v);
            b.single_step(v);
        }
        let _ = a.multi_step(sine(3.0, 350));
        assert_eq!(a.single_step(0.25), b.single_step(0.25));
    }

    #[test]
    fn test_passes_band_and_rejects_baseline() {
        let in_band = filter().multi_step(sine(14.0, 1440));
        let drift = filter().multi_step(sine(0.5, 1440));
        let hum = filter().multi_step(sine(120.0, 1440));
        // only look at the settled half
        let settled = |v: &[f32]| peak(&v[720..]);
        assert!(settled(&in_band) > 0.5);
        assert!(settled(&drift) < 0.05 * settled(&in_band));
        assert!(settled(&hum) < 0.1 * settled(&in_band));
    }

    #[test]
    fn test_reset_matches_fresh_filter() {
        let mut used = filter();
        for v in sine(14.0, 100) {
            used.single_step(v);
        }
        used.reset();
        let mut fresh = filter();
        assert_eq!(used.single_step(1.0), fresh.single_step(1.0));
    }

    #[test]
    fn test_rejects_center_above_nyquist() {
        assert!(BandPass::new(20.0, 14.0, 12.0, 3).is_err());
    }

    #[test]
    fn test_accepts_wider_inputs() {
        let doubles: Vec<f64> = vec![0.0, 1.0, 0.0, 0.0];
        let singles: Vec<f32> = vec![0.0, 1.0, 0.0, 0.0];
        assert_eq!(filter().multi_step(doubles), filter().multi_step(singles));
    }
}
