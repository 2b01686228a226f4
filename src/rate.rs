use crate::stats::{Ema, Smoothed};

/// Heart rate from the smoothed interval between consecutive beats.
#[derive(Clone, Debug)]
pub struct RateEstimator {
    sample_rate: f32,
    last_beat: Option<u32>,
    average_rr: Smoothed<Ema>,
    bpm: Option<u32>,
}

impl RateEstimator {
    pub fn new(sample_rate: f32, smoothing_ratio: f32) -> Self {
        assert!(sample_rate > 0.0, "rate estimator needs a positive sample rate");
        RateEstimator {
            sample_rate: sample_rate,
            last_beat: None,
            average_rr: Smoothed::new(Ema {
                ratio: smoothing_ratio,
            }),
            bpm: None,
        }
    }

    /// Registers a beat at sensor tick `timestamp` and returns the updated
    /// rate, which stays unset until the second beat.
    pub fn beat(&mut self, timestamp: u32) -> Option<u32> {
        if let Some(last) = self.last_beat {
            // the sensor counter may wrap, intervals never do
            let rr = timestamp.wrapping_sub(last);
            if rr != 0 {
                let average = self.average_rr.push(rr as f32);
                self.bpm = Some((60.0 * self.sample_rate / average).floor() as u32);
            }
        }
        self.last_beat = Some(timestamp);
        self.bpm
    }

    pub fn bpm(&self) -> Option<u32> {
        self.bpm
    }

    pub fn average_rr(&self) -> Option<f32> {
        self.average_rr.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_before_second_beat() {
        let mut rate = RateEstimator::new(360.0, 0.8);
        assert_eq!(rate.beat(100), None);
        assert_eq!(rate.bpm(), None);
        assert_eq!(rate.beat(460), Some(60));
    }

    #[test]
    fn test_converges_to_constant_interval() {
        let mut rate = RateEstimator::new(360.0, 0.8);
        rate.beat(0);
        // jump in from a slower rhythm
        rate.beat(500);
        let k = 288;
        let mut t = 500;
        let mut last = None;
        for _ in 0..200 {
            t += k;
            last = rate.beat(t);
        }
        let expected = (60.0 * 360.0 / k as f32).floor() as u32;
        assert!(last.unwrap() as i64 - expected as i64 <= 1);
        assert!(expected as i64 - last.unwrap() as i64 <= 1);

        // steady input, steady output
        for _ in 0..10 {
            t += k;
            assert_eq!(rate.beat(t), last);
        }
    }

    #[test]
    fn test_interval_across_counter_wrap() {
        let mut rate = RateEstimator::new(250.0, 0.8);
        rate.beat(u32::max_value() - 99);
        assert_eq!(rate.beat(150), Some(60));
        assert_eq!(rate.average_rr(), Some(250.0));
    }

    #[test]
    #[should_panic]
    fn test_zero_rate_is_rejected() {
        RateEstimator::new(0.0, 0.8);
    }
}
