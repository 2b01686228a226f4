use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which beat detector drives the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectorKind {
    Threshold,
    DualSlope,
}

/// Tuning of the dual-slope detector. Slope limits are derived from
/// `full_scale` and the sample rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DualSlopeConfig {
    pub full_scale: f32,
    /// Minimum spacing between accepted peaks in seconds.
    pub min_spacing_secs: f32,
    /// Fraction of the average peak amplitude a candidate has to exceed.
    pub peak_gate: f32,
    pub initial_peak: f32,
    /// Number of accepted peaks kept in the moving averages.
    pub history: usize,
}

impl Default for DualSlopeConfig {
    fn default() -> Self {
        DualSlopeConfig {
            full_scale: 2048.0,
            min_spacing_secs: 0.2,
            peak_gate: 0.4,
            initial_peak: 1.7,
            history: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sensor sample rate in Hz, also the tick rate of the scheduler.
    pub sample_rate: f32,
    pub low_cut_hz: f32,
    pub high_cut_hz: f32,
    /// Number of cascaded biquad sections.
    pub filter_order: usize,
    /// Trailing window (in samples) the adaptive threshold looks back on.
    pub window_size: usize,
    /// Ticks after a candidate during which no other beat is confirmed.
    pub refractory: usize,
    pub threshold_ratio: f32,
    /// The window maximum has to exceed this before any candidate is raised.
    pub amplitude_floor: f32,
    pub queue_capacity: usize,
    /// Weight of the previous average in the RR interval EMA.
    pub smoothing_ratio: f32,
    pub detector: DetectorKind,
    pub dual_slope: DualSlopeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sample_rate: 250.0,
            low_cut_hz: 8.0,
            high_cut_hz: 20.0,
            filter_order: 3,
            window_size: 350,
            refractory: 60,
            threshold_ratio: 0.7,
            amplitude_floor: 0.0,
            queue_capacity: 500,
            smoothing_ratio: 0.8,
            detector: DetectorKind::Threshold,
            dual_slope: DualSlopeConfig::default(),
        }
    }
}

impl Config {
    pub fn with_sample_rate(sample_rate: f32) -> Self {
        Config {
            sample_rate: sample_rate,
            ..Config::default()
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        let file = File::open(path)?;
        let config: Config = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate > 0.0) {
            return Err(Error::config(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        let nyquist = self.sample_rate / 2.0;
        if !(self.low_cut_hz > 0.0 && self.low_cut_hz < self.high_cut_hz && self.high_cut_hz < nyquist) {
            return Err(Error::config(format!(
                "band {}..{} Hz does not fit below nyquist {} Hz",
                self.low_cut_hz, self.high_cut_hz, nyquist
            )));
        }
        if self.filter_order == 0 {
            return Err(Error::config("filter order must be at least 1"));
        }
        if self.window_size == 0 {
            return Err(Error::config("window size must be at least 1"));
        }
        if !(self.threshold_ratio > 0.0 && self.threshold_ratio <= 1.0) {
            return Err(Error::config(format!(
                "threshold ratio {} outside (0, 1]",
                self.threshold_ratio
            )));
        }
        if !(self.smoothing_ratio >= 0.0 && self.smoothing_ratio < 1.0) {
            return Err(Error::config(format!(
                "smoothing ratio {} outside [0, 1)",
                self.smoothing_ratio
            )));
        }
        if self.queue_capacity == 0 {
            return Err(Error::config("queue capacity must be at least 1"));
        }
        if self.dual_slope.history == 0 || !(self.dual_slope.full_scale > 0.0) {
            return Err(Error::config("dual slope needs a history and a positive full scale"));
        }
        Ok(())
    }

    pub fn center_hz(&self) -> f32 {
        (self.high_cut_hz - self.low_cut_hz) / 2.0 + self.low_cut_hz
    }

    pub fn bandwidth_hz(&self) -> f32 {
        self.high_cut_hz - self.low_cut_hz
    }

    /// Interval between two scheduler ticks, `1000 / sample_rate` ms.
    pub fn tick_period(&self) -> Duration {
        Duration::from_micros((1_000_000.0 / self.sample_rate as f64).round() as u64)
    }
}
