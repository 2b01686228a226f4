//! Streaming QRS beat detection and heart rate estimation for a remote
//! biosignal sensor.
//!
//! Packets are decoded into samples, queued, and consumed one per tick by a
//! band-pass filter, a beat detector and an RR interval based rate estimator.

#[macro_use]
extern crate log;
#[macro_use]
extern crate failure_derive;

pub mod beat;
pub mod bench;
pub mod config;
pub mod debug;
pub mod decoder;
pub mod dual_slope;
pub mod error;
pub mod filter;
pub mod process;
pub mod queue;
pub mod rate;
pub mod scheduler;
pub mod stats;

pub use crate::beat::{Beat, BeatDetector, Strategy, ThresholdDetector, Tick};
pub use crate::config::{Config, DetectorKind, DualSlopeConfig};
pub use crate::decoder::Sample;
pub use crate::dual_slope::DualSlope;
pub use crate::error::{Error, Result};
pub use crate::process::{Event, Pipeline};
pub use crate::queue::IntakeQueue;
pub use crate::rate::RateEstimator;
pub use crate::scheduler::Session;
