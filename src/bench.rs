use std::time::{Duration, Instant};

const KEEP: usize = 100;

/// Keeps the last few tick processing times and the worst lateness of the
/// scheduler against its cadence.
pub struct Benchmark {
    started: Instant,
    measurements: Vec<Duration>,
    worst_lateness: Duration,
}

impl Benchmark {
    pub fn new() -> Benchmark {
        Benchmark {
            started: Instant::now(),
            measurements: Vec::with_capacity(KEEP),
            worst_lateness: Duration::new(0, 0),
        }
    }

    pub fn start(&mut self) {
        self.started = Instant::now();
    }

    pub fn measure(&mut self) {
        let elapsed = self.started.elapsed();
        self.record(elapsed);
    }

    fn record(&mut self, elapsed: Duration) {
        if self.measurements.len() < KEEP {
            self.measurements.push(elapsed);
        } else {
            self.measurements.rotate_left(1);
            self.measurements[KEEP - 1] = elapsed;
        }
    }

    pub fn late_by(&mut self, lateness: Duration) {
        if lateness > self.worst_lateness {
            self.worst_lateness = lateness;
        }
    }

    pub fn worst_lateness(&self) -> Duration {
        self.worst_lateness
    }

    pub fn avg(&self) -> Duration {
        if self.measurements.is_empty() {
            Duration::new(0, 0)
        } else {
            self.measurements
                .iter()
                .fold(Duration::new(0, 0), |a, b| a + *b)
                / self.measurements.len() as u32
        }
    }
}
