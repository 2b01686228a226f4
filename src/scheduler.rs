use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::beat::BeatDetector;
use crate::bench::Benchmark;
use crate::config::Config;
use crate::decoder;
use crate::error::{Error, Result};
use crate::process::{Event, Pipeline};
use crate::queue::IntakeQueue;

// past this many missed periods the cadence restarts instead of bursting
const MAX_CATCH_UP: u32 = 10;

/// One live detection session: a tick thread consuming the intake queue at
/// the sample rate and pushing events to the rendering side.
pub struct Session {
    queue: Arc<IntakeQueue>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Session {
    pub fn start<D>(config: &Config, detector: D, events: Sender<Event>) -> Result<Session>
    where
        D: BeatDetector + Send + 'static,
        D::State: Send + 'static,
    {
        let pipeline = Pipeline::new(config, detector)?;
        let queue = Arc::new(IntakeQueue::new(config.queue_capacity));
        let running = Arc::new(AtomicBool::new(true));
        let period = config.tick_period();

        info!(
            "starting session at {} Hz (tick {:?}, queue {})",
            config.sample_rate, period, config.queue_capacity
        );

        let worker = {
            let queue = queue.clone();
            let running = running.clone();
            thread::Builder::new()
                .name("ecg-tick".to_string())
                .spawn(move || tick_loop(pipeline, &queue, &running, period, events))?
        };

        Ok(Session {
            queue: queue,
            running: running,
            worker: Some(worker),
        })
    }

    /// False once stopped, or once the tick thread has exited on its own.
    pub fn is_running(&self) -> bool {
        match self.worker {
            Some(ref worker) => !worker.is_finished() && self.running.load(Ordering::Acquire),
            None => false,
        }
    }

    /// Transport callback: decodes one notification and queues its samples.
    /// Returns the number of samples queued.
    pub fn feed(&self, packet: &[u8]) -> Result<usize> {
        if !self.is_running() {
            return Err(Error::NotRunning);
        }
        let samples = decoder::decode(packet);
        let n = samples.len();
        self.queue.extend(samples);
        Ok(n)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Stops the tick thread and drops everything that was still queued.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("tick thread panicked");
            }
            self.queue.clear();
            info!("session stopped");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

fn tick_loop<D: BeatDetector>(
    mut pipeline: Pipeline<D>,
    queue: &IntakeQueue,
    running: &AtomicBool,
    period: Duration,
    events: Sender<Event>,
) {
    let mut bench = Benchmark::new();
    let mut next = Instant::now() + period;

    'ticks: while running.load(Ordering::Acquire) {
        bench.start();
        for event in pipeline.tick(queue) {
            if events.send(event).is_err() {
                warn!("event receiver went away, stopping ticks");
                running.store(false, Ordering::Release);
                break 'ticks;
            }
        }
        bench.measure();

        let now = Instant::now();
        if now < next {
            thread::sleep(next - now);
            next += period;
        } else {
            let lateness = now - next;
            bench.late_by(lateness);
            next = if lateness > period * MAX_CATCH_UP {
                trace!("tick {:?} late, resetting cadence", lateness);
                now + period
            } else {
                next + period
            };
        }
    }

    info!(
        "tick loop done after {} samples, avg tick {:?}, worst lateness {:?}",
        pipeline.position(),
        bench.avg(),
        bench.worst_lateness()
    );
}
