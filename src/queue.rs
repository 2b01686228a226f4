use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::decoder::Sample;

/// Result of one consumer tick against the queue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Popped {
    Sample(Sample),
    Empty,
    /// The queue had grown beyond its capacity and was dropped entirely.
    Overrun { discarded: usize },
}

/// Single producer / single consumer buffer between packet arrival and the
/// fixed cadence tick.
pub struct IntakeQueue {
    capacity: usize,
    samples: Mutex<VecDeque<Sample>>,
}

impl IntakeQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity != 0);
        IntakeQueue {
            capacity: capacity,
            samples: Mutex::new(VecDeque::with_capacity(capacity + 1)),
        }
    }

    fn lock(&self) -> MutexGuard<VecDeque<Sample>> {
        // a panicking producer cannot leave the deque itself inconsistent
        match self.samples.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn extend<I: IntoIterator<Item = Sample>>(&self, samples: I) {
        self.lock().extend(samples);
    }

    /// Overflow check followed by popping the head. The overflow check only
    /// runs here so the producer never blocks on anything but the lock.
    pub fn tick(&self) -> Popped {
        let mut samples = self.lock();
        if samples.len() > self.capacity {
            let discarded = samples.len();
            samples.clear();
            return Popped::Overrun {
                discarded: discarded,
            };
        }
        match samples.pop_front() {
            Some(sample) => Popped::Sample(sample),
            None => Popped::Empty,
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
