//! Outstanding-work counter that gates run completion.
//!
//! The counter starts at 1, standing for "listing in progress". The
//! consumer adds one unit per dequeued job before the upload starts and
//! retires it when the job resolves; the producer retires the initial
//! unit once listing has finished and the queue is closed. `wait` returns
//! only when both conditions hold: listing done and every dequeued job
//! resolved. Resolutions may arrive from any thread in any order.

use std::sync::{Condvar, Mutex};

pub(crate) struct Coordinator {
    count: Mutex<u64>,
    zero: Condvar,
}

impl Coordinator {
    pub(crate) fn new(initial: u64) -> Self {
        Self {
            count: Mutex::new(initial),
            zero: Condvar::new(),
        }
    }

    /// Registers `n` more units of outstanding work.
    pub(crate) fn add(&self, n: u64) {
        let mut count = self.count.lock().expect("coordinator lock poisoned");
        *count += n;
    }

    /// Retires one unit of outstanding work.
    ///
    /// Panics on underflow: retiring work that was never registered is a
    /// pipeline protocol bug, not a runtime condition.
    pub(crate) fn done(&self) {
        let mut count = self.count.lock().expect("coordinator lock poisoned");
        *count = count.checked_sub(1).expect("coordinator count underflow");
        if *count == 0 {
            self.zero.notify_all();
        }
    }

    /// Blocks until the counter reaches zero.
    pub(crate) fn wait(&self) {
        let mut count = self.count.lock().expect("coordinator lock poisoned");
        while *count > 0 {
            count = self.zero.wait(count).expect("coordinator lock poisoned");
        }
    }

    /// Current number of outstanding units.
    pub(crate) fn outstanding(&self) -> u64 {
        *self.count.lock().expect("coordinator lock poisoned")
    }
}
