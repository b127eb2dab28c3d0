//! Cancellable-wait primitive standing in for Python's `threading.Event`.
//!
//! Each long-running task owns one of these; setting it both marks the task
//! for exit and immediately wakes any in-progress timed wait.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

pub struct StopSignal {
    flag: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self { flag: Mutex::new(false), condvar: Condvar::new() }
    }

    pub fn set(&self) {
        *self.flag.lock().unwrap() = true;
        self.condvar.notify_all();
    }

    pub fn is_set(&self) -> bool {
        *self.flag.lock().unwrap()
    }

    /// Sleep up to `timeout`, waking early if [`Self::set`] is called.
    pub fn wait_timeout(&self, timeout: Duration) {
        let guard = self.flag.lock().unwrap();
        if *guard {
            return;
        }
        let _ = self.condvar.wait_timeout(guard, timeout).unwrap();
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[test]
    fn set_wakes_a_waiter_immediately() {
        let signal = Arc::new(StopSignal::new());
        let waiter = Arc::clone(&signal);
        let handle = std::thread::spawn(move || {
            let start = Instant::now();
            waiter.wait_timeout(Duration::from_secs(10));
            start.elapsed()
        });
        std::thread::sleep(Duration::from_millis(20));
        signal.set();
        let elapsed = handle.join().unwrap();
        assert!(elapsed < Duration::from_secs(1));
    }

    #[test]
    fn wait_returns_immediately_once_already_set() {
        let signal = StopSignal::new();
        signal.set();
        let start = Instant::now();
        signal.wait_timeout(Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
