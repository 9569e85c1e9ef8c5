use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Admission gate between device callbacks and the control thread.
///
/// Callbacks `enter` before touching shared state and leave when the returned
/// pass drops. `close_and_wait` shuts the gate and blocks until every
/// in-flight callback has left, so the control thread can read the capture
/// buffer without racing the audio thread.
///
/// The callback side never blocks. It only takes the condvar lock when it is
/// the last one out of a closed gate, which happens once per stop.
#[derive(Debug, Default)]
pub struct CallbackGate {
    open: AtomicBool,
    in_flight: AtomicUsize,
    lock: Mutex<()>,
    idle: Condvar,
}

/// Proof of admission; leaving happens on drop.
#[must_use]
pub struct CallbackPass<'a> {
    gate: &'a CallbackGate,
}

impl Drop for CallbackPass<'_> {
    fn drop(&mut self) {
        self.gate.leave();
    }
}

impl CallbackGate {
    /// A closed gate.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Admit a callback, or `None` if the gate is closed.
    #[inline]
    pub fn enter(&self) -> Option<CallbackPass<'_>> {
        // Count first, then check: paired with close_and_wait's store-then-count.
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if !self.open.load(Ordering::SeqCst) {
            self.leave();
            return None;
        }
        Some(CallbackPass { gate: self })
    }

    fn leave(&self) {
        let previous = self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 && !self.open.load(Ordering::SeqCst) {
            let _guard = self.lock.lock();
            self.idle.notify_all();
        }
    }

    /// Close the gate and wait up to `timeout` for in-flight callbacks.
    ///
    /// Returns `true` once quiescent, `false` if the timeout elapsed first.
    pub fn close_and_wait(&self, timeout: Duration) -> bool {
        self.open.store(false, Ordering::SeqCst);

        let deadline = Instant::now() + timeout;
        let mut guard = self.lock.lock();
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            if self.idle.wait_until(&mut guard, deadline).timed_out() {
                return self.in_flight.load(Ordering::SeqCst) == 0;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn closed_gate_rejects_callbacks() {
        let gate = CallbackGate::new();
        assert!(gate.enter().is_none());
        assert_eq!(gate.in_flight(), 0);

        gate.open();
        {
            let _pass = gate.enter().unwrap();
            assert_eq!(gate.in_flight(), 1);
        }
        assert_eq!(gate.in_flight(), 0);
    }

    #[test]
    fn close_without_callbacks_returns_immediately() {
        let gate = CallbackGate::new();
        gate.open();
        assert!(gate.close_and_wait(Duration::from_millis(10)));
        assert!(!gate.is_open());
        assert!(gate.enter().is_none());
    }

    #[test]
    fn close_waits_for_in_flight_callback() {
        let gate = Arc::new(CallbackGate::new());
        gate.open();

        let (entered_tx, entered_rx) = mpsc::channel();
        let worker_gate = Arc::clone(&gate);
        let worker = thread::spawn(move || {
            let _pass = worker_gate.enter().unwrap();
            entered_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(30));
        });

        entered_rx.recv().unwrap();
        let started = Instant::now();
        assert!(gate.close_and_wait(Duration::from_secs(2)));
        assert!(started.elapsed() >= Duration::from_millis(10));
        assert_eq!(gate.in_flight(), 0);
        worker.join().unwrap();
    }

    #[test]
    fn close_times_out_on_stuck_callback() {
        let gate = CallbackGate::new();
        gate.open();
        let pass = gate.enter().unwrap();

        assert!(!gate.close_and_wait(Duration::from_millis(5)));
        drop(pass);
        assert!(gate.close_and_wait(Duration::from_millis(5)));
    }
}
