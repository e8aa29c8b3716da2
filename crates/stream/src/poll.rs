use std::sync::{Arc, Condvar, Mutex};

use crate::stream::StreamR;

/// Blocks until one of a set of streams has input, without consuming it.
///
/// A `Poller` is meant to live as long as the loop that uses it: each call
/// to [`poll`](Self::poll) registers the poller's wakeup signal on every
/// still-empty stream, so a write that lands between two scans is never
/// missed. Registration is cleared again before `poll` returns.
pub struct Poller {
    signal: Arc<PollSignal>,
}

impl Poller {
    pub fn new() -> Self {
        Self {
            signal: Arc::new(PollSignal {
                fired: Mutex::new(false),
                cv: Condvar::new(),
            }),
        }
    }

    /// Returns the index of the first stream with at least one queued item,
    /// blocking until there is one. Scan order is the slice order, so
    /// earlier streams win ties.
    ///
    /// # Panics
    ///
    /// Panics on an empty slice; there would be nothing to wake us.
    pub fn poll<T>(&self, streams: &[&StreamR<T>]) -> usize {
        assert!(!streams.is_empty(), "poll over an empty stream set");
        loop {
            self.signal.clear();
            for (index, stream) in streams.iter().enumerate() {
                let mut st = stream.inner().state.lock().unwrap();
                if !st.queue.is_empty() {
                    drop(st);
                    self.deregister(streams);
                    return index;
                }
                st.poll_signal = Some(self.signal.clone());
            }
            self.signal.wait();
        }
    }

    fn deregister<T>(&self, streams: &[&StreamR<T>]) {
        for stream in streams {
            let mut st = stream.inner().state.lock().unwrap();
            if let Some(signal) = &st.poll_signal {
                if Arc::ptr_eq(signal, &self.signal) {
                    st.poll_signal = None;
                }
            }
        }
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot level-triggered flag shared between a poller and the writers
/// of the streams it watches. Writers raise it after every push while a
/// registration is in place; the poller clears it before each scan.
pub(crate) struct PollSignal {
    fired: Mutex<bool>,
    cv: Condvar,
}

impl PollSignal {
    pub(crate) fn raise(&self) {
        *self.fired.lock().unwrap() = true;
        self.cv.notify_all();
    }

    fn clear(&self) {
        *self.fired.lock().unwrap() = false;
    }

    fn wait(&self) {
        let mut fired = self.fired.lock().unwrap();
        while !*fired {
            fired = self.cv.wait(fired).unwrap();
        }
    }
}
