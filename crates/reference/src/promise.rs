use std::sync::{Condvar, Mutex};

/// Single-assignment slot a thread can block on.
///
/// Used for the round trips in the reference protocol: a requester parks a
/// promise where the input manager will find it, sends its request, and
/// waits; the manager fulfills the promise when the answer arrives. `wait`
/// clones the value out, so one promise can park in several places if need
/// be.
pub(crate) struct Promise<T> {
    slot: Mutex<Option<T>>,
    cv: Condvar,
}

impl<T: Clone> Promise<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            cv: Condvar::new(),
        }
    }

    pub(crate) fn fulfill(&self, value: T) {
        let mut slot = self.slot.lock().unwrap();
        debug_assert!(slot.is_none(), "promise fulfilled twice");
        *slot = Some(value);
        drop(slot);
        self.cv.notify_all();
    }

    pub(crate) fn wait(&self) -> T {
        let mut slot = self.slot.lock().unwrap();
        loop {
            if let Some(value) = slot.as_ref() {
                return value.clone();
            }
            slot = self.cv.wait(slot).unwrap();
        }
    }
}
