use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};

use crate::poll::PollSignal;

/// A FIFO channel between exactly one writer and one reader.
///
/// The `Stream` value itself is a cheap cloneable handle. It carries no
/// transfer rights: those live in the [`StreamR`] and [`StreamW`]
/// descriptors obtained from [`Stream::open_read`] and
/// [`Stream::open_write`], each of which can be taken exactly once.
/// Cloning the handle exists so a stream can be stored in a routing table
/// or carried inside a record while its endpoints are in use elsewhere.
pub struct Stream<T> {
    inner: Arc<Inner<T>>,
}

pub(crate) struct Inner<T> {
    pub(crate) state: Mutex<State<T>>,
    readable: Condvar,
    writable: Condvar,
}

pub(crate) struct State<T> {
    pub(crate) queue: VecDeque<T>,
    capacity: usize,
    reader_open: bool,
    writer_open: bool,
    read_callback: Option<Arc<dyn Fn() + Send + Sync>>,
    pub(crate) poll_signal: Option<Arc<PollSignal>>,
}

impl<T> State<T> {
    fn is_full(&self) -> bool {
        self.capacity != 0 && self.queue.len() >= self.capacity
    }
}

impl<T> Stream<T> {
    /// Creates an unopened stream. A `capacity` of zero means unbounded;
    /// otherwise writers block (or [`StreamW::try_write`] refuses) once
    /// `capacity` items are queued.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    capacity,
                    reader_open: false,
                    writer_open: false,
                    read_callback: None,
                    poll_signal: None,
                }),
                readable: Condvar::new(),
                writable: Condvar::new(),
            }),
        }
    }

    /// Claims the read endpoint.
    ///
    /// # Panics
    ///
    /// Panics if the stream already has a reader. Two live readers mean the
    /// wiring above this layer is broken, and there is no way to continue.
    pub fn open_read(&self) -> StreamR<T> {
        let mut st = self.inner.state.lock().unwrap();
        if st.reader_open {
            panic!("stream already has a reader");
        }
        st.reader_open = true;
        drop(st);
        StreamR {
            inner: self.inner.clone(),
        }
    }

    /// Claims the write endpoint.
    ///
    /// # Panics
    ///
    /// Panics if the stream already has a writer.
    pub fn open_write(&self) -> StreamW<T> {
        let mut st = self.inner.state.lock().unwrap();
        if st.writer_open {
            panic!("stream already has a writer");
        }
        st.writer_open = true;
        drop(st);
        StreamW {
            inner: self.inner.clone(),
        }
    }

    /// Attaches a callback that fires after every successful read, outside
    /// the stream lock. Replaces any previous callback.
    ///
    /// The callback stays with this underlying channel: if the reader later
    /// splices to another stream with [`StreamR::replace`], reads from the
    /// new channel do not fire it.
    pub fn set_read_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        let mut st = self.inner.state.lock().unwrap();
        st.read_callback = Some(Arc::new(callback));
    }

    /// Detaches the read callback, if any.
    pub fn clear_read_callback(&self) {
        let mut st = self.inner.state.lock().unwrap();
        st.read_callback = None;
    }

    /// Number of queued items right now.
    pub fn len(&self) -> usize {
        self.inner.state.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.state.try_lock() {
            Ok(st) => f
                .debug_struct("Stream")
                .field("len", &st.queue.len())
                .field("capacity", &st.capacity)
                .finish(),
            Err(_) => f.write_str("Stream { .. }"),
        }
    }
}

/// The exclusive read endpoint of a stream.
///
/// Obtained from [`Stream::open_read`]; move-only, so the single-reader
/// discipline is enforced by ownership. Dropping it releases the reader
/// side and wakes any writer blocked on a full queue.
pub struct StreamR<T> {
    inner: Arc<Inner<T>>,
}

impl<T> StreamR<T> {
    /// Takes the next item, blocking while the queue is empty.
    ///
    /// After the item is dequeued the stream's read callback (if any) runs
    /// with no locks held.
    ///
    /// # Panics
    ///
    /// Panics if the queue is empty and the writer endpoint is gone. A
    /// reader that outlives its writer without having seen a termination
    /// record is a protocol violation, and crashing beats hanging.
    pub fn read(&mut self) -> T {
        let mut st = self.inner.state.lock().unwrap();
        loop {
            if let Some(item) = st.queue.pop_front() {
                let callback = st.read_callback.clone();
                drop(st);
                self.inner.writable.notify_one();
                if let Some(cb) = callback {
                    cb();
                }
                return item;
            }
            if !st.writer_open {
                panic!("read from an empty stream whose writer is gone");
            }
            st = self.inner.readable.wait(st).unwrap();
        }
    }

    /// Takes the next item if one is queued. Fires the read callback on
    /// success, like [`read`](Self::read).
    pub fn try_read(&mut self) -> Option<T> {
        let mut st = self.inner.state.lock().unwrap();
        let item = st.queue.pop_front()?;
        let callback = st.read_callback.clone();
        drop(st);
        self.inner.writable.notify_one();
        if let Some(cb) = callback {
            cb();
        }
        Some(item)
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.inner.state.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Splices this descriptor onto a different stream.
    ///
    /// The old channel loses its reader; anything still queued there is
    /// dropped with it once the last handle goes away. The new stream must
    /// not already have a reader. Writers are not informed: the handover
    /// protocols above this layer only splice once the writer side has
    /// already switched over.
    pub fn replace(&mut self, stream: Stream<T>) {
        {
            let mut st = stream.inner.state.lock().unwrap();
            if st.reader_open {
                panic!("stream already has a reader");
            }
            st.reader_open = true;
        }
        {
            let mut st = self.inner.state.lock().unwrap();
            st.reader_open = false;
            st.poll_signal = None;
        }
        self.inner.writable.notify_all();
        self.inner = stream.inner;
    }

    pub(crate) fn inner(&self) -> &Inner<T> {
        &self.inner
    }
}

impl<T> Drop for StreamR<T> {
    fn drop(&mut self) {
        let mut st = self.inner.state.lock().unwrap();
        st.reader_open = false;
        st.poll_signal = None;
        drop(st);
        self.inner.writable.notify_all();
    }
}

impl<T> fmt::Debug for StreamR<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamR { .. }")
    }
}

/// The exclusive write endpoint of a stream.
///
/// Dropping it marks the stream finished and wakes a blocked reader, which
/// will then panic rather than wait forever; orderly shutdown delivers a
/// termination record through the stream first.
pub struct StreamW<T> {
    inner: Arc<Inner<T>>,
}

impl<T> StreamW<T> {
    /// Appends an item, blocking while a bounded stream is at capacity.
    pub fn write(&mut self, item: T) {
        let mut st = self.inner.state.lock().unwrap();
        while st.is_full() {
            st = self.inner.writable.wait(st).unwrap();
        }
        st.queue.push_back(item);
        let signal = st.poll_signal.clone();
        drop(st);
        self.inner.readable.notify_one();
        if let Some(signal) = signal {
            signal.raise();
        }
    }

    /// Appends an item only if there is room, handing the item back inside
    /// the error otherwise.
    pub fn try_write(&mut self, item: T) -> Result<(), StreamFull<T>> {
        let mut st = self.inner.state.lock().unwrap();
        if st.is_full() {
            return Err(StreamFull(item));
        }
        st.queue.push_back(item);
        let signal = st.poll_signal.clone();
        drop(st);
        self.inner.readable.notify_one();
        if let Some(signal) = signal {
            signal.raise();
        }
        Ok(())
    }
}

impl<T> Drop for StreamW<T> {
    fn drop(&mut self) {
        let mut st = self.inner.state.lock().unwrap();
        st.writer_open = false;
        drop(st);
        self.inner.readable.notify_all();
    }
}

impl<T> fmt::Debug for StreamW<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamW { .. }")
    }
}

/// Returned by [`StreamW::try_write`] when the stream is at capacity,
/// carrying the rejected item back to the caller.
pub struct StreamFull<T>(pub T);

impl<T> fmt::Debug for StreamFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamFull(..)")
    }
}

impl<T> fmt::Display for StreamFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("stream is at capacity")
    }
}

impl<T> std::error::Error for StreamFull<T> {}
