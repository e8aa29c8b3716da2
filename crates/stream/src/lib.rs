//! Bounded single-producer single-consumer streams.
//!
//! A [`Stream`] is the channel that connects two operators. It is created
//! unopened and handed around as a value; actual transfer happens through the
//! two endpoint descriptors, [`StreamR`] and [`StreamW`], which are move-only
//! so the single-reader single-writer discipline is enforced by ownership.
//!
//! Three properties distinguish these streams from a general-purpose channel:
//!
//! * **Splice.** The reader can atomically swap the channel underneath its
//!   descriptor with [`StreamR::replace`]. The writer keeps its descriptor;
//!   synchronisation protocols above this layer guarantee the writer has
//!   already moved on when a splice happens.
//! * **Read observation.** A callback can be attached to a stream and fires
//!   after every successful read. Flow-control accounting hangs off this.
//! * **Poll.** A [`Poller`] blocks until one of a set of streams has input,
//!   without consuming anything.
//!
//! Capacity `0` means unbounded. A bounded stream blocks the writer when
//! full; [`StreamW::try_write`] refuses instead and hands the value back.

mod poll;
mod stream;

pub use poll::Poller;
pub use stream::{Stream, StreamFull, StreamR, StreamW};
