//! Inter-node messaging: the message union, its frame codec, and the
//! [`Link`] trait a transport implements.
//!
//! Everything two nodes say to each other is one [`Message`], framed as a
//! tag byte followed by a fixed payload layout, so a receiver dispatches on
//! the tag before touching the payload. The sending node is not part of
//! the frame; transports carry it in their envelope, the way the managers
//! need it for replies and for destination bookkeeping.

mod link;
mod message;

pub use link::{Link, LinkError};
pub use message::{tags, Message};
