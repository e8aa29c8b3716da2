//! In-process transport: a full mesh of channel-backed links.
//!
//! Every node of a [`MemoryHub`] gets one [`MemoryLink`]; frames travel
//! over unbounded channels, so sends never block and frames from one
//! sending thread arrive in order, which is all the managers require of a
//! transport. A hub can be created *tapped*, in which case every frame is
//! also mirrored to an observer channel — tests use this to assert which
//! message kinds actually crossed between nodes.

mod hub;

pub use hub::{MemoryHub, MemoryLink, TapFrame};
