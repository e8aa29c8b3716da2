//! Foundation types for the weir distribution substrate.
//!
//! This crate provides the identifiers and wire primitives every other crate
//! builds on:
//!
//! - **Identifiers**: [`NodeId`], [`OpId`], [`InterfaceId`], [`RefId`], [`Name`]
//! - **Routing keys**: [`Dest`], the location-independent endpoint key records
//!   are routed by
//! - **Reference identity**: [`Ref`], the cluster-wide name of a piece of
//!   reference-counted data
//! - **Construction naming**: [`FunName`] and [`CreateNet`], how a
//!   network-constructor function is referred to across process images
//! - **Wire primitives**: [`WireWriter`] / [`WireReader`], the little-endian
//!   byte codec all wire payloads are packed with
//!
//! # Design Philosophy
//!
//! This crate is self-contained and does not depend on any other workspace
//! crate, making it the foundation layer. Types that cross the wire encode
//! themselves (`encode`/`decode` methods on the type) so higher layers never
//! hand-assemble byte layouts.

mod dest;
mod ids;
mod refs;
mod wire;

pub use dest::{CreateNet, Dest, FunName};
pub use ids::{InterfaceId, Name, NodeId, OpId, RefId};
pub use refs::Ref;
pub use wire::{WireError, WireReader, WireWriter};
