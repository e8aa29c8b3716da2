//! Newtype identifiers used throughout the substrate.

use crate::wire::{WireError, WireReader, WireWriter};
use std::fmt;

/// Identifies one node (process image) in the running cluster.
///
/// Node ids are small non-negative integers assigned by the transport at
/// startup; node 0 is the root node, where the global input and output of the
/// network live.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct NodeId(pub i32);

impl NodeId {
    /// The root node, which initiates network construction.
    pub const ROOT: Self = Self(0);

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }

    pub fn encode(self, w: &mut WireWriter) {
        w.put_i32(self.0);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self(r.get_i32()?))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Globally unique id of one network-construction call.
///
/// Packs the initiating node in the high 32 bits and a node-local counter in
/// the low 32, so ids never collide across nodes and never need coordination.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct OpId(u64);

impl OpId {
    pub fn new(node: NodeId, counter: u32) -> Self {
        Self(((node.0 as u32 as u64) << 32) | counter as u64)
    }

    pub fn node(self) -> NodeId {
        NodeId((self.0 >> 32) as u32 as i32)
    }

    pub fn counter(self) -> u32 {
        self.0 as u32
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    pub fn encode(self, w: &mut WireWriter) {
        w.put_u64(self.0);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self(r.get_u64()?))
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node(), self.counter())
    }
}

/// Selects which injected interface callback table governs a field payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct InterfaceId(pub i32);

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

/// Node-local id of one reference-counted data block.
///
/// Drawn from a per-node monotone counter and never recycled; the pair
/// `(owner NodeId, RefId)` is globally unique for all time.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct RefId(pub u64);

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Compile-time-interned name of a record field, tag or binding tag.
///
/// The coordination compiler assigns names densely from zero; the runtime
/// only ever compares and enumerates them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Name(pub i32);

impl Name {
    pub fn encode(self, w: &mut WireWriter) {
        w.put_i32(self.0);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self(r.get_i32()?))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
