//! Destination keys and constructor naming.

use crate::ids::{NodeId, OpId};
use crate::wire::{WireError, WireReader, WireWriter};
use std::fmt;

/// Location-independent identifier of one unmaterialized stream endpoint.
///
/// A `Dest` names "the `index`-th boundary crossing of construction `op`",
/// independent of which node ends up hosting either side. Both ends of an
/// edge derive the same `Dest` because the boundary index is drawn from the
/// construction walk itself, which is replayed identically during dynamic
/// unfolding.
///
/// The remaining fields let a node that has never seen the construction
/// rebuild it on demand: `parent` is the registry id of the constructor
/// function, `parent_node` the node the rebuilt fragment's output is routed
/// to, and `dynamic_index`/`dynamic_loc` identify the dynamic (star/split)
/// branch the endpoint belongs to.
///
/// # Wire Format
///
/// ```text
/// [op: u64][index: i32][parent: i32][parentNode: i32]
/// [dynamicIndex: i32][dynamicLoc: i32]
/// ```
///
/// The sending node travels in the transport envelope, not here.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Dest {
    /// Construction call this endpoint belongs to.
    pub op: OpId,
    /// Boundary-crossing index within the construction walk.
    pub index: i32,
    /// Registry id of the constructor function that can rebuild the fragment.
    pub parent: i32,
    /// Node the rebuilt fragment's output must be routed to.
    pub parent_node: NodeId,
    /// Index of the dynamic branch within its parent combinator.
    pub dynamic_index: i32,
    /// Node that initiated the dynamic branch.
    pub dynamic_loc: NodeId,
}

impl Dest {
    pub fn encode(&self, w: &mut WireWriter) {
        self.op.encode(w);
        w.put_i32(self.index);
        w.put_i32(self.parent);
        self.parent_node.encode(w);
        w.put_i32(self.dynamic_index);
        self.dynamic_loc.encode(w);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            op: OpId::decode(r)?,
            index: r.get_i32()?,
            parent: r.get_i32()?,
            parent_node: NodeId::decode(r)?,
            dynamic_index: r.get_i32()?,
            dynamic_loc: NodeId::decode(r)?,
        })
    }
}

impl fmt::Display for Dest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.op, self.index)
    }
}

/// Stable cross-image name of a network-constructor function.
///
/// Function pointers cannot cross process boundaries, so `create_network`
/// messages carry the (library, index) pair under which the constructor was
/// registered; every node registers the same constructors at bootstrap.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FunName {
    pub library: String,
    pub index: i32,
}

impl FunName {
    pub fn new(library: impl Into<String>, index: i32) -> Self {
        Self {
            library: library.into(),
            index,
        }
    }

    pub fn encode(&self, w: &mut WireWriter) {
        w.put_str(&self.library);
        w.put_i32(self.index);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            library: r.get_str()?.to_owned(),
            index: r.get_i32()?,
        })
    }
}

impl fmt::Display for FunName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.library, self.index)
    }
}

/// Request to instantiate a sub-network fragment on the receiving node.
///
/// Sent at most once per (construction, target node) pair; the receiver runs
/// the named constructor with a non-master context so the instantiation never
/// fans out further create requests of its own.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CreateNet {
    /// Construction call being extended onto the receiver.
    pub op: OpId,
    /// Location the construction returns to when the fragment ends.
    pub parent_loc: NodeId,
    /// Combinator tag threaded through the construction.
    pub tag: i32,
    /// Constructor to run.
    pub fun: FunName,
}

impl CreateNet {
    pub fn encode(&self, w: &mut WireWriter) {
        self.op.encode(w);
        self.parent_loc.encode(w);
        w.put_i32(self.tag);
        self.fun.encode(w);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            op: OpId::decode(r)?,
            parent_loc: NodeId::decode(r)?,
            tag: r.get_i32()?,
            fun: FunName::decode(r)?,
        })
    }
}
