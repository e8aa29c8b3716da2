//! Decides, edge by edge, whether the operator network continues locally or
//! crosses to another node.
//!
//! A network constructor is an ordinary recursive function that threads a
//! [`RoutingContext`] through its walk. Every placement change goes through
//! [`RoutingContext::update`], which consumes one index from the context's
//! walk counter and either hands the stream to the output manager (the walk
//! leaves this node), materializes a local stream fed by the input manager
//! (the walk arrives here), or just records the new location. Because a
//! replayed walk performs the same sequence of updates, every node derives
//! identical [`Dest`](weir_types::Dest) keys without negotiating indices.
//!
//! Construction is lazy: only the master context announces new nodes (one
//! `create_network` request per node), and a node that receives a record for
//! an endpoint it has never built rebuilds the owning fragment on the spot
//! via [`unfold_dynamic`].

mod context;
mod registry;

pub use context::{unfold_dynamic, unfold_network, RoutingContext, RoutingEnv, RoutingPorts};
pub use registry::{FunRegistry, NetFn};
