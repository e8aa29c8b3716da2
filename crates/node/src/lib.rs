//! The per-node runtime: two manager threads and the lifecycle that owns
//! them.
//!
//! Every node runs exactly two dedicated threads. The *output manager*
//! owns the read end of every stream whose consumer lives on another node;
//! it polls them, frames the records it reads and pushes them onto the
//! transport. The *input manager* is the single consumer of the node's
//! transport inbox; it dispatches each arriving message, writing records
//! into the local streams registered for their destinations and driving
//! the reference protocol, flow control and lazy network construction as a
//! side effect.
//!
//! [`Runtime`] ties the two together: it wires the managers to a
//! [`Link`](weir_transport::Link), runs root constructions, and
//! orchestrates the cluster-wide shutdown handshake.

mod config;
mod input;
mod link_handle;
mod output;
mod ports;
mod runtime;

pub use config::{InputConfig, OutputConfig, RuntimeConfig};
pub use link_handle::LinkHandle;
pub use runtime::Runtime;
