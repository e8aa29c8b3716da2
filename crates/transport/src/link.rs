use thiserror::Error;

use weir_types::NodeId;

/// One transport link per ordered node pair, byte frames in, byte frames
/// out.
///
/// The contract the managers rely on:
///
/// * frames sent by one thread to one peer arrive in send order;
/// * `recv` is blocking and reports which peer a frame came from;
/// * a node can send to itself (the input manager's wakeup trigger does).
pub trait Link: Send + Sync {
    /// This node's id.
    fn node(&self) -> NodeId;

    /// Number of nodes in the run, ids `0..count`.
    fn node_count(&self) -> usize;

    fn send(&self, to: NodeId, frame: Vec<u8>) -> Result<(), LinkError>;

    /// Blocks for the next frame from any peer.
    fn recv(&self) -> Result<(NodeId, Vec<u8>), LinkError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("peer {node} is not part of this run")]
    UnknownPeer { node: NodeId },
    #[error("link is shut down")]
    Closed,
}
