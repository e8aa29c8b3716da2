use weir_types::{NodeId, Ref};

/// Outbound half of the reference protocol.
///
/// Implemented by the node runtime on top of its transport link; the
/// [`RefTable`](crate::RefTable) speaks through this trait so it never has
/// to know how messages are framed. Sends are fire-and-forget: a transport
/// that cannot deliver takes the node down, so nothing is reported back
/// here.
pub trait RefLink: Send + Sync {
    /// Adjusts the owner-side handle total by `delta`.
    fn send_ref_update(&self, to: NodeId, r: Ref, delta: i32);

    /// Asks the owner to serialize the payload back to this node.
    fn send_ref_fetch(&self, to: NodeId, r: Ref);

    /// Answers a fetch with packed payload bytes.
    fn send_ref_set(&self, to: NodeId, r: Ref, payload: Vec<u8>);

    /// Asks the owner to add one handle unit on this node's behalf.
    fn send_ref_copy(&self, to: NodeId, r: Ref);

    /// Confirms that a copy request has been applied.
    fn send_ref_copy_ack(&self, to: NodeId, r: Ref);
}
