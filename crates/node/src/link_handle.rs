//! The sending half of a node's transport, shared by every subsystem.

use std::sync::Arc;

use tracing::trace;
use weir_reference::RefLink;
use weir_transport::{Link, Message};
use weir_types::{NodeId, Ref};

/// Frames and sends [`Message`]s over the node's [`Link`].
///
/// Cheap to clone; every subsystem that talks to the cluster (managers,
/// routing ports, the reference table, operator threads dropping handles)
/// holds one. Failures are fatal: the transport is assumed reliable, so a
/// frame that cannot be encoded or delivered means the run is already
/// broken and the node comes down.
#[derive(Clone)]
pub struct LinkHandle {
    link: Arc<dyn Link>,
}

impl LinkHandle {
    pub fn new(link: Arc<dyn Link>) -> Self {
        Self { link }
    }

    /// This node's id.
    pub fn node(&self) -> NodeId {
        self.link.node()
    }

    /// Number of nodes in the run.
    pub fn node_count(&self) -> usize {
        self.link.node_count()
    }

    /// Frames `message` and sends it to `to`, consuming the message.
    pub fn send(&self, to: NodeId, message: Message) {
        let kind = message.type_name();
        trace!(node = %self.node(), %to, kind, "send");
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(err) => panic!("{}: cannot frame {kind} message: {err}", self.node()),
        };
        if let Err(err) = self.link.send(to, frame) {
            panic!("{}: sending {kind} to {to} failed: {err}", self.node());
        }
    }
}

impl RefLink for LinkHandle {
    fn send_ref_update(&self, to: NodeId, r: Ref, delta: i32) {
        self.send(to, Message::RefUpdate { r, delta });
    }

    fn send_ref_fetch(&self, to: NodeId, r: Ref) {
        self.send(to, Message::RefFetch { r });
    }

    fn send_ref_set(&self, to: NodeId, r: Ref, payload: Vec<u8>) {
        self.send(to, Message::RefSet { r, payload });
    }

    fn send_ref_copy(&self, to: NodeId, r: Ref) {
        self.send(to, Message::RefCopy { r });
    }

    fn send_ref_copy_ack(&self, to: NodeId, r: Ref) {
        self.send(to, Message::RefCopyAck { r });
    }
}
