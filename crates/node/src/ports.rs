//! The node's registration surface for construction walks.

use std::sync::{Arc, Mutex};

use tracing::trace;
use weir_record::Record;
use weir_routing::RoutingPorts;
use weir_stream::Stream;
use weir_transport::Message;
use weir_types::{CreateNet, Dest, NodeId};

use crate::link_handle::LinkHandle;
use crate::output::OutputHandle;

/// One incoming-stream registration waiting to be folded into the input
/// manager's destination map.
pub(crate) type Registration = (NodeId, Dest, Stream<Record>);

/// Connects [`RoutingPorts`] to the managers.
///
/// Out-bindings go straight to the output manager's control queue.
/// In-bindings cannot: the destination map belongs to the input manager's
/// thread, so they queue here and the manager folds them in before every
/// record lookup. Every method is non-blocking, which lets a walk run on
/// the input manager's own thread.
pub(crate) struct NodePorts {
    node: NodeId,
    link: LinkHandle,
    output: OutputHandle,
    registrations: Arc<Mutex<Vec<Registration>>>,
    global_input: Mutex<Option<Stream<Record>>>,
    global_output: Mutex<Option<Stream<Record>>>,
}

impl NodePorts {
    pub(crate) fn new(link: LinkHandle, output: OutputHandle) -> Self {
        Self {
            node: link.node(),
            link,
            output,
            registrations: Arc::new(Mutex::new(Vec::new())),
            global_input: Mutex::new(None),
            global_output: Mutex::new(None),
        }
    }

    pub(crate) fn registrations(&self) -> Arc<Mutex<Vec<Registration>>> {
        self.registrations.clone()
    }

    pub(crate) fn global_input(&self) -> Option<Stream<Record>> {
        self.global_input.lock().unwrap().clone()
    }

    pub(crate) fn global_output(&self) -> Option<Stream<Record>> {
        self.global_output.lock().unwrap().clone()
    }
}

impl RoutingPorts for NodePorts {
    fn new_out(&self, to: NodeId, dest: Dest, stream: Stream<Record>) {
        self.output.bind(to, dest, stream);
    }

    fn new_in(&self, from: NodeId, dest: Dest, stream: Stream<Record>) {
        trace!(node = %self.node, %dest, %from, "queueing incoming registration");
        self.registrations.lock().unwrap().push((from, dest, stream));
    }

    fn claim_global_input(&self, stream: Stream<Record>) {
        let mut slot = self.global_input.lock().unwrap();
        if slot.is_some() {
            panic!("{}: global input claimed twice", self.node);
        }
        *slot = Some(stream);
    }

    fn claim_global_output(&self, stream: Stream<Record>) {
        let mut slot = self.global_output.lock().unwrap();
        if slot.is_some() {
            panic!("{}: global output claimed twice", self.node);
        }
        *slot = Some(stream);
    }

    fn send_create_net(&self, to: NodeId, request: CreateNet) {
        self.link.send(to, Message::CreateNetwork(request));
    }
}
