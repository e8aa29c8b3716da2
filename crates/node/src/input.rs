//! The input manager: single consumer of the node's transport inbox.
//!
//! One thread blocks in [`Link::recv`] and dispatches each frame. Records
//! are written into the local stream registered for their destination;
//! reference-protocol messages drive the [`RefTable`]; `create_network`
//! replays a constructor; flow control is forwarded to the output manager.
//!
//! Delivery never blocks this thread. A record that does not fit into its
//! destination stream goes to an unbounded pending queue, and the first
//! enqueue sends `block` back to the producing node. The drain path runs
//! here too: a read callback on every bound stream counts the records
//! still inside it, and when the count hits zero while records are
//! pending, the callback sends the node a self-addressed `update`. That
//! keeps the single-writer discipline intact -- the consumer thread only
//! ever nudges, it never writes.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, trace, warn};
use weir_record::Record;
use weir_reference::RefTable;
use weir_routing::{unfold_dynamic, unfold_network, RoutingEnv};
use weir_stream::{Stream, StreamFull, StreamW};
use weir_transport::{Link, Message};
use weir_types::{Dest, NodeId};

use crate::config::InputConfig;
use crate::link_handle::LinkHandle;
use crate::output::OutputHandle;
use crate::ports::Registration;

/// Drain accounting shared between the manager and a stream's read
/// callback.
#[derive(Default)]
struct DrainState {
    /// Records currently inside the bound stream.
    in_stream: AtomicUsize,
    /// Whether the manager holds queued records for this binding.
    pending_waiting: AtomicBool,
}

struct InBinding {
    from: NodeId,
    stream: Stream<Record>,
    writer: StreamW<Record>,
    shared: Arc<DrainState>,
    pending: VecDeque<Record>,
    sender_blocked: bool,
    /// Terminate received; the binding retires once pending is drained.
    terminated: bool,
}

pub(crate) struct InputManager {
    node: NodeId,
    link: Arc<dyn Link>,
    out: LinkHandle,
    refs: Arc<RefTable>,
    env: RoutingEnv,
    registrations: Arc<Mutex<Vec<Registration>>>,
    output: OutputHandle,
    bindings: HashMap<Dest, InBinding>,
    config: InputConfig,
    stopping: bool,
}

impl InputManager {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        link: Arc<dyn Link>,
        out: LinkHandle,
        refs: Arc<RefTable>,
        env: RoutingEnv,
        registrations: Arc<Mutex<Vec<Registration>>>,
        output: OutputHandle,
        config: InputConfig,
    ) -> Self {
        Self {
            node: out.node(),
            link,
            out,
            refs,
            env,
            registrations,
            output,
            bindings: HashMap::new(),
            config,
            stopping: false,
        }
    }

    pub(crate) fn run(mut self) {
        debug!(node = %self.node, "input manager running");
        loop {
            let (from, frame) = match self.link.recv() {
                Ok(envelope) => envelope,
                Err(err) => panic!("{}: transport receive failed: {err}", self.node),
            };
            let message = match Message::decode(&frame, &self.refs) {
                Ok(message) => message,
                Err(err) => panic!("{}: bad frame from {from}: {err}", self.node),
            };
            trace!(node = %self.node, %from, kind = message.type_name(), "dispatch");
            match message {
                Message::Rec { dest, record } => self.deliver(from, dest, record),
                Message::Update => self.drain_pending(),
                Message::Block { dest } => self.output.block(dest),
                Message::Unblock { dest } => self.output.unblock(dest),
                Message::RefUpdate { r, delta } => self.refs.handle_update(r, delta),
                Message::RefFetch { r } => {
                    if let Err(err) = self.refs.handle_fetch(from, r) {
                        panic!("{}: cannot pack {r} for {from}: {err}", self.node);
                    }
                }
                Message::RefSet { r, payload } => {
                    if let Err(err) = self.refs.handle_set(r, &payload) {
                        panic!("{}: bad payload for {r}: {err}", self.node);
                    }
                }
                Message::RefCopy { r } => self.refs.handle_copy(from, r),
                Message::RefCopyAck { r } => self.refs.handle_copy_ack(r),
                Message::CreateNetwork(request) => unfold_network(&self.env, request),
                Message::Stop => {
                    debug!(node = %self.node, "stop requested");
                    self.stopping = true;
                }
            }
            if self.stopping && self.bindings.is_empty() {
                break;
            }
        }
        self.output.stop();
        let live = self.refs.live_refs();
        if live != 0 {
            warn!(node = %self.node, live, "stopping with live reference entries");
        }
        info!(node = %self.node, "input manager stopped");
    }

    fn deliver(&mut self, from: NodeId, dest: Dest, record: Record) {
        self.fold_registrations();
        if !self.bindings.contains_key(&dest) {
            debug!(node = %self.node, %dest, "record for an unbuilt fragment");
            unfold_dynamic(&self.env, from, dest);
            self.fold_registrations();
        }
        let is_terminate = matches!(record, Record::Terminate);
        let Some(binding) = self.bindings.get_mut(&dest) else {
            panic!(
                "{}: rebuilding the fragment for {dest} bound no stream",
                self.node
            );
        };
        if is_terminate {
            binding.terminated = true;
        }

        let mut first_block = false;
        let mut nudge = false;
        if binding.pending.is_empty() {
            // Count before writing: the consumer's callback decrements
            // after reading, and must never see the counter short.
            binding.shared.in_stream.fetch_add(1, Ordering::SeqCst);
            match binding.writer.try_write(record) {
                Ok(()) => {}
                Err(StreamFull(record)) => {
                    binding.shared.in_stream.fetch_sub(1, Ordering::SeqCst);
                    binding.pending.push_back(record);
                    binding.shared.pending_waiting.store(true, Ordering::SeqCst);
                    if !binding.sender_blocked {
                        binding.sender_blocked = true;
                        first_block = true;
                    }
                    // The consumer may have emptied the stream before the
                    // pending flag went up; nudge ourselves if so.
                    nudge = binding.shared.in_stream.load(Ordering::SeqCst) == 0;
                }
            }
        } else {
            binding.pending.push_back(record);
            if binding.pending.len() == self.config.pending_warn_depth {
                warn!(
                    node = %self.node,
                    %dest,
                    depth = binding.pending.len(),
                    "pending queue is deep; is the consumer stalled?"
                );
            }
        }

        let sender = binding.from;
        let retire_now = binding.terminated && binding.pending.is_empty();
        if first_block {
            debug!(node = %self.node, %dest, "destination stream full, throttling sender");
            self.out.send(sender, Message::Block { dest });
        }
        if nudge {
            self.out.send(self.node, Message::Update);
        }
        if retire_now {
            self.retire(dest);
        }
    }

    /// Pushes queued records into any stream that has room again, lifting
    /// flow control and retiring finished bindings along the way.
    fn drain_pending(&mut self) {
        let mut unblock = Vec::new();
        let mut retired = Vec::new();
        for (&dest, binding) in &mut self.bindings {
            if binding.pending.is_empty() {
                continue;
            }
            while let Some(record) = binding.pending.pop_front() {
                binding.shared.in_stream.fetch_add(1, Ordering::SeqCst);
                match binding.writer.try_write(record) {
                    Ok(()) => {}
                    Err(StreamFull(record)) => {
                        binding.shared.in_stream.fetch_sub(1, Ordering::SeqCst);
                        binding.pending.push_front(record);
                        break;
                    }
                }
            }
            if binding.pending.is_empty() {
                binding
                    .shared
                    .pending_waiting
                    .store(false, Ordering::SeqCst);
                if binding.sender_blocked {
                    binding.sender_blocked = false;
                    unblock.push((binding.from, dest));
                }
                if binding.terminated {
                    retired.push(dest);
                }
            }
        }
        for (from, dest) in unblock {
            debug!(node = %self.node, %dest, "backlog drained, releasing sender");
            self.out.send(from, Message::Unblock { dest });
        }
        for dest in retired {
            self.retire(dest);
        }
    }

    /// Folds in stream registrations made by construction walks on other
    /// threads. Called before every record lookup so a binding registered
    /// by the root walk is visible by the time its first record arrives.
    fn fold_registrations(&mut self) {
        let fresh: Vec<Registration> = {
            let mut list = self.registrations.lock().unwrap();
            if list.is_empty() {
                return;
            }
            list.drain(..).collect()
        };
        for (from, dest, stream) in fresh {
            let writer = stream.open_write();
            let shared = Arc::new(DrainState::default());
            let callback_state = shared.clone();
            let callback_link = self.out.clone();
            let node = self.node;
            stream.set_read_callback(move || {
                let previous = callback_state.in_stream.fetch_sub(1, Ordering::SeqCst);
                if previous == 1 && callback_state.pending_waiting.load(Ordering::SeqCst) {
                    callback_link.send(node, Message::Update);
                }
            });
            debug!(node = %self.node, %from, %dest, "incoming binding registered");
            let previous = self.bindings.insert(
                dest,
                InBinding {
                    from,
                    stream,
                    writer,
                    shared,
                    pending: VecDeque::new(),
                    sender_blocked: false,
                    terminated: false,
                },
            );
            if previous.is_some() {
                panic!("{}: destination {dest} bound twice", self.node);
            }
        }
    }

    fn retire(&mut self, dest: Dest) {
        if let Some(binding) = self.bindings.remove(&dest) {
            // Records still inside the stream stay readable after the
            // writer drops; the consumer stops at the terminate.
            binding.stream.clear_read_callback();
            debug!(node = %self.node, %dest, "terminate delivered, incoming binding retired");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use weir_record::DataRecord;
    use weir_routing::FunRegistry;
    use weir_transport::tags;
    use weir_transport_memory::{MemoryHub, MemoryLink};
    use weir_types::{InterfaceId, Name, OpId};

    use crate::ports::NodePorts;

    fn some_dest(index: i32) -> Dest {
        Dest {
            op: OpId::new(NodeId(1), 1),
            index,
            parent: 0,
            parent_node: NodeId(-1),
            dynamic_index: 0,
            dynamic_loc: NodeId(0),
        }
    }

    fn tagged(value: i32) -> Record {
        let mut data = DataRecord::new(InterfaceId(0));
        data.set_tag(Name(0), value);
        Record::Data(data)
    }

    fn tag_value(record: &Record) -> i32 {
        match record {
            Record::Data(data) => data.get_tag(Name(0)).unwrap(),
            other => panic!("unexpected record {}", other.descriptor_name()),
        }
    }

    /// A manager for node 0 built by hand, plus node 1's raw link to
    /// observe what the manager sends.
    fn rig() -> (InputManager, MemoryLink) {
        let mut links = MemoryHub::new(2).into_links();
        let peer = links.remove(1);
        let link: Arc<dyn Link> = Arc::new(links.remove(0));
        let out = LinkHandle::new(link.clone());
        let refs = RefTable::new(
            out.node(),
            Arc::new(weir_reference::InterfaceRegistry::new()),
            Arc::new(out.clone()),
        );
        let (_, output) = crate::output::OutputManager::new(out.clone());
        let ports = Arc::new(NodePorts::new(out.clone(), output.clone()));
        let registrations = ports.registrations();
        let env = RoutingEnv {
            ports,
            registry: Arc::new(FunRegistry::new()),
            node: out.node(),
        };
        let manager = InputManager::new(
            link,
            out,
            refs,
            env,
            registrations,
            output,
            InputConfig::default(),
        );
        (manager, peer)
    }

    #[test]
    fn test_registered_binding_receives_records_in_order() {
        let (mut manager, _peer) = rig();
        let dest = some_dest(0);
        let stream = Stream::new(0);
        let mut reader = stream.open_read();
        manager
            .registrations
            .lock()
            .unwrap()
            .push((NodeId(1), dest, stream));

        manager.deliver(NodeId(1), dest, tagged(1));
        manager.deliver(NodeId(1), dest, tagged(2));
        assert_eq!(tag_value(&reader.read()), 1);
        assert_eq!(tag_value(&reader.read()), 2);
    }

    #[test]
    fn test_full_stream_queues_and_blocks_the_sender_once() {
        let (mut manager, peer) = rig();
        let dest = some_dest(0);
        let stream = Stream::new(1);
        let mut reader = stream.open_read();
        manager
            .registrations
            .lock()
            .unwrap()
            .push((NodeId(1), dest, stream));

        manager.deliver(NodeId(1), dest, tagged(1));
        manager.deliver(NodeId(1), dest, tagged(2));
        manager.deliver(NodeId(1), dest, tagged(3));

        // Exactly one block, on the first overflow.
        let (_, frame) = peer.recv().unwrap();
        assert_eq!(frame[0], tags::BLOCK);

        // Reads drain the backlog via self-addressed updates; the manager
        // applies them here by hand.
        assert_eq!(tag_value(&reader.read()), 1);
        manager.drain_pending();
        assert_eq!(tag_value(&reader.read()), 2);
        manager.drain_pending();
        assert_eq!(tag_value(&reader.read()), 3);

        let (_, frame) = peer.recv().unwrap();
        assert_eq!(frame[0], tags::UNBLOCK);
    }

    #[test]
    fn test_terminate_retires_the_binding_after_draining() {
        let (mut manager, _peer) = rig();
        let dest = some_dest(0);
        let stream = Stream::new(1);
        let mut reader = stream.open_read();
        manager
            .registrations
            .lock()
            .unwrap()
            .push((NodeId(1), dest, stream));

        manager.deliver(NodeId(1), dest, tagged(1));
        manager.deliver(NodeId(1), dest, Record::Terminate);
        assert!(manager.bindings.contains_key(&dest));

        assert_eq!(tag_value(&reader.read()), 1);
        manager.drain_pending();
        assert!(matches!(reader.read(), Record::Terminate));
        assert!(manager.bindings.is_empty());
    }

    #[test]
    fn test_terminate_with_no_backlog_retires_immediately() {
        let (mut manager, _peer) = rig();
        let dest = some_dest(0);
        let stream = Stream::new(0);
        let mut reader = stream.open_read();
        manager
            .registrations
            .lock()
            .unwrap()
            .push((NodeId(1), dest, stream));

        manager.deliver(NodeId(1), dest, Record::Terminate);
        assert!(manager.bindings.is_empty());
        assert!(matches!(reader.read(), Record::Terminate));
    }
}
