//! The output manager: one thread owning every stream whose consumer is
//! remote.
//!
//! The manager blocks in a [`Poller`] over the read ends of all its
//! bindings plus a capacity-1 doorbell stream. Other threads never touch
//! the binding set directly: they push a control onto a shared queue and
//! ring the doorbell, and the manager applies the controls between
//! forwarding steps. A `sync` record splices the binding's read end onto
//! the stream it carries; a `terminate` is forwarded and retires the
//! binding.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::{debug, trace, warn};
use weir_record::Record;
use weir_stream::{Poller, Stream, StreamR, StreamW};
use weir_transport::Message;
use weir_types::{Dest, NodeId};

use crate::link_handle::LinkHandle;

enum Ctl {
    Bind {
        to: NodeId,
        dest: Dest,
        stream: Stream<Record>,
    },
    Block {
        dest: Dest,
    },
    Unblock {
        dest: Dest,
    },
    Stop,
}

/// Handle other threads use to talk to the output manager.
///
/// Every operation funnels through the control queue plus the doorbell, so
/// the manager's own state is touched by its thread only. The doorbell has
/// capacity 1 and is rung with `try_write`: a full doorbell means a wakeup
/// is already pending and consecutive controls coalesce into one.
#[derive(Clone)]
pub(crate) struct OutputHandle {
    ctl: Arc<Mutex<VecDeque<Ctl>>>,
    doorbell: Arc<Mutex<StreamW<Record>>>,
}

impl OutputHandle {
    /// Binds `stream` as an outgoing endpoint; records read from it are
    /// forwarded to `to` labelled `dest`.
    pub(crate) fn bind(&self, to: NodeId, dest: Dest, stream: Stream<Record>) {
        self.push(Ctl::Bind { to, dest, stream });
    }

    /// Stops forwarding records for `dest` until [`unblock`](Self::unblock).
    pub(crate) fn block(&self, dest: Dest) {
        self.push(Ctl::Block { dest });
    }

    pub(crate) fn unblock(&self, dest: Dest) {
        self.push(Ctl::Unblock { dest });
    }

    /// Asks the manager to exit once every binding has been retired.
    pub(crate) fn stop(&self) {
        self.push(Ctl::Stop);
    }

    fn push(&self, ctl: Ctl) {
        self.ctl.lock().unwrap().push_back(ctl);
        // The record is a bare token; the manager discards it unread.
        let _ = self
            .doorbell
            .lock()
            .unwrap()
            .try_write(Record::TriggerInitializer);
    }
}

pub(crate) struct OutputManager {
    link: LinkHandle,
    ctl: Arc<Mutex<VecDeque<Ctl>>>,
    doorbell: StreamR<Record>,
    bindings: Vec<Binding>,
    poller: Poller,
    stopping: bool,
}

struct Binding {
    reader: StreamR<Record>,
    to: NodeId,
    dest: Dest,
    blocked: bool,
}

impl OutputManager {
    pub(crate) fn new(link: LinkHandle) -> (Self, OutputHandle) {
        let doorbell = Stream::new(1);
        let handle = OutputHandle {
            ctl: Arc::new(Mutex::new(VecDeque::new())),
            doorbell: Arc::new(Mutex::new(doorbell.open_write())),
        };
        let manager = Self {
            link,
            ctl: handle.ctl.clone(),
            doorbell: doorbell.open_read(),
            bindings: Vec::new(),
            poller: Poller::new(),
            stopping: false,
        };
        (manager, handle)
    }

    pub(crate) fn run(mut self) {
        debug!(node = %self.link.node(), "output manager running");
        loop {
            if self.stopping && self.bindings.is_empty() {
                break;
            }
            match self.next_ready() {
                None => {
                    let _ = self.doorbell.try_read();
                    self.drain_ctl();
                }
                Some(index) => self.forward(index),
            }
        }
        debug!(node = %self.link.node(), "output manager stopped");
    }

    /// Blocks until the doorbell or an unblocked binding has input; `None`
    /// is the doorbell.
    fn next_ready(&self) -> Option<usize> {
        let mut watched: Vec<&StreamR<Record>> = Vec::with_capacity(self.bindings.len() + 1);
        let mut indices = Vec::with_capacity(self.bindings.len());
        watched.push(&self.doorbell);
        for (index, binding) in self.bindings.iter().enumerate() {
            if !binding.blocked {
                watched.push(&binding.reader);
                indices.push(index);
            }
        }
        let ready = self.poller.poll(&watched);
        (ready > 0).then(|| indices[ready - 1])
    }

    fn forward(&mut self, index: usize) {
        match self.bindings[index].reader.read() {
            Record::Sync { stream } => {
                trace!(dest = %self.bindings[index].dest, "sync record, splicing binding tail");
                self.bindings[index].reader.replace(stream);
            }
            Record::Terminate => {
                let binding = self.bindings.swap_remove(index);
                debug!(
                    node = %self.link.node(),
                    dest = %binding.dest,
                    to = %binding.to,
                    "terminate, outgoing binding retired"
                );
                self.link.send(
                    binding.to,
                    Message::Rec {
                        dest: binding.dest,
                        record: Record::Terminate,
                    },
                );
            }
            record => {
                let binding = &self.bindings[index];
                self.link.send(
                    binding.to,
                    Message::Rec {
                        dest: binding.dest,
                        record,
                    },
                );
            }
        }
    }

    fn drain_ctl(&mut self) {
        loop {
            let ctl = self.ctl.lock().unwrap().pop_front();
            match ctl {
                None => return,
                Some(Ctl::Bind { to, dest, stream }) => {
                    debug!(node = %self.link.node(), %dest, %to, "outgoing binding registered");
                    self.bindings.push(Binding {
                        reader: stream.open_read(),
                        to,
                        dest,
                        blocked: false,
                    });
                }
                Some(Ctl::Block { dest }) => self.set_blocked(dest, true),
                Some(Ctl::Unblock { dest }) => self.set_blocked(dest, false),
                Some(Ctl::Stop) => {
                    debug!(node = %self.link.node(), "output manager stop requested");
                    self.stopping = true;
                }
            }
        }
    }

    fn set_blocked(&mut self, dest: Dest, blocked: bool) {
        match self.bindings.iter_mut().find(|b| b.dest == dest) {
            Some(binding) => {
                trace!(%dest, blocked, "flow control");
                binding.blocked = blocked;
            }
            // The binding can be gone: its terminate crossed the peer's
            // flow-control message in flight.
            None => warn!(%dest, blocked, "flow control for a retired binding"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    use weir_record::{DataRecord, Record};
    use weir_transport::{tags, Link};
    use weir_transport_memory::MemoryHub;
    use weir_types::{InterfaceId, Name, OpId};

    fn some_dest(index: i32) -> Dest {
        Dest {
            op: OpId::new(NodeId(0), 1),
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

    fn tag_of(frame: &[u8]) -> u8 {
        frame[0]
    }

    /// Manager on node 0, raw link of node 1 to receive what it sends.
    fn rig() -> (OutputHandle, thread::JoinHandle<()>, impl Link) {
        let mut links = MemoryHub::new(2).into_links();
        let peer = links.remove(1);
        let link = LinkHandle::new(Arc::new(links.remove(0)));
        let (manager, handle) = OutputManager::new(link);
        let worker = thread::spawn(move || manager.run());
        (handle, worker, peer)
    }

    #[test]
    fn test_bound_records_are_forwarded_in_order() {
        let (handle, worker, peer) = rig();
        let stream = Stream::new(0);
        let mut w = stream.open_write();
        handle.bind(NodeId(1), some_dest(0), stream);

        w.write(tagged(1));
        w.write(tagged(2));
        for _ in 0..2 {
            let (from, frame) = peer.recv().unwrap();
            assert_eq!(from, NodeId(0));
            assert_eq!(tag_of(&frame), tags::REC);
        }

        w.write(Record::Terminate);
        let (_, frame) = peer.recv().unwrap();
        assert_eq!(tag_of(&frame), tags::REC);

        handle.stop();
        worker.join().unwrap();
    }

    #[test]
    fn test_sync_record_splices_the_binding() {
        let (handle, worker, peer) = rig();
        let first = Stream::new(0);
        let mut w1 = first.open_write();
        handle.bind(NodeId(1), some_dest(0), first);

        let second = Stream::new(0);
        let mut w2 = second.open_write();
        w2.write(tagged(9));
        w2.write(Record::Terminate);
        w1.write(Record::Sync { stream: second });

        // The spliced tail, then its terminate.
        assert_eq!(tag_of(&peer.recv().unwrap().1), tags::REC);
        assert_eq!(tag_of(&peer.recv().unwrap().1), tags::REC);

        handle.stop();
        worker.join().unwrap();
    }

    #[test]
    fn test_blocked_binding_is_not_polled() {
        let mut links = MemoryHub::new(2).into_links();
        let peer = links.remove(1);
        let link = LinkHandle::new(Arc::new(links.remove(0)));
        let (manager, handle) = OutputManager::new(link);
        let worker = thread::spawn(move || manager.run());

        let stream = Stream::new(0);
        let mut w = stream.open_write();
        let dest = some_dest(0);
        handle.bind(NodeId(1), dest, stream);
        handle.block(dest);
        thread::sleep(Duration::from_millis(50));

        w.write(tagged(1));
        thread::sleep(Duration::from_millis(100));

        // Nothing may have been forwarded while blocked; unblocking
        // releases the queued record.
        handle.unblock(dest);
        let (_, frame) = peer.recv().unwrap();
        assert_eq!(tag_of(&frame), tags::REC);

        w.write(Record::Terminate);
        peer.recv().unwrap();
        handle.stop();
        worker.join().unwrap();
    }

    #[test]
    fn test_stop_waits_for_bindings_to_retire() {
        let (handle, worker, peer) = rig();
        let stream = Stream::new(0);
        let mut w = stream.open_write();
        handle.bind(NodeId(1), some_dest(0), stream);
        handle.stop();
        thread::sleep(Duration::from_millis(50));
        assert!(!worker.is_finished());

        w.write(Record::Terminate);
        peer.recv().unwrap();
        worker.join().unwrap();
    }
}
