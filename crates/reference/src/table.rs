use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace};

use weir_types::{InterfaceId, NodeId, Ref, RefId, WireError, WireReader, WireWriter};

use crate::handle::DataRef;
use crate::interface::{BoxInterface, DataBox, InterfaceRegistry};
use crate::link::RefLink;
use crate::promise::Promise;

/// Per-node accounting for reference-counted data.
///
/// For data this node owns, the entry holds the payload and the total
/// number of live handles anywhere in the cluster, in-flight units
/// included; the payload is freed exactly when that total reaches zero.
/// For data owned elsewhere, the entry counts the handles held on this
/// node and caches the payload once it has been fetched; the cache is
/// dropped when the last local handle goes.
///
/// The `handle_*` methods are the message side of the protocol, called by
/// the input manager; they never block. The operations reachable through
/// [`DataRef`] may block on a non-owner node while the owner is consulted,
/// and are only ever called from operator threads.
pub struct RefTable {
    node: NodeId,
    entries: DashMap<Ref, Entry>,
    next_id: AtomicU64,
    interfaces: Arc<InterfaceRegistry>,
    link: Arc<dyn RefLink>,
}

enum Entry {
    /// This node owns the payload.
    Local { total: i32, data: Arc<DataBox> },
    /// The payload lives on `Ref::owner`; only local interest is tracked.
    Remote {
        local: i32,
        cached: Option<Arc<DataBox>>,
        fetch: Option<Vec<Arc<Promise<Arc<DataBox>>>>>,
        copy_acks: VecDeque<Arc<Promise<()>>>,
    },
}

impl Entry {
    fn new_remote() -> Self {
        Entry::Remote {
            local: 0,
            cached: None,
            fetch: None,
            copy_acks: VecDeque::new(),
        }
    }

    fn is_dead(&self) -> bool {
        match self {
            Entry::Local { total, .. } => *total == 0,
            Entry::Remote {
                local,
                fetch,
                copy_acks,
                ..
            } => *local == 0 && fetch.is_none() && copy_acks.is_empty(),
        }
    }
}

impl RefTable {
    pub fn new(
        node: NodeId,
        interfaces: Arc<InterfaceRegistry>,
        link: Arc<dyn RefLink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            node,
            entries: DashMap::new(),
            next_id: AtomicU64::new(0),
            interfaces,
            link,
        })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Wraps fresh local data. This node becomes the owner and the
    /// returned handle is the single live unit.
    pub fn create(self: &Arc<Self>, interface: InterfaceId, data: DataBox) -> DataRef {
        let identity = Ref {
            owner: self.node,
            id: RefId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            interface,
        };
        self.entries.insert(
            identity,
            Entry::Local {
                total: 1,
                data: Arc::new(data),
            },
        );
        trace!(%identity, "created reference");
        DataRef::new(identity, self.clone())
    }

    /// Entries still tracked. The orderly-shutdown contract is that this
    /// reaches zero before the managers exit.
    pub fn live_refs(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn duplicate(self: &Arc<Self>, r: Ref) -> DataRef {
        if r.owner == self.node {
            match self.entries.get_mut(&r) {
                Some(mut entry) => match entry.value_mut() {
                    Entry::Local { total, .. } => *total += 1,
                    Entry::Remote { .. } => self.not_owned_here(r, "duplicate"),
                },
                None => self.unknown(r),
            }
            trace!(%r, "duplicated handle locally");
        } else {
            let ack = Arc::new(Promise::new());
            match self.entries.get_mut(&r) {
                Some(mut entry) => match entry.value_mut() {
                    Entry::Remote {
                        local, copy_acks, ..
                    } => {
                        *local += 1;
                        copy_acks.push_back(ack.clone());
                    }
                    Entry::Local { .. } => self.not_owned_here(r, "duplicate"),
                },
                None => self.unknown(r),
            }
            debug!(%r, "asking owner for another handle");
            self.link.send_ref_copy(r.owner, r);
            ack.wait();
        }
        DataRef::new(r, self.clone())
    }

    pub(crate) fn release(&self, r: Ref) {
        if r.owner == self.node {
            let dead = match self.entries.get_mut(&r) {
                Some(mut entry) => match entry.value_mut() {
                    Entry::Local { total, .. } => {
                        *total -= 1;
                        self.check_count(r, *total);
                        *total == 0
                    }
                    Entry::Remote { .. } => self.not_owned_here(r, "release"),
                },
                None => self.unknown(r),
            };
            if dead {
                debug!(%r, "last handle gone, payload freed");
                self.reap(r);
            }
        } else {
            let dead = match self.entries.get_mut(&r) {
                Some(mut entry) => match entry.value_mut() {
                    Entry::Remote { local, .. } => {
                        *local -= 1;
                        self.check_count(r, *local);
                        *local == 0
                    }
                    Entry::Local { .. } => self.not_owned_here(r, "release"),
                },
                None => self.unknown(r),
            };
            self.link.send_ref_update(r.owner, r, -1);
            if dead {
                self.reap(r);
            }
        }
    }

    pub(crate) fn get_data(self: &Arc<Self>, r: Ref) -> Arc<DataBox> {
        if r.owner == self.node {
            match self.entries.get(&r) {
                Some(entry) => match entry.value() {
                    Entry::Local { data, .. } => data.clone(),
                    Entry::Remote { .. } => self.not_owned_here(r, "get_data"),
                },
                None => self.unknown(r),
            }
        } else {
            let (promise, first) = match self.entries.get_mut(&r) {
                Some(mut entry) => match entry.value_mut() {
                    Entry::Remote {
                        cached: Some(data), ..
                    } => return data.clone(),
                    Entry::Remote { fetch, .. } => {
                        let promise = Arc::new(Promise::new());
                        let first = fetch.is_none();
                        fetch.get_or_insert_with(Vec::new).push(promise.clone());
                        (promise, first)
                    }
                    Entry::Local { .. } => self.not_owned_here(r, "get_data"),
                },
                None => self.unknown(r),
            };
            if first {
                debug!(%r, "fetching payload from owner");
                self.link.send_ref_fetch(r.owner, r);
            }
            promise.wait()
        }
    }

    pub(crate) fn take_data(self: &Arc<Self>, r: Ref) -> DataBox {
        if r.owner == self.node {
            let survivor: Option<Arc<DataBox>> = match self.entries.get_mut(&r) {
                Some(mut entry) => match entry.value_mut() {
                    Entry::Local { total, data } => {
                        *total -= 1;
                        self.check_count(r, *total);
                        (*total > 0).then(|| data.clone())
                    }
                    Entry::Remote { .. } => self.not_owned_here(r, "take_data"),
                },
                None => self.unknown(r),
            };
            match survivor {
                Some(data) => (self.interface(r.interface).copy)(&**data),
                // A zero total cannot come back: nothing is left to duplicate.
                None => match self.entries.remove(&r) {
                    Some((_, Entry::Local { data, .. })) => {
                        debug!(%r, "last handle taken, payload moved out");
                        self.unwrap_or_copy(r, data)
                    }
                    _ => self.unknown(r),
                },
            }
        } else {
            let data = self.get_data(r);
            let dead = match self.entries.get_mut(&r) {
                Some(mut entry) => match entry.value_mut() {
                    Entry::Remote { local, .. } => {
                        *local -= 1;
                        self.check_count(r, *local);
                        *local == 0
                    }
                    Entry::Local { .. } => self.not_owned_here(r, "take_data"),
                },
                None => self.unknown(r),
            };
            self.link.send_ref_update(r.owner, r, -1);
            if dead {
                self.reap(r);
            }
            self.unwrap_or_copy(r, data)
        }
    }

    /// Accounting for a handle consumed into a record frame. The unit
    /// stays counted in the owner total while in flight, so no message is
    /// sent for it.
    pub(crate) fn outgoing(&self, r: Ref) {
        if r.owner == self.node {
            // A local handle converts into an in-flight unit; the total
            // already covers both.
            return;
        }
        let dead = match self.entries.get_mut(&r) {
            Some(mut entry) => match entry.value_mut() {
                Entry::Remote { local, .. } => {
                    *local -= 1;
                    self.check_count(r, *local);
                    *local == 0
                }
                Entry::Local { .. } => self.not_owned_here(r, "outgoing"),
            },
            None => self.unknown(r),
        };
        if dead {
            self.reap(r);
        }
    }

    /// Adopts a unit that arrived inside a record frame. Count-neutral:
    /// the sender left the unit inside the owner total.
    pub fn adopt(self: &Arc<Self>, r: Ref) -> DataRef {
        if r.owner == self.node {
            if !self.entries.contains_key(&r) {
                self.unknown(r);
            }
        } else {
            let mut entry = self.entries.entry(r).or_insert_with(Entry::new_remote);
            match entry.value_mut() {
                Entry::Remote { local, .. } => *local += 1,
                Entry::Local { .. } => self.not_owned_here(r, "adopt"),
            }
        }
        trace!(%r, "adopted in-flight handle");
        DataRef::new(r, self.clone())
    }

    /// Applies a count adjustment sent by a remote node. Owner side only.
    pub fn handle_update(&self, r: Ref, delta: i32) {
        if r.owner != self.node {
            panic!("{}: count update for {r} landed off the owner", self.node);
        }
        let dead = match self.entries.get_mut(&r) {
            Some(mut entry) => match entry.value_mut() {
                Entry::Local { total, .. } => {
                    *total += delta;
                    self.check_count(r, *total);
                    trace!(%r, delta, total = *total, "count update");
                    *total == 0
                }
                Entry::Remote { .. } => self.not_owned_here(r, "count update"),
            },
            None => self.unknown(r),
        };
        if dead {
            debug!(%r, "last handle gone, payload freed");
            self.reap(r);
        }
    }

    /// Serves a payload fetch from `from`. Owner side only.
    pub fn handle_fetch(&self, from: NodeId, r: Ref) -> Result<(), WireError> {
        if r.owner != self.node {
            panic!("{}: payload fetch for {r} landed off the owner", self.node);
        }
        let data = match self.entries.get(&r) {
            Some(entry) => match entry.value() {
                Entry::Local { data, .. } => data.clone(),
                Entry::Remote { .. } => self.not_owned_here(r, "payload fetch"),
            },
            None => self.unknown(r),
        };
        let iface = self.interface(r.interface);
        let mut w = WireWriter::new();
        (iface.pack)(&**data, &mut w)?;
        debug!(%r, to = %from, bytes = w.len(), "serving payload fetch");
        self.link.send_ref_set(from, r, w.into_bytes());
        Ok(())
    }

    /// Installs a fetched payload and wakes everyone waiting on it.
    pub fn handle_set(&self, r: Ref, payload: &[u8]) -> Result<(), WireError> {
        if r.owner == self.node {
            panic!(
                "{}: payload transfer for {r} arrived back at the owner",
                self.node
            );
        }
        let iface = self.interface(r.interface);
        let mut reader = WireReader::new(payload);
        let data: Arc<DataBox> = Arc::new((iface.unpack)(&mut reader)?);
        let waiters = match self.entries.get_mut(&r) {
            Some(mut entry) => match entry.value_mut() {
                Entry::Remote { cached, fetch, .. } => {
                    *cached = Some(data.clone());
                    fetch.take()
                }
                Entry::Local { .. } => self.not_owned_here(r, "payload transfer"),
            },
            None => self.unknown(r),
        };
        match waiters {
            Some(waiters) => {
                debug!(%r, waiters = waiters.len(), "payload arrived");
                for promise in waiters {
                    promise.fulfill(data.clone());
                }
            }
            None => panic!(
                "{}: payload for {r} arrived with no fetch pending",
                self.node
            ),
        }
        Ok(())
    }

    /// Adds one handle unit on behalf of `from` and acknowledges it.
    /// Owner side only.
    pub fn handle_copy(&self, from: NodeId, r: Ref) {
        if r.owner != self.node {
            panic!("{}: copy request for {r} landed off the owner", self.node);
        }
        match self.entries.get_mut(&r) {
            Some(mut entry) => match entry.value_mut() {
                Entry::Local { total, .. } => {
                    *total += 1;
                    trace!(%r, from = %from, total = *total, "handle copied for remote node");
                }
                Entry::Remote { .. } => self.not_owned_here(r, "copy request"),
            },
            None => self.unknown(r),
        }
        self.link.send_ref_copy_ack(from, r);
    }

    /// Completes one pending duplicate round trip.
    pub fn handle_copy_ack(&self, r: Ref) {
        let ack = match self.entries.get_mut(&r) {
            Some(mut entry) => match entry.value_mut() {
                Entry::Remote { copy_acks, .. } => copy_acks.pop_front(),
                Entry::Local { .. } => self.not_owned_here(r, "copy ack"),
            },
            None => self.unknown(r),
        };
        match ack {
            Some(promise) => promise.fulfill(()),
            None => panic!("{}: copy ack for {r} with no duplicate pending", self.node),
        }
    }

    fn unwrap_or_copy(&self, r: Ref, data: Arc<DataBox>) -> DataBox {
        match Arc::try_unwrap(data) {
            Ok(data) => data,
            Err(shared) => (self.interface(r.interface).copy)(&**shared),
        }
    }

    fn reap(&self, r: Ref) {
        if self.entries.remove_if(&r, |_, entry| entry.is_dead()).is_some() {
            trace!(%r, "reference entry reaped");
        }
    }

    fn interface(&self, id: InterfaceId) -> &BoxInterface {
        match self.interfaces.get(id) {
            Some(iface) => iface,
            None => panic!("{}: no interface registered for id {}", self.node, id.0),
        }
    }

    fn check_count(&self, r: Ref, count: i32) {
        if count < 0 {
            panic!("{}: handle count for {r} went negative", self.node);
        }
    }

    fn unknown(&self, r: Ref) -> ! {
        panic!("{}: unknown reference {r}", self.node);
    }

    fn not_owned_here(&self, r: Ref, op: &str) -> ! {
        panic!(
            "{}: {op} found {r} on the wrong side of ownership",
            self.node
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::interface::DataAny;

    #[derive(Debug, Default)]
    struct MockLink {
        sent: Mutex<Vec<Sent>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Update { to: NodeId, r: Ref, delta: i32 },
        Fetch { to: NodeId, r: Ref },
        Set { to: NodeId, r: Ref, payload: Vec<u8> },
        Copy { to: NodeId, r: Ref },
        CopyAck { to: NodeId, r: Ref },
    }

    impl MockLink {
        fn snapshot(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl RefLink for MockLink {
        fn send_ref_update(&self, to: NodeId, r: Ref, delta: i32) {
            self.sent.lock().unwrap().push(Sent::Update { to, r, delta });
        }
        fn send_ref_fetch(&self, to: NodeId, r: Ref) {
            self.sent.lock().unwrap().push(Sent::Fetch { to, r });
        }
        fn send_ref_set(&self, to: NodeId, r: Ref, payload: Vec<u8>) {
            self.sent.lock().unwrap().push(Sent::Set { to, r, payload });
        }
        fn send_ref_copy(&self, to: NodeId, r: Ref) {
            self.sent.lock().unwrap().push(Sent::Copy { to, r });
        }
        fn send_ref_copy_ack(&self, to: NodeId, r: Ref) {
            self.sent.lock().unwrap().push(Sent::CopyAck { to, r });
        }
    }

    struct Tracked {
        value: i32,
        copies: Arc<AtomicUsize>,
        drops: Arc<AtomicUsize>,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.fetch_add(1, AtomicOrdering::SeqCst);
        }
    }

    fn copy_tracked(data: &DataAny) -> DataBox {
        let t = data.downcast_ref::<Tracked>().unwrap();
        t.copies.fetch_add(1, AtomicOrdering::SeqCst);
        Box::new(Tracked {
            value: t.value,
            copies: t.copies.clone(),
            drops: t.drops.clone(),
        })
    }

    fn pack_tracked(data: &DataAny, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_i32(data.downcast_ref::<Tracked>().unwrap().value);
        Ok(())
    }

    fn unpack_tracked(r: &mut WireReader<'_>) -> Result<DataBox, WireError> {
        Ok(Box::new(Tracked {
            value: r.get_i32()?,
            copies: Arc::new(AtomicUsize::new(0)),
            drops: Arc::new(AtomicUsize::new(0)),
        }))
    }

    fn tracked_value(data: &DataAny) -> i32 {
        data.downcast_ref::<Tracked>().unwrap().value
    }

    fn setup(node: NodeId) -> (Arc<RefTable>, Arc<MockLink>, InterfaceId) {
        let mut reg = InterfaceRegistry::new();
        let iface = reg.register(BoxInterface {
            copy: copy_tracked,
            pack: pack_tracked,
            unpack: unpack_tracked,
        });
        let link = Arc::new(MockLink::default());
        let table = RefTable::new(node, Arc::new(reg), link.clone());
        (table, link, iface)
    }

    fn tracked(value: i32) -> (DataBox, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let copies = Arc::new(AtomicUsize::new(0));
        let drops = Arc::new(AtomicUsize::new(0));
        let data = Box::new(Tracked {
            value,
            copies: copies.clone(),
            drops: drops.clone(),
        });
        (data, copies, drops)
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..400 {
            if cond() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn test_create_then_drop_frees_payload() {
        let (table, link, iface) = setup(NodeId(0));
        let (data, _copies, drops) = tracked(1);
        let handle = table.create(iface, data);
        assert_eq!(table.live_refs(), 1);
        drop(handle);
        assert_eq!(table.live_refs(), 0);
        assert_eq!(drops.load(AtomicOrdering::SeqCst), 1);
        assert!(link.snapshot().is_empty());
    }

    #[test]
    fn test_duplicate_on_owner_defers_free_to_last_drop() {
        let (table, _link, iface) = setup(NodeId(0));
        let (data, _copies, drops) = tracked(2);
        let a = table.create(iface, data);
        let b = a.duplicate();
        drop(a);
        assert_eq!(drops.load(AtomicOrdering::SeqCst), 0);
        drop(b);
        assert_eq!(drops.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(table.live_refs(), 0);
    }

    #[test]
    fn test_get_data_shares_without_copying() {
        let (table, _link, iface) = setup(NodeId(0));
        let (data, copies, _drops) = tracked(41);
        let handle = table.create(iface, data);
        let first = handle.get_data();
        let second = handle.get_data();
        assert_eq!(tracked_value(&**first), 41);
        assert_eq!(tracked_value(&**second), 41);
        assert_eq!(copies.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn test_take_data_moves_when_sole_handle() {
        let (table, _link, iface) = setup(NodeId(0));
        let (data, copies, drops) = tracked(7);
        let handle = table.create(iface, data);
        let taken = handle.take_data();
        assert_eq!(tracked_value(&*taken), 7);
        assert_eq!(copies.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(drops.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(table.live_refs(), 0);
    }

    #[test]
    fn test_take_data_copies_while_other_handles_remain() {
        let (table, _link, iface) = setup(NodeId(0));
        let (data, copies, _drops) = tracked(9);
        let a = table.create(iface, data);
        let b = a.duplicate();
        let taken = b.take_data();
        assert_eq!(tracked_value(&*taken), 9);
        assert_eq!(copies.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(tracked_value(&**a.get_data()), 9);
        assert_eq!(table.live_refs(), 1);
    }

    #[test]
    fn test_take_data_copies_while_shared_access_outstanding() {
        let (table, _link, iface) = setup(NodeId(0));
        let (data, copies, _drops) = tracked(5);
        let handle = table.create(iface, data);
        let shared = handle.get_data();
        let taken = handle.take_data();
        assert_eq!(tracked_value(&*taken), 5);
        assert_eq!(tracked_value(&**shared), 5);
        assert_eq!(copies.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn test_remote_updates_free_payload_at_zero() {
        let (table, link, iface) = setup(NodeId(0));
        let (data, _copies, drops) = tracked(3);
        let handle = table.create(iface, data);
        let r = handle.into_wire();
        // The unit is in flight; nothing was sent and nothing freed.
        assert!(link.snapshot().is_empty());
        assert_eq!(drops.load(AtomicOrdering::SeqCst), 0);
        table.handle_update(r, -1);
        assert_eq!(drops.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(table.live_refs(), 0);
    }

    #[test]
    fn test_handle_fetch_answers_with_packed_payload() {
        let (table, link, iface) = setup(NodeId(0));
        let (data, _copies, _drops) = tracked(41);
        let handle = table.create(iface, data);
        let r = handle.identity();
        table.handle_fetch(NodeId(5), r).unwrap();
        let sent = link.snapshot();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Sent::Set { to, r: sent_ref, payload } => {
                assert_eq!(*to, NodeId(5));
                assert_eq!(*sent_ref, r);
                let mut reader = WireReader::new(payload);
                assert_eq!(reader.get_i32().unwrap(), 41);
            }
            other => panic!("unexpected message {other:?}"),
        }
        // Serving a fetch does not consume the handle.
        assert_eq!(table.live_refs(), 1);
    }

    #[test]
    fn test_handle_copy_bumps_total_and_acks() {
        let (table, link, iface) = setup(NodeId(0));
        let (data, _copies, drops) = tracked(6);
        let handle = table.create(iface, data);
        let r = handle.identity();
        table.handle_copy(NodeId(3), r);
        assert_eq!(link.snapshot(), vec![Sent::CopyAck { to: NodeId(3), r }]);
        drop(handle);
        assert_eq!(drops.load(AtomicOrdering::SeqCst), 0);
        table.handle_update(r, -1);
        assert_eq!(drops.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn test_adopt_then_get_fetches_once_for_all_waiters() {
        let (table, link, iface) = setup(NodeId(1));
        let r = Ref {
            owner: NodeId(0),
            id: RefId(9),
            interface: iface,
        };
        let a = table.adopt(r);
        let b = table.adopt(r);

        let ta = {
            let link = link.clone();
            thread::spawn(move || {
                let data = a.get_data();
                assert!(!link.snapshot().is_empty());
                tracked_value(&**data)
            })
        };
        let tb = thread::spawn(move || tracked_value(&**b.get_data()));

        wait_until(|| {
            link.snapshot()
                .iter()
                .any(|m| matches!(m, Sent::Fetch { .. }))
        });
        let mut payload = WireWriter::new();
        payload.put_i32(41);
        table.handle_set(r, &payload.into_bytes()).unwrap();

        assert_eq!(ta.join().unwrap(), 41);
        assert_eq!(tb.join().unwrap(), 41);
        let fetches = link
            .snapshot()
            .iter()
            .filter(|m| matches!(m, Sent::Fetch { .. }))
            .count();
        assert_eq!(fetches, 1);
    }

    #[test]
    fn test_adopted_handle_release_notifies_owner() {
        let (table, link, iface) = setup(NodeId(2));
        let r = Ref {
            owner: NodeId(0),
            id: RefId(4),
            interface: iface,
        };
        let handle = table.adopt(r);
        drop(handle);
        assert_eq!(
            link.snapshot(),
            vec![Sent::Update {
                to: NodeId(0),
                r,
                delta: -1
            }]
        );
        assert_eq!(table.live_refs(), 0);
    }

    #[test]
    fn test_wire_transit_through_a_node_is_silent() {
        let (table, link, iface) = setup(NodeId(2));
        let r = Ref {
            owner: NodeId(0),
            id: RefId(11),
            interface: iface,
        };
        let handle = table.adopt(r);
        let out = handle.into_wire();
        assert_eq!(out, r);
        assert!(link.snapshot().is_empty());
        assert_eq!(table.live_refs(), 0);
    }

    #[test]
    fn test_duplicate_away_from_owner_waits_for_ack() {
        let (table, link, iface) = setup(NodeId(1));
        let r = Ref {
            owner: NodeId(0),
            id: RefId(2),
            interface: iface,
        };
        let handle = table.adopt(r);

        let dup = {
            let table = table.clone();
            thread::spawn(move || {
                let second = handle.duplicate();
                drop(second);
                drop(handle);
                table.live_refs()
            })
        };

        wait_until(|| {
            link.snapshot()
                .iter()
                .any(|m| matches!(m, Sent::Copy { .. }))
        });
        table.handle_copy_ack(r);
        assert_eq!(dup.join().unwrap(), 0);

        let updates = link
            .snapshot()
            .iter()
            .filter(|m| matches!(m, Sent::Update { delta: -1, .. }))
            .count();
        assert_eq!(updates, 2);
    }

    #[test]
    fn test_take_data_away_from_owner_releases_and_moves_cache() {
        let (table, link, iface) = setup(NodeId(1));
        let r = Ref {
            owner: NodeId(0),
            id: RefId(6),
            interface: iface,
        };
        let handle = table.adopt(r);

        let taker = thread::spawn(move || tracked_value(&*handle.take_data()));
        wait_until(|| {
            link.snapshot()
                .iter()
                .any(|m| matches!(m, Sent::Fetch { .. }))
        });
        let mut payload = WireWriter::new();
        payload.put_i32(13);
        table.handle_set(r, &payload.into_bytes()).unwrap();

        assert_eq!(taker.join().unwrap(), 13);
        assert_eq!(table.live_refs(), 0);
        assert!(link
            .snapshot()
            .iter()
            .any(|m| matches!(m, Sent::Update { delta: -1, .. })));
    }

    #[test]
    #[should_panic(expected = "unknown reference")]
    fn test_update_for_unknown_reference_panics() {
        let (table, _link, iface) = setup(NodeId(0));
        let r = Ref {
            owner: NodeId(0),
            id: RefId(99),
            interface: iface,
        };
        table.handle_update(r, -1);
    }
}
