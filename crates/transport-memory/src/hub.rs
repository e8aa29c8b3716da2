use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};

use weir_transport::{Link, LinkError};
use weir_types::NodeId;

type Envelope = (NodeId, Vec<u8>);

/// A copy of one frame in transit, as seen by a tapped hub's observer.
#[derive(Debug, Clone)]
pub struct TapFrame {
    pub from: NodeId,
    pub to: NodeId,
    pub frame: Vec<u8>,
}

impl TapFrame {
    /// The frame's message tag byte, for dispatch-level assertions.
    pub fn tag(&self) -> Option<u8> {
        self.frame.first().copied()
    }
}

/// Builds the links of an in-process full mesh.
pub struct MemoryHub {
    links: Vec<MemoryLink>,
}

impl MemoryHub {
    /// A mesh of `nodes` links, node ids `0..nodes`.
    pub fn new(nodes: usize) -> Self {
        Self::build(nodes, None)
    }

    /// Like [`new`](Self::new), but every frame is also mirrored to the
    /// returned observer channel.
    pub fn tapped(nodes: usize) -> (Self, Receiver<TapFrame>) {
        let (tap_tx, tap_rx) = unbounded();
        (Self::build(nodes, Some(tap_tx)), tap_rx)
    }

    fn build(nodes: usize, tap: Option<Sender<TapFrame>>) -> Self {
        let mut peers = Vec::with_capacity(nodes);
        let mut inboxes = Vec::with_capacity(nodes);
        for _ in 0..nodes {
            let (tx, rx) = unbounded::<Envelope>();
            peers.push(tx);
            inboxes.push(rx);
        }
        let peers = Arc::new(peers);
        let links = inboxes
            .into_iter()
            .enumerate()
            .map(|(node, inbox)| MemoryLink {
                node: NodeId(node as i32),
                peers: peers.clone(),
                inbox,
                tap: tap.clone(),
            })
            .collect();
        Self { links }
    }

    /// Hands out the per-node links, index position matching node id.
    pub fn into_links(self) -> Vec<MemoryLink> {
        self.links
    }
}

/// One node's endpoint in a [`MemoryHub`] mesh.
pub struct MemoryLink {
    node: NodeId,
    peers: Arc<Vec<Sender<Envelope>>>,
    inbox: Receiver<Envelope>,
    tap: Option<Sender<TapFrame>>,
}

impl Link for MemoryLink {
    fn node(&self) -> NodeId {
        self.node
    }

    fn node_count(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, to: NodeId, frame: Vec<u8>) -> Result<(), LinkError> {
        let peer = usize::try_from(to.0)
            .ok()
            .and_then(|i| self.peers.get(i))
            .ok_or(LinkError::UnknownPeer { node: to })?;
        if let Some(tap) = &self.tap {
            // Observer may be gone; the mesh still works.
            let _ = tap.send(TapFrame {
                from: self.node,
                to,
                frame: frame.clone(),
            });
        }
        peer.send((self.node, frame))
            .map_err(|_| LinkError::Closed)
    }

    fn recv(&self) -> Result<(NodeId, Vec<u8>), LinkError> {
        self.inbox.recv().map_err(|_| LinkError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_frames_arrive_in_send_order() {
        let mut links = MemoryHub::new(2).into_links();
        let b = links.remove(1);
        let a = links.remove(0);
        for payload in [vec![1], vec![2], vec![3]] {
            a.send(NodeId(1), payload).unwrap();
        }
        assert_eq!(b.recv().unwrap(), (NodeId(0), vec![1]));
        assert_eq!(b.recv().unwrap(), (NodeId(0), vec![2]));
        assert_eq!(b.recv().unwrap(), (NodeId(0), vec![3]));
    }

    #[test]
    fn test_recv_reports_the_sender() {
        let mut links = MemoryHub::new(3).into_links();
        let c = links.remove(2);
        let b = links.remove(1);
        let a = links.remove(0);
        a.send(NodeId(2), vec![10]).unwrap();
        b.send(NodeId(2), vec![20]).unwrap();

        let mut seen = vec![c.recv().unwrap(), c.recv().unwrap()];
        seen.sort();
        assert_eq!(seen, vec![(NodeId(0), vec![10]), (NodeId(1), vec![20])]);
    }

    #[test]
    fn test_self_send_is_delivered() {
        let links = MemoryHub::new(1).into_links();
        let a = &links[0];
        a.send(NodeId(0), vec![9]).unwrap();
        assert_eq!(a.recv().unwrap(), (NodeId(0), vec![9]));
    }

    #[test]
    fn test_unknown_peer_is_an_error() {
        let links = MemoryHub::new(2).into_links();
        let err = links[0].send(NodeId(5), vec![1]).unwrap_err();
        assert_eq!(err, LinkError::UnknownPeer { node: NodeId(5) });
        let err = links[0].send(NodeId(-1), vec![1]).unwrap_err();
        assert_eq!(err, LinkError::UnknownPeer { node: NodeId(-1) });
    }

    #[test]
    fn test_send_to_dropped_node_is_closed() {
        let mut links = MemoryHub::new(2).into_links();
        drop(links.remove(1));
        assert_eq!(links[0].send(NodeId(1), vec![1]).unwrap_err(), LinkError::Closed);
    }

    #[test]
    fn test_recv_blocks_until_a_frame_arrives() {
        let mut links = MemoryHub::new(2).into_links();
        let b = links.remove(1);
        let a = links.remove(0);
        let receiver = thread::spawn(move || b.recv().unwrap());
        thread::sleep(Duration::from_millis(20));
        a.send(NodeId(1), vec![7]).unwrap();
        assert_eq!(receiver.join().unwrap(), (NodeId(0), vec![7]));
    }

    #[test]
    fn test_tap_observes_every_frame() {
        let (hub, tap) = MemoryHub::tapped(2);
        let mut links = hub.into_links();
        let b = links.remove(1);
        let a = links.remove(0);

        a.send(NodeId(1), vec![0x09]).unwrap();
        b.recv().unwrap();
        b.send(NodeId(0), vec![0x02, 0xFF]).unwrap();
        a.recv().unwrap();

        let first = tap.recv().unwrap();
        assert_eq!(first.from, NodeId(0));
        assert_eq!(first.to, NodeId(1));
        assert_eq!(first.tag(), Some(0x09));
        let second = tap.recv().unwrap();
        assert_eq!(second.from, NodeId(1));
        assert_eq!(second.frame, vec![0x02, 0xFF]);
    }
}
