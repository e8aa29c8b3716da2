//! The construction walk and its per-edge placement decisions.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};
use weir_record::Record;
use weir_stream::Stream;
use weir_types::{CreateNet, Dest, NodeId, OpId};

use crate::registry::{FunRegistry, NetFn};

/// Wire encoding of "no location": the construction's entry or return edge
/// is the process-global input or output rather than a node.
const LOC_NONE: NodeId = NodeId(-1);

fn loc_to_wire(loc: Option<NodeId>) -> NodeId {
    loc.unwrap_or(LOC_NONE)
}

fn loc_from_wire(loc: NodeId) -> Option<NodeId> {
    (loc.0 >= 0).then_some(loc)
}

/// Registration surface the walk hands stream endpoints to.
///
/// Implemented by the per-node manager layer. All methods must be
/// non-blocking; the walk may run on the input manager's own thread while it
/// rebuilds a fragment for an unbound destination.
pub trait RoutingPorts: Send + Sync {
    /// Binds `stream` as an outgoing endpoint: records read from it are
    /// forwarded to node `to` labelled with `dest`.
    fn new_out(&self, to: NodeId, dest: Dest, stream: Stream<Record>);

    /// Binds `stream` as an incoming endpoint: records arriving from node
    /// `from` labelled with `dest` are written into it.
    fn new_in(&self, from: NodeId, dest: Dest, stream: Stream<Record>);

    /// The network's entry edge materialized on this node.
    fn claim_global_input(&self, stream: Stream<Record>);

    /// The network's exit edge materialized on this node.
    fn claim_global_output(&self, stream: Stream<Record>);

    /// Asks `to` to rebuild a construction it has not seen yet.
    fn send_create_net(&self, to: NodeId, request: CreateNet);
}

/// Everything a construction walk needs from the node it runs on.
#[derive(Clone)]
pub struct RoutingEnv {
    pub ports: Arc<dyn RoutingPorts>,
    pub registry: Arc<FunRegistry>,
    /// The executing node.
    pub node: NodeId,
}

/// Placement state threaded through one network-construction walk.
///
/// The context tracks where the walk currently is, hands crossing streams to
/// the managers, and derives the [`Dest`] key for every boundary it crosses
/// from a walk counter that advances on each location change. Any node
/// replaying the same constructor re-derives the same keys.
pub struct RoutingContext {
    env: RoutingEnv,
    op: OpId,
    master: bool,
    location: Option<NodeId>,
    /// Where the construction's output returns to; `None` means it ends at
    /// the process-global output.
    return_loc: Option<NodeId>,
    /// Registry id of the constructor that can replay this scope.
    parent_fun: i32,
    dynamic_index: i32,
    /// Placement argument the scope's constructor was invoked with. Carried
    /// in every dest so a replay can pass the identical argument.
    dynamic_loc: NodeId,
    counter: i32,
    visited: HashSet<NodeId>,
}

impl RoutingContext {
    /// Context for a construction initiated on this node.
    ///
    /// The master walk is the only one that announces the construction to
    /// other nodes; replayed walks register endpoints silently.
    pub fn master(env: &RoutingEnv, op: OpId, fun: NetFn, tag: i32) -> Self {
        Self {
            env: env.clone(),
            op,
            master: true,
            location: None,
            return_loc: None,
            parent_fun: env.registry.id_of(fun),
            dynamic_index: 0,
            dynamic_loc: NodeId(tag),
            counter: 0,
            visited: HashSet::new(),
        }
    }

    pub fn op(&self) -> OpId {
        self.op
    }

    pub fn is_master(&self) -> bool {
        self.master
    }

    /// The walk's current placement; `None` before the first update.
    pub fn location(&self) -> Option<NodeId> {
        self.location
    }

    /// Moves the walk to `new_loc`, wiring up the stream boundary this
    /// implies.
    ///
    /// No-op when the location does not change. Otherwise one index is drawn
    /// from the walk counter and one of three things happens:
    ///
    /// - the walk leaves this node: `stream` is handed to the output manager
    ///   and the continuation is `None` until the walk comes back,
    /// - the walk arrives at this node: a stream is materialized if the
    ///   caller has none (unbounded, since the transport owns backpressure)
    ///   and registered with the input manager, keyed by the node the walk
    ///   came from; if the walk came from nowhere the stream is the
    ///   process-global input instead,
    /// - neither end is local: only the location is recorded.
    pub fn update(
        &mut self,
        stream: Option<Stream<Record>>,
        new_loc: NodeId,
    ) -> Option<Stream<Record>> {
        let stream = self.cross(stream, Some(new_loc));
        self.announce(new_loc);
        stream
    }

    /// Finishes the walk, routing the dangling output back to the location
    /// the construction returns to.
    ///
    /// A construction with no return location ends at the process-global
    /// output, which is claimed on whichever node the walk stopped. That
    /// transition draws no counter index since no paired endpoint exists.
    pub fn end(&mut self, stream: Option<Stream<Record>>) -> Option<Stream<Record>> {
        self.cross(stream, self.return_loc)
    }

    /// Derives the context for one dynamically created sub-network (a star
    /// or split branch).
    ///
    /// The branch gets a fresh walk counter and its own dynamic stamp while
    /// this context stays untouched; dropping the branch context restores
    /// nothing because nothing was changed. `loc` must be the placement
    /// argument the branch constructor is invoked with, so a node that later
    /// rebuilds the branch from one of its dests can repeat the call.
    ///
    /// Branch walks never announce: a `create_network` request names only a
    /// constructor, which is not enough to rebuild a branch (the dynamic
    /// stamp would be lost), so remote branch fragments are built lazily
    /// from the first record that reaches them.
    pub fn branch(&self, index: i32, loc: NodeId, fun: NetFn) -> RoutingContext {
        RoutingContext {
            env: self.env.clone(),
            op: self.op,
            master: false,
            location: self.location,
            return_loc: Some(self.env.node),
            parent_fun: self.env.registry.id_of(fun),
            dynamic_index: index,
            dynamic_loc: loc,
            counter: 0,
            visited: HashSet::new(),
        }
    }

    fn cross(
        &mut self,
        stream: Option<Stream<Record>>,
        target: Option<NodeId>,
    ) -> Option<Stream<Record>> {
        if self.location == target {
            return stream;
        }
        let here = self.env.node;
        let previous = self.location;
        self.location = target;

        let Some(new_loc) = target else {
            if previous == Some(here) {
                let stream = stream.unwrap_or_else(|| Stream::new(0));
                trace!(op = %self.op, "walk ended here, claiming global output");
                self.env.ports.claim_global_output(stream);
                return None;
            }
            return stream;
        };

        let index = self.counter;
        self.counter += 1;

        if previous == Some(here) {
            let dest = self.dest(index);
            let Some(stream) = stream else {
                panic!("stream for {dest} was already handed off");
            };
            trace!(%dest, to = %new_loc, "walk leaves this node");
            self.env.ports.new_out(new_loc, dest, stream);
            None
        } else if new_loc == here {
            let stream = stream.unwrap_or_else(|| Stream::new(0));
            match previous {
                None => {
                    trace!(op = %self.op, "walk starts here, claiming global input");
                    self.env.ports.claim_global_input(stream.clone());
                }
                Some(from) => {
                    let dest = self.dest(index);
                    trace!(%dest, %from, "walk arrives at this node");
                    self.env.ports.new_in(from, dest, stream.clone());
                }
            }
            Some(stream)
        } else {
            stream
        }
    }

    fn dest(&self, index: i32) -> Dest {
        Dest {
            op: self.op,
            index,
            parent: self.parent_fun,
            parent_node: loc_to_wire(self.return_loc),
            dynamic_index: self.dynamic_index,
            dynamic_loc: self.dynamic_loc,
        }
    }

    fn announce(&mut self, new_loc: NodeId) {
        if !self.master || new_loc == self.env.node || !self.visited.insert(new_loc) {
            return;
        }
        let request = CreateNet {
            op: self.op,
            parent_loc: loc_to_wire(self.return_loc),
            tag: self.dynamic_loc.0,
            fun: self.env.registry.name_by_id(self.parent_fun),
        };
        debug!(op = %self.op, to = %new_loc, fun = %request.fun, "announcing construction");
        self.env.ports.send_create_net(new_loc, request);
    }
}

impl fmt::Debug for RoutingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingContext")
            .field("op", &self.op)
            .field("master", &self.master)
            .field("location", &self.location)
            .field("counter", &self.counter)
            .finish()
    }
}

/// Rebuilds an announced construction on this node.
///
/// Runs the named constructor with a non-master context so the rebuild
/// registers local endpoints without fanning out further announcements. The
/// replayed walk performs the same crossings as the master's, so the derived
/// dest keys line up with the records that will arrive for them.
pub fn unfold_network(env: &RoutingEnv, request: CreateNet) {
    let (parent_fun, fun) = env.registry.resolve(&request.fun);
    debug!(op = %request.op, fun = %request.fun, "rebuilding announced construction");
    let mut ctx = RoutingContext {
        env: env.clone(),
        op: request.op,
        master: false,
        location: None,
        return_loc: loc_from_wire(request.parent_loc),
        parent_fun,
        dynamic_index: 0,
        dynamic_loc: NodeId(request.tag),
        counter: 0,
        visited: HashSet::new(),
    };
    let out = fun(None, &mut ctx, NodeId(request.tag));
    ctx.end(out);
}

/// Rebuilds the fragment owning `dest` because a record arrived for it
/// before any local registration.
///
/// The dest carries everything needed: the constructor that created the
/// fragment, the dynamic stamp of its branch, and the location its output
/// returns to. The walk starts from `from`, the node the record came from,
/// which is where the fragment's input crosses over.
pub fn unfold_dynamic(env: &RoutingEnv, from: NodeId, dest: Dest) {
    let fun = env.registry.fun_by_id(dest.parent);
    debug!(%dest, %from, "rebuilding fragment for unbound destination");
    let mut ctx = RoutingContext {
        env: env.clone(),
        op: dest.op,
        master: false,
        location: Some(from),
        return_loc: loc_from_wire(dest.parent_node),
        parent_fun: dest.parent,
        dynamic_index: dest.dynamic_index,
        dynamic_loc: dest.dynamic_loc,
        counter: 0,
        visited: HashSet::new(),
    };
    let out = fun(None, &mut ctx, dest.dynamic_loc);
    ctx.end(out);
}
