//! Node lifecycle: wiring, construction, startup and shutdown.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info};
use weir_record::Record;
use weir_reference::{InterfaceRegistry, RefTable};
use weir_routing::{FunRegistry, NetFn, RoutingContext, RoutingEnv, RoutingPorts};
use weir_stream::Stream;
use weir_transport::{Link, Message};
use weir_types::{NodeId, OpId};

use crate::config::RuntimeConfig;
use crate::input::InputManager;
use crate::link_handle::LinkHandle;
use crate::output::{OutputHandle, OutputManager};
use crate::ports::NodePorts;

/// One node of a distributed run.
///
/// Lifecycle: [`init`](Self::init) wires the managers to the transport,
/// [`construct`](Self::construct) runs root constructions (root node only,
/// before [`start`](Self::start)), `start` spawns the manager threads,
/// [`global_stop`](Self::global_stop) initiates cluster-wide shutdown and
/// [`wait_exit`](Self::wait_exit) joins the threads.
///
/// Root constructions must finish before `start`: the walk registers
/// incoming bindings from the calling thread, and the input manager only
/// sees them once it begins dispatching. Frames that arrive in the
/// meantime simply wait in the transport inbox.
pub struct Runtime {
    node: NodeId,
    link: LinkHandle,
    refs: Arc<RefTable>,
    registry: Arc<FunRegistry>,
    ports: Arc<NodePorts>,
    output_handle: OutputHandle,
    output_manager: Option<OutputManager>,
    raw_link: Arc<dyn Link>,
    config: RuntimeConfig,
    next_op: AtomicU32,
    started: AtomicBool,
    threads: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Wires a node's runtime to its transport link.
    ///
    /// Every node of a run must register the same interfaces and the same
    /// constructor libraries in the same order; ids on the wire are
    /// positional.
    pub fn init(
        link: Arc<dyn Link>,
        interfaces: Arc<InterfaceRegistry>,
        registry: Arc<FunRegistry>,
        config: RuntimeConfig,
    ) -> Self {
        let handle = LinkHandle::new(link.clone());
        let node = handle.node();
        let refs = RefTable::new(node, interfaces, Arc::new(handle.clone()));
        let (output_manager, output_handle) = OutputManager::new(handle.clone());
        let ports = Arc::new(NodePorts::new(handle.clone(), output_handle.clone()));
        info!(%node, nodes = handle.node_count(), "runtime initialized");
        Self {
            node,
            link: handle,
            refs,
            registry,
            ports,
            output_handle,
            output_manager: Some(output_manager),
            raw_link: link,
            config,
            next_op: AtomicU32::new(1),
            started: AtomicBool::new(false),
            threads: Vec::new(),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// This node's reference table.
    pub fn refs(&self) -> &Arc<RefTable> {
        &self.refs
    }

    /// Runs a master construction walk of `fun` with placement argument
    /// `tag`, announcing it to every node the walk touches.
    ///
    /// # Panics
    ///
    /// Panics after [`start`](Self::start): master walks register
    /// endpoints from the calling thread and would race arriving records.
    pub fn construct(&self, fun: NetFn, tag: i32) {
        if self.started.load(Ordering::SeqCst) {
            panic!("{}: construct after start", self.node);
        }
        let op = OpId::new(self.node, self.next_op.fetch_add(1, Ordering::Relaxed));
        debug!(node = %self.node, %op, tag, "running root construction");
        let env = self.env();
        let mut ctx = RoutingContext::master(&env, op, fun, tag);
        let out = fun(None, &mut ctx, NodeId(tag));
        ctx.end(out);
    }

    /// Spawns the input and output manager threads.
    pub fn start(&mut self) {
        if self.started.swap(true, Ordering::SeqCst) {
            panic!("{}: runtime started twice", self.node);
        }
        let output = self
            .output_manager
            .take()
            .unwrap_or_else(|| panic!("{}: output manager already taken", self.node));
        let name = self
            .config
            .output
            .thread_name
            .clone()
            .unwrap_or_else(|| format!("weir-output-{}", self.node.0));
        let worker = thread::Builder::new()
            .name(name)
            .spawn(move || output.run())
            .unwrap_or_else(|err| panic!("spawning the output manager failed: {err}"));
        self.threads.push(worker);

        let input = InputManager::new(
            self.raw_link.clone(),
            self.link.clone(),
            self.refs.clone(),
            self.env(),
            self.ports.registrations(),
            self.output_handle.clone(),
            self.config.input.clone(),
        );
        let name = self
            .config
            .input
            .thread_name
            .clone()
            .unwrap_or_else(|| format!("weir-input-{}", self.node.0));
        let worker = thread::Builder::new()
            .name(name)
            .spawn(move || input.run())
            .unwrap_or_else(|err| panic!("spawning the input manager failed: {err}"));
        self.threads.push(worker);
    }

    /// The network's entry stream, if a construction placed it on this
    /// node.
    pub fn global_input(&self) -> Option<Stream<Record>> {
        self.ports.global_input()
    }

    /// The network's exit stream, if a construction placed it on this
    /// node.
    pub fn global_output(&self) -> Option<Stream<Record>> {
        self.ports.global_output()
    }

    /// Initiates cluster-wide shutdown by sending `stop` to every node,
    /// this one last.
    ///
    /// Call on the root once all traffic has terminated; each node's
    /// managers drain what is left and exit.
    pub fn global_stop(&self) {
        info!(node = %self.node, "broadcasting stop");
        let count = self.raw_link.node_count() as i32;
        for peer in (0..count).map(NodeId).filter(|&peer| peer != self.node) {
            self.link.send(peer, Message::Stop);
        }
        self.link.send(self.node, Message::Stop);
    }

    /// Blocks until both manager threads have exited; propagates their
    /// panics.
    pub fn wait_exit(&mut self) {
        for worker in self.threads.drain(..) {
            if let Err(panic) = worker.join() {
                std::panic::resume_unwind(panic);
            }
        }
        info!(node = %self.node, "runtime exited");
    }

    fn env(&self) -> RoutingEnv {
        RoutingEnv {
            ports: self.ports.clone() as Arc<dyn RoutingPorts>,
            registry: self.registry.clone(),
            node: self.node,
        }
    }
}
