//! Names network-constructor functions so they can cross process images.

use std::sync::RwLock;

use weir_record::Record;
use weir_stream::Stream;
use weir_types::{FunName, NodeId};

use crate::context::RoutingContext;

/// A network-constructor function.
///
/// Takes the fragment's input stream (`None` when the walk has not reached
/// this node yet), the routing context, and the placement argument the
/// fragment was instantiated with; returns the fragment's output stream, or
/// `None` when the output was handed off to the output manager.
pub type NetFn =
    fn(Option<Stream<Record>>, &mut RoutingContext, NodeId) -> Option<Stream<Record>>;

struct Library {
    name: String,
    base: usize,
    len: usize,
}

struct Registered {
    fun: NetFn,
    library: usize,
    index: i32,
}

/// Registry mapping constructor functions to stable cross-node ids.
///
/// Function pointers mean nothing on another node, so constructors travel as
/// a [`FunName`] on the wire and as a small flat id inside
/// [`Dest`](weir_types::Dest) keys. Flat ids are assigned in registration
/// order; every node must register the same libraries in the same order
/// before starting its managers, or the ids diverge and routing breaks.
pub struct FunRegistry {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    libraries: Vec<Library>,
    funs: Vec<Registered>,
}

impl FunRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Registers a library of constructors under `name`.
    ///
    /// Panics if the library name is already taken; registration happens once
    /// at bootstrap and a clash means the node was configured twice.
    pub fn register(&self, name: &str, funs: &[NetFn]) {
        let mut inner = self.inner.write().unwrap();
        if inner.libraries.iter().any(|lib| lib.name == name) {
            panic!("constructor library {name:?} registered twice");
        }

        let library = inner.libraries.len();
        let base = inner.funs.len();
        inner.libraries.push(Library {
            name: name.to_owned(),
            base,
            len: funs.len(),
        });
        for (index, &fun) in funs.iter().enumerate() {
            inner.funs.push(Registered {
                fun,
                library,
                index: index as i32,
            });
        }
    }

    /// Looks up the constructor registered under flat id `id`.
    ///
    /// Panics if the id is unknown: a foreign id can only reach this node
    /// inside a wire message, so a miss means the cluster's nodes did not
    /// register identical libraries.
    pub fn fun_by_id(&self, id: i32) -> NetFn {
        let inner = self.inner.read().unwrap();
        match usize::try_from(id).ok().and_then(|i| inner.funs.get(i)) {
            Some(entry) => entry.fun,
            None => panic!("no constructor registered under id {id}"),
        }
    }

    /// Returns the flat id `fun` was registered under.
    pub fn id_of(&self, fun: NetFn) -> i32 {
        let inner = self.inner.read().unwrap();
        match inner
            .funs
            .iter()
            .position(|entry| entry.fun as usize == fun as usize)
        {
            Some(id) => id as i32,
            None => panic!("constructor function was never registered"),
        }
    }

    /// Returns the wire name of the constructor with flat id `id`.
    pub fn name_by_id(&self, id: i32) -> FunName {
        let inner = self.inner.read().unwrap();
        match usize::try_from(id).ok().and_then(|i| inner.funs.get(i)) {
            Some(entry) => FunName::new(&inner.libraries[entry.library].name, entry.index),
            None => panic!("no constructor registered under id {id}"),
        }
    }

    /// Resolves a wire name to its flat id and function.
    pub fn resolve(&self, name: &FunName) -> (i32, NetFn) {
        let inner = self.inner.read().unwrap();
        let library = match inner.libraries.iter().find(|lib| lib.name == name.library) {
            Some(lib) => lib,
            None => panic!("unknown constructor library {:?}", name.library),
        };
        let offset = usize::try_from(name.index)
            .ok()
            .filter(|&i| i < library.len);
        match offset {
            Some(i) => {
                let id = library.base + i;
                (id as i32, inner.funs[id].fun)
            }
            None => panic!("no constructor {} in library {:?}", name.index, name.library),
        }
    }
}

impl Default for FunRegistry {
    fn default() -> Self {
        Self::new()
    }
}
