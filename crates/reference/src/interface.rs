use std::any::Any;
use std::fmt;

use weir_types::{InterfaceId, WireError, WireReader, WireWriter};

/// Opaque payload as stored and moved by the runtime.
///
/// The runtime never looks inside; operator code downcasts to its concrete
/// type, and the registered [`BoxInterface`] callbacks handle copying and
/// wire transfer. Deallocation needs no callback, the box drops itself.
pub type DataBox = Box<dyn Any + Send + Sync>;

/// Borrowed view of a [`DataBox`] payload.
pub type DataAny = dyn Any + Send + Sync;

/// Callbacks one language interface registers for its payload kind.
#[derive(Clone, Copy)]
pub struct BoxInterface {
    /// Deep copy. Called when exclusive data is demanded while other
    /// holders of the same payload remain.
    pub copy: fn(&DataAny) -> DataBox,
    /// Packs the payload into a data transfer message.
    pub pack: fn(&DataAny, &mut WireWriter) -> Result<(), WireError>,
    /// Rebuilds a payload from transfer bytes.
    pub unpack: fn(&mut WireReader<'_>) -> Result<DataBox, WireError>,
}

impl fmt::Debug for BoxInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BoxInterface { .. }")
    }
}

/// Interface callbacks indexed by [`InterfaceId`], in registration order.
///
/// Every node registers the same interfaces in the same order during
/// startup, so the ids embedded in wire identities resolve identically
/// everywhere. Built once, then shared read-only.
#[derive(Debug, Default)]
pub struct InterfaceRegistry {
    entries: Vec<BoxInterface>,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an interface and returns the id it will be known by on the
    /// wire.
    pub fn register(&mut self, interface: BoxInterface) -> InterfaceId {
        let id = InterfaceId(self.entries.len() as i32);
        self.entries.push(interface);
        id
    }

    pub fn get(&self, id: InterfaceId) -> Option<&BoxInterface> {
        usize::try_from(id.0).ok().and_then(|i| self.entries.get(i))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
