use std::fmt;
use std::sync::Arc;

use weir_types::{InterfaceId, Ref};

use crate::interface::DataBox;
use crate::table::RefTable;

/// Owning handle on a piece of reference-counted data.
///
/// Each live handle contributes one unit to the owner-side total for its
/// data; dropping the handle gives the unit back. Handles are deliberately
/// not `Clone`: another unit has to be asked for with
/// [`duplicate`](Self::duplicate) because, away from the owner, it costs a
/// round trip.
pub struct DataRef {
    identity: Ref,
    table: Arc<RefTable>,
    detached: bool,
}

impl DataRef {
    pub(crate) fn new(identity: Ref, table: Arc<RefTable>) -> Self {
        Self {
            identity,
            table,
            detached: false,
        }
    }

    /// The cluster-wide identity this handle holds a unit of.
    pub fn identity(&self) -> Ref {
        self.identity
    }

    pub fn interface(&self) -> InterfaceId {
        self.identity.interface
    }

    /// Creates one more handle on the same data.
    ///
    /// On the owner this is a counter bump. Anywhere else it blocks until
    /// the owner has acknowledged the extra unit, so the new handle can
    /// never race the countdown of the old ones.
    pub fn duplicate(&self) -> DataRef {
        self.table.duplicate(self.identity)
    }

    /// Shared access to the payload.
    ///
    /// On a node that has never seen the bytes this blocks while they are
    /// fetched from the owner; the fetched payload is cached for as long
    /// as this node holds handles. The handle count is unaffected.
    pub fn get_data(&self) -> Arc<DataBox> {
        self.table.get_data(self.identity)
    }

    /// Consumes the handle and yields the payload exclusively.
    ///
    /// The payload is moved out when nothing else is holding it and
    /// deep-copied through the interface otherwise. Blocks like
    /// [`get_data`](Self::get_data) if the bytes are not local yet.
    pub fn take_data(mut self) -> DataBox {
        self.detached = true;
        self.table.take_data(self.identity)
    }

    /// Consumes the handle into its bare identity for the wire.
    ///
    /// The unit this handle held rides along with the identity inside the
    /// carrying record, so no update message is sent; the receiver adopts
    /// it with [`RefTable::adopt`].
    pub fn into_wire(mut self) -> Ref {
        self.detached = true;
        self.table.outgoing(self.identity);
        self.identity
    }
}

impl Drop for DataRef {
    fn drop(&mut self) {
        if !self.detached {
            self.table.release(self.identity);
        }
    }
}

impl fmt::Debug for DataRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataRef({})", self.identity)
    }
}
