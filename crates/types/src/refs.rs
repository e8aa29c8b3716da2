use std::fmt;

use crate::ids::{InterfaceId, NodeId, RefId};
use crate::wire::{WireError, WireReader, WireWriter};

/// Cluster-wide identity of a piece of reference-counted data.
///
/// The data itself lives on `owner`; everyone else holds only this identity
/// and fetches bytes on demand. `id` is allocated from a per-node counter
/// and never reused, so an identity observed on the wire is unambiguous for
/// the lifetime of the run. `interface` selects the pack/unpack callbacks
/// used when the payload does cross the wire.
///
/// # Wire Format
///
/// ```text
/// [owner: i32 LE][id: u64 LE][interface: i32 LE]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ref {
    pub owner: NodeId,
    pub id: RefId,
    pub interface: InterfaceId,
}

impl Ref {
    pub fn encode(&self, w: &mut WireWriter) {
        w.put_i32(self.owner.0);
        w.put_u64(self.id.0);
        w.put_i32(self.interface.0);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            owner: NodeId(r.get_i32()?),
            id: RefId(r.get_u64()?),
            interface: InterfaceId(r.get_i32()?),
        })
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:r{}", self.owner, self.id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_round_trip() {
        let r = Ref {
            owner: NodeId(3),
            id: RefId(0xDEAD_BEEF_0042),
            interface: InterfaceId(1),
        };
        let mut w = WireWriter::new();
        r.encode(&mut w);
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 16);
        let mut rd = WireReader::new(&bytes);
        assert_eq!(Ref::decode(&mut rd).unwrap(), r);
        assert!(rd.is_empty());
    }

    #[test]
    fn test_ref_display_names_owner_and_id() {
        let r = Ref {
            owner: NodeId(0),
            id: RefId(7),
            interface: InterfaceId(2),
        };
        assert_eq!(r.to_string(), "n0:r7");
    }
}
