//! Reference-counted ownership of data shared across nodes.
//!
//! Record fields do not carry payloads over the wire; they carry [`Ref`]
//! identities. The payload stays on the node that created it (the owner)
//! until some other node actually demands the bytes, at which point they
//! are fetched once and cached. What keeps the payload alive is a handle
//! count maintained on the owner: every live [`DataRef`] anywhere in the
//! cluster, and every identity currently in flight inside a record,
//! contributes one unit. When the count reaches zero the payload is freed.
//!
//! The [`RefTable`] is the per-node half of this protocol. Operator-facing
//! operations ([`DataRef::get_data`], [`DataRef::take_data`],
//! [`DataRef::duplicate`]) may block while the owner is consulted;
//! message-facing operations (`RefTable::handle_*`) never block and are
//! driven by the input manager as reference-protocol messages arrive.
//!
//! [`Ref`]: weir_types::Ref

mod handle;
mod interface;
mod link;
mod promise;
mod table;

pub use handle::DataRef;
pub use interface::{BoxInterface, DataAny, DataBox, InterfaceRegistry};
pub use link::RefLink;
pub use table::RefTable;
