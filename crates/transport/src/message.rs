use std::sync::Arc;

use weir_record::Record;
use weir_reference::RefTable;
use weir_types::{CreateNet, Dest, Ref, WireError, WireReader, WireWriter};

/// Everything one node can say to another (or, for [`Update`], to
/// itself).
///
/// # Wire Format
///
/// ```text
/// frame          := [tag: u8][payload]
/// rec            := [dest: 28 bytes][record frame]
/// block/unblock  := [dest: 28 bytes]
/// ref_set        := [ref: 16 bytes][payload: u32-prefixed bytes]
/// ref_fetch      := [ref: 16 bytes]
/// ref_update     := [ref: 16 bytes][delta: i32]
/// ref_copy/_ack  := [ref: 16 bytes]
/// update, stop   := (no payload)
/// create_network := [op: u64][parent_loc: i32][tag: i32][fun name]
/// ```
///
/// [`Update`]: Message::Update
#[derive(Debug)]
pub enum Message {
    /// A record for a routed destination.
    Rec { dest: Dest, record: Record },
    /// Receiver-side flow control: stop sending for this destination.
    Block { dest: Dest },
    /// Lifts an earlier [`Block`](Message::Block).
    Unblock { dest: Dest },
    /// Payload bytes answering a fetch.
    RefSet { r: Ref, payload: Vec<u8> },
    /// Asks the owner for payload bytes.
    RefFetch { r: Ref },
    /// Handle-count adjustment for the owner.
    RefUpdate { r: Ref, delta: i32 },
    /// Asks the owner to add a handle unit for the sender.
    RefCopy { r: Ref },
    /// Confirms a [`RefCopy`](Message::RefCopy).
    RefCopyAck { r: Ref },
    /// Self-addressed nudge: re-examine blocked destinations.
    Update,
    /// Orderly shutdown of the receiving node's managers.
    Stop,
    /// Instructs the receiver to replay a network constructor.
    CreateNetwork(CreateNet),
}

/// Frame tag bytes. Public so tests can classify captured frames without
/// decoding them (decoding a `rec` frame adopts its references).
pub mod tags {
    pub const REC: u8 = 0;
    pub const BLOCK: u8 = 1;
    pub const UNBLOCK: u8 = 2;
    pub const REF_SET: u8 = 3;
    pub const REF_FETCH: u8 = 4;
    pub const REF_UPDATE: u8 = 5;
    pub const REF_COPY: u8 = 6;
    pub const REF_COPY_ACK: u8 = 7;
    pub const UPDATE: u8 = 8;
    pub const STOP: u8 = 9;
    pub const CREATE_NETWORK: u8 = 10;
}

impl Message {
    /// Message kind for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::Rec { .. } => "rec",
            Message::Block { .. } => "block",
            Message::Unblock { .. } => "unblock",
            Message::RefSet { .. } => "ref_set",
            Message::RefFetch { .. } => "ref_fetch",
            Message::RefUpdate { .. } => "ref_update",
            Message::RefCopy { .. } => "ref_copy",
            Message::RefCopyAck { .. } => "ref_copy_ack",
            Message::Update => "update",
            Message::Stop => "stop",
            Message::CreateNetwork(_) => "create_network",
        }
    }

    /// Packs the message into a frame, consuming it. A `rec` frame
    /// surrenders the record's field handles to the wire.
    pub fn encode(self) -> Result<Vec<u8>, WireError> {
        let mut w = WireWriter::new();
        match self {
            Message::Rec { dest, record } => {
                w.put_u8(tags::REC);
                dest.encode(&mut w);
                record.serialize(&mut w)?;
            }
            Message::Block { dest } => {
                w.put_u8(tags::BLOCK);
                dest.encode(&mut w);
            }
            Message::Unblock { dest } => {
                w.put_u8(tags::UNBLOCK);
                dest.encode(&mut w);
            }
            Message::RefSet { r, payload } => {
                w.put_u8(tags::REF_SET);
                r.encode(&mut w);
                w.put_bytes(&payload);
            }
            Message::RefFetch { r } => {
                w.put_u8(tags::REF_FETCH);
                r.encode(&mut w);
            }
            Message::RefUpdate { r, delta } => {
                w.put_u8(tags::REF_UPDATE);
                r.encode(&mut w);
                w.put_i32(delta);
            }
            Message::RefCopy { r } => {
                w.put_u8(tags::REF_COPY);
                r.encode(&mut w);
            }
            Message::RefCopyAck { r } => {
                w.put_u8(tags::REF_COPY_ACK);
                r.encode(&mut w);
            }
            Message::Update => w.put_u8(tags::UPDATE),
            Message::Stop => w.put_u8(tags::STOP),
            Message::CreateNetwork(create) => {
                w.put_u8(tags::CREATE_NETWORK);
                create.encode(&mut w);
            }
        }
        Ok(w.into_bytes())
    }

    /// Rebuilds a message from a frame. Field handles inside a `rec` frame
    /// are adopted into `refs`.
    pub fn decode(frame: &[u8], refs: &Arc<RefTable>) -> Result<Message, WireError> {
        let mut r = WireReader::new(frame);
        let message = match r.get_u8()? {
            tags::REC => Message::Rec {
                dest: Dest::decode(&mut r)?,
                record: Record::deserialize(&mut r, refs)?,
            },
            tags::BLOCK => Message::Block {
                dest: Dest::decode(&mut r)?,
            },
            tags::UNBLOCK => Message::Unblock {
                dest: Dest::decode(&mut r)?,
            },
            tags::REF_SET => Message::RefSet {
                r: Ref::decode(&mut r)?,
                payload: r.get_bytes()?.to_vec(),
            },
            tags::REF_FETCH => Message::RefFetch {
                r: Ref::decode(&mut r)?,
            },
            tags::REF_UPDATE => Message::RefUpdate {
                r: Ref::decode(&mut r)?,
                delta: r.get_i32()?,
            },
            tags::REF_COPY => Message::RefCopy {
                r: Ref::decode(&mut r)?,
            },
            tags::REF_COPY_ACK => Message::RefCopyAck {
                r: Ref::decode(&mut r)?,
            },
            tags::UPDATE => Message::Update,
            tags::STOP => Message::Stop,
            tags::CREATE_NETWORK => Message::CreateNetwork(CreateNet::decode(&mut r)?),
            tag => return Err(WireError::UnknownTag { tag }),
        };
        Ok(message)
    }
}
