//! Wire format for records.
//!
//! ```text
//! frame      := [descriptor: u8][payload]
//! data       := [interface: i32][mode: u8][fields][tags][btags]
//! fields     := [count: u32] ([name: i32][state: u8][ref: 16 bytes if set])*
//! tags/btags := [count: u32] ([name: i32][state: u8][value: i32 if set])*
//! sort_end   := [level: i32][num: i32]
//! ```
//!
//! `terminate` and `trigger_initializer` have no payload. `sync` and
//! `collect` have no wire form at all; asking for one is an error, not a
//! panic, so the caller can say which destination was involved.

use std::sync::Arc;

use weir_reference::RefTable;
use weir_types::{InterfaceId, Name, Ref, WireError, WireReader, WireWriter};

use crate::record::{DataMode, DataRecord, Entries, Record};

const DESC_DATA: u8 = 0;
const DESC_SORT_END: u8 = 3;
const DESC_TERMINATE: u8 = 4;
const DESC_TRIGGER: u8 = 5;

impl Record {
    /// Packs the record into `w`, consuming it. Every set field surrenders
    /// its handle to the wire; the receiver adopts them back in
    /// [`deserialize`](Self::deserialize).
    pub fn serialize(self, w: &mut WireWriter) -> Result<(), WireError> {
        match self {
            Record::Data(data) => {
                w.put_u8(DESC_DATA);
                serialize_data(data, w);
                Ok(())
            }
            Record::SortEnd { level, num } => {
                w.put_u8(DESC_SORT_END);
                w.put_i32(level);
                w.put_i32(num);
                Ok(())
            }
            Record::Terminate => {
                w.put_u8(DESC_TERMINATE);
                Ok(())
            }
            Record::TriggerInitializer => {
                w.put_u8(DESC_TRIGGER);
                Ok(())
            }
            Record::Sync { .. } => Err(WireError::UnsendableRecord { descriptor: "sync" }),
            Record::Collect { .. } => Err(WireError::UnsendableRecord {
                descriptor: "collect",
            }),
        }
    }

    /// Rebuilds a record from a frame, adopting every field handle into
    /// `refs`.
    pub fn deserialize(r: &mut WireReader<'_>, refs: &Arc<RefTable>) -> Result<Record, WireError> {
        match r.get_u8()? {
            DESC_DATA => Ok(Record::Data(deserialize_data(r, refs)?)),
            DESC_SORT_END => Ok(Record::SortEnd {
                level: r.get_i32()?,
                num: r.get_i32()?,
            }),
            DESC_TERMINATE => Ok(Record::Terminate),
            DESC_TRIGGER => Ok(Record::TriggerInitializer),
            value => Err(WireError::UnknownDescriptor { value }),
        }
    }
}

fn serialize_data(data: DataRecord, w: &mut WireWriter) {
    let (interface, mode, fields, tags, btags) = data.into_parts();
    w.put_i32(interface.0);
    w.put_u8(match mode {
        DataMode::Textual => 0,
        DataMode::Binary => 1,
    });

    w.put_u32(fields.len() as u32);
    for (name, value) in fields.list {
        name.encode(w);
        match value {
            Some(handle) => {
                w.put_u8(1);
                handle.into_wire().encode(w);
            }
            None => w.put_u8(0),
        }
    }
    serialize_values(tags, w);
    serialize_values(btags, w);
}

fn serialize_values(entries: Entries<i32>, w: &mut WireWriter) {
    w.put_u32(entries.len() as u32);
    for (name, value) in entries.list {
        name.encode(w);
        match value {
            Some(v) => {
                w.put_u8(1);
                w.put_i32(v);
            }
            None => w.put_u8(0),
        }
    }
}

fn deserialize_data(
    r: &mut WireReader<'_>,
    refs: &Arc<RefTable>,
) -> Result<DataRecord, WireError> {
    let interface = InterfaceId(r.get_i32()?);
    let mode = match r.get_u8()? {
        0 => DataMode::Textual,
        1 => DataMode::Binary,
        value => return Err(WireError::UnknownDataMode { value }),
    };

    let mut fields = Entries::new();
    let count = r.get_u32()?;
    for _ in 0..count {
        let name = Name::decode(r)?;
        if entry_set(r)? {
            fields.restore(name, Some(refs.adopt(Ref::decode(r)?)));
        } else {
            fields.restore(name, None);
        }
    }
    let tags = deserialize_values(r)?;
    let btags = deserialize_values(r)?;
    Ok(DataRecord::from_parts(interface, mode, fields, tags, btags))
}

fn deserialize_values(r: &mut WireReader<'_>) -> Result<Entries<i32>, WireError> {
    let mut entries = Entries::new();
    let count = r.get_u32()?;
    for _ in 0..count {
        let name = Name::decode(r)?;
        if entry_set(r)? {
            entries.restore(name, Some(r.get_i32()?));
        } else {
            entries.restore(name, None);
        }
    }
    Ok(entries)
}

fn entry_set(r: &mut WireReader<'_>) -> Result<bool, WireError> {
    match r.get_u8()? {
        0 => Ok(false),
        1 => Ok(true),
        value => Err(WireError::UnknownEntryState { value }),
    }
}
