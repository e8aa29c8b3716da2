//! Shared scaffolding for the multi-node scenario tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use weir_node::{Runtime, RuntimeConfig};
use weir_record::{DataRecord, Record};
use weir_reference::{BoxInterface, DataAny, DataBox, InterfaceRegistry};
use weir_routing::{FunRegistry, NetFn};
use weir_transport_memory::{MemoryHub, TapFrame};
use weir_types::{InterfaceId, Name, WireError, WireReader, WireWriter};

/// The single registered interface: `String` payloads.
pub const TEXT: InterfaceId = InterfaceId(0);

/// Tag every test record carries.
pub const VALUE: Name = Name(0);

/// Field name used by payload-bearing test records.
pub const PAYLOAD: Name = Name(1);

fn copy_string(data: &DataAny) -> DataBox {
    Box::new(data.downcast_ref::<String>().unwrap().clone())
}

fn pack_string(data: &DataAny, w: &mut WireWriter) -> Result<(), WireError> {
    w.put_bytes(data.downcast_ref::<String>().unwrap().as_bytes());
    Ok(())
}

fn unpack_string(r: &mut WireReader<'_>) -> Result<DataBox, WireError> {
    let bytes = r.get_bytes()?.to_vec();
    Ok(Box::new(String::from_utf8(bytes).expect("utf8 payload")))
}

fn interfaces() -> Arc<InterfaceRegistry> {
    let mut registry = InterfaceRegistry::new();
    registry.register(BoxInterface {
        copy: copy_string,
        pack: pack_string,
        unpack: unpack_string,
    });
    Arc::new(registry)
}

/// A tapped in-process cluster of `nodes` runtimes with identical
/// interface and constructor registrations.
pub fn cluster(nodes: usize, library: &[NetFn]) -> (Vec<Runtime>, Receiver<TapFrame>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let (hub, tap) = MemoryHub::tapped(nodes);
    let runtimes = hub
        .into_links()
        .into_iter()
        .map(|link| {
            let registry = Arc::new(FunRegistry::new());
            if !library.is_empty() {
                registry.register("test", library);
            }
            Runtime::init(
                Arc::new(link),
                interfaces(),
                registry,
                RuntimeConfig::default(),
            )
        })
        .collect();
    (runtimes, tap)
}

/// A record carrying only the [`VALUE`] tag.
pub fn tagged(value: i32) -> Record {
    let mut data = DataRecord::new(TEXT);
    data.set_tag(VALUE, value);
    Record::Data(data)
}

/// The [`VALUE`] tag of a data record.
pub fn tag_of(record: &Record) -> i32 {
    match record {
        Record::Data(data) => data.get_tag(VALUE).expect("record has no value tag"),
        other => panic!("unexpected record {}", other.descriptor_name()),
    }
}

/// Polls `cond` until it holds or five seconds pass.
pub fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Pulls tap frames into `seen` until one with `tag` shows up.
pub fn wait_for_tag(tap: &Receiver<TapFrame>, seen: &mut Vec<TapFrame>, tag: u8) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if seen.iter().any(|frame| frame.tag() == Some(tag)) {
            return;
        }
        match tap.recv_timeout(Duration::from_millis(50)) {
            Ok(frame) => seen.push(frame),
            Err(_) => {
                if Instant::now() > deadline {
                    panic!("timed out waiting for frame tag {tag}");
                }
            }
        }
    }
}
