use weir_reference::DataRef;
use weir_stream::Stream;
use weir_types::{InterfaceId, Name};

/// One unit of traffic between operators.
#[derive(Debug)]
pub enum Record {
    /// Payload-bearing record built by operator code.
    Data(DataRecord),
    /// Tells the reader to continue on `stream` instead. Never serialized:
    /// the stream handle only means something inside this process.
    Sync { stream: Stream<Record> },
    /// Announces a new branch stream to a collector. Process-local like
    /// `Sync`.
    Collect { stream: Stream<Record> },
    /// Ordering marker flushed through a network level.
    SortEnd { level: i32, num: i32 },
    /// Orderly end of traffic on this stream.
    Terminate,
    /// Kicks a feedback loop's initializer exactly once.
    TriggerInitializer,
}

impl Record {
    /// Short descriptor name for diagnostics.
    pub fn descriptor_name(&self) -> &'static str {
        match self {
            Record::Data(_) => "data",
            Record::Sync { .. } => "sync",
            Record::Collect { .. } => "collect",
            Record::SortEnd { .. } => "sort_end",
            Record::Terminate => "terminate",
            Record::TriggerInitializer => "trigger_initializer",
        }
    }

    /// Deep value copy.
    ///
    /// # Panics
    ///
    /// Panics on `sync` and `collect` records: a stream handle cannot be
    /// meaningfully duplicated, and no correct operator copies one.
    pub fn copy(&self) -> Record {
        match self {
            Record::Data(data) => Record::Data(data.copy()),
            Record::SortEnd { level, num } => Record::SortEnd {
                level: *level,
                num: *num,
            },
            Record::Terminate => Record::Terminate,
            Record::TriggerInitializer => Record::TriggerInitializer,
            Record::Sync { .. } | Record::Collect { .. } => {
                panic!("copy of a {} record", self.descriptor_name())
            }
        }
    }
}

/// Payload-bearing record: named fields holding data handles, plus integer
/// tags and binding tags.
///
/// Entries distinguish *consumed* from *absent*: `take` leaves the name in
/// place but marks the value gone, so a later pattern match sees the entry
/// as unavailable while the name remains enumerable. `remove` delists the
/// name entirely.
#[derive(Debug)]
pub struct DataRecord {
    interface: InterfaceId,
    mode: DataMode,
    fields: Entries<DataRef>,
    tags: Entries<i32>,
    btags: Entries<i32>,
}

impl DataRecord {
    pub fn new(interface: InterfaceId) -> Self {
        Self {
            interface,
            mode: DataMode::Binary,
            fields: Entries::new(),
            tags: Entries::new(),
            btags: Entries::new(),
        }
    }

    pub fn builder(interface: InterfaceId) -> RecordBuilder {
        RecordBuilder {
            record: Self::new(interface),
        }
    }

    pub fn interface(&self) -> InterfaceId {
        self.interface
    }

    pub fn mode(&self) -> DataMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: DataMode) {
        self.mode = mode;
    }

    pub fn set_field(&mut self, name: Name, value: DataRef) {
        self.fields.set(name, value);
    }

    pub fn get_field(&self, name: Name) -> Option<&DataRef> {
        self.fields.get(name)
    }

    /// Removes the value but keeps the name enumerable as consumed.
    pub fn take_field(&mut self, name: Name) -> Option<DataRef> {
        self.fields.take(name)
    }

    pub fn has_field(&self, name: Name) -> bool {
        self.fields.has(name)
    }

    /// Delists the name entirely, returning the value if one was set.
    pub fn remove_field(&mut self, name: Name) -> Option<DataRef> {
        self.fields.remove(name)
    }

    /// All field names, consumed entries included.
    pub fn field_names(&self) -> impl Iterator<Item = Name> + '_ {
        self.fields.names()
    }

    pub fn set_tag(&mut self, name: Name, value: i32) {
        self.tags.set(name, value);
    }

    pub fn get_tag(&self, name: Name) -> Option<i32> {
        self.tags.get(name).copied()
    }

    pub fn take_tag(&mut self, name: Name) -> Option<i32> {
        self.tags.take(name)
    }

    pub fn has_tag(&self, name: Name) -> bool {
        self.tags.has(name)
    }

    pub fn remove_tag(&mut self, name: Name) -> Option<i32> {
        self.tags.remove(name)
    }

    pub fn tag_names(&self) -> impl Iterator<Item = Name> + '_ {
        self.tags.names()
    }

    pub fn set_btag(&mut self, name: Name, value: i32) {
        self.btags.set(name, value);
    }

    pub fn get_btag(&self, name: Name) -> Option<i32> {
        self.btags.get(name).copied()
    }

    pub fn take_btag(&mut self, name: Name) -> Option<i32> {
        self.btags.take(name)
    }

    pub fn has_btag(&self, name: Name) -> bool {
        self.btags.has(name)
    }

    pub fn remove_btag(&mut self, name: Name) -> Option<i32> {
        self.btags.remove(name)
    }

    pub fn btag_names(&self) -> impl Iterator<Item = Name> + '_ {
        self.btags.names()
    }

    /// Deep value copy, consumption state preserved. Field handles are
    /// duplicated, which away from the owner costs a round trip each.
    pub fn copy(&self) -> DataRecord {
        DataRecord {
            interface: self.interface,
            mode: self.mode,
            fields: Entries {
                list: self
                    .fields
                    .list
                    .iter()
                    .map(|(name, value)| (*name, value.as_ref().map(DataRef::duplicate)))
                    .collect(),
            },
            tags: self.tags.clone(),
            btags: self.btags.clone(),
        }
    }

    pub(crate) fn fields(&self) -> &Entries<DataRef> {
        &self.fields
    }

    pub(crate) fn tags(&self) -> &Entries<i32> {
        &self.tags
    }

    pub(crate) fn btags(&self) -> &Entries<i32> {
        &self.btags
    }

    pub(crate) fn into_parts(
        self,
    ) -> (InterfaceId, DataMode, Entries<DataRef>, Entries<i32>, Entries<i32>) {
        (self.interface, self.mode, self.fields, self.tags, self.btags)
    }

    pub(crate) fn from_parts(
        interface: InterfaceId,
        mode: DataMode,
        fields: Entries<DataRef>,
        tags: Entries<i32>,
        btags: Entries<i32>,
    ) -> Self {
        Self {
            interface,
            mode,
            fields,
            tags,
            btags,
        }
    }
}

/// Interpretation of field payloads when observed outside the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataMode {
    Textual,
    Binary,
}

/// Builds a data record in one expression; stands in for a variadic
/// constructor.
pub struct RecordBuilder {
    record: DataRecord,
}

impl RecordBuilder {
    pub fn mode(mut self, mode: DataMode) -> Self {
        self.record.mode = mode;
        self
    }

    pub fn field(mut self, name: Name, value: DataRef) -> Self {
        self.record.fields.add(name, value);
        self
    }

    pub fn tag(mut self, name: Name, value: i32) -> Self {
        self.record.tags.add(name, value);
        self
    }

    pub fn btag(mut self, name: Name, value: i32) -> Self {
        self.record.btags.add(name, value);
        self
    }

    pub fn build(self) -> Record {
        Record::Data(self.record)
    }
}

/// Name-keyed entry list with consumed tombstones. Records carry a handful
/// of entries, so linear scans beat a map here.
#[derive(Debug, Clone)]
pub(crate) struct Entries<V> {
    pub(crate) list: Vec<(Name, Option<V>)>,
}

impl<V> Entries<V> {
    pub(crate) fn new() -> Self {
        Self { list: Vec::new() }
    }

    fn position(&self, name: Name) -> Option<usize> {
        self.list.iter().position(|(n, _)| *n == name)
    }

    pub(crate) fn set(&mut self, name: Name, value: V) {
        match self.position(name) {
            Some(i) => self.list[i].1 = Some(value),
            None => self.list.push((name, Some(value))),
        }
    }

    pub(crate) fn add(&mut self, name: Name, value: V) {
        debug_assert!(self.position(name).is_none(), "entry {name} added twice");
        self.list.push((name, Some(value)));
    }

    pub(crate) fn get(&self, name: Name) -> Option<&V> {
        self.position(name)
            .and_then(|i| self.list[i].1.as_ref())
    }

    pub(crate) fn take(&mut self, name: Name) -> Option<V> {
        self.position(name).and_then(|i| self.list[i].1.take())
    }

    pub(crate) fn has(&self, name: Name) -> bool {
        self.get(name).is_some()
    }

    pub(crate) fn remove(&mut self, name: Name) -> Option<V> {
        self.position(name).and_then(|i| self.list.remove(i).1)
    }

    /// Appends a raw entry, tombstone included. Decode-side only; names
    /// arriving off the wire are already unique.
    pub(crate) fn restore(&mut self, name: Name, value: Option<V>) {
        self.list.push((name, value));
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = Name> + '_ {
        self.list.iter().map(|(name, _)| *name)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (Name, Option<&V>)> {
        self.list.iter().map(|(name, value)| (*name, value.as_ref()))
    }

    pub(crate) fn len(&self) -> usize {
        self.list.len()
    }
}
