//! Records, the unit of traffic between operators.
//!
//! A [`Record`] is either a data record, carrying named fields (handles on
//! reference-counted payloads), integer tags and binding tags, or one of
//! the control kinds that steer the graph: `sync` and `collect` (which
//! carry a process-local stream and therefore can never cross the wire),
//! `sort_end` markers, `terminate`, and the trigger that starts a feedback
//! initializer.
//!
//! The wire codec lives in [`Record::serialize`] and
//! [`Record::deserialize`]. Serializing a record consumes it: every set
//! field surrenders its handle into the frame, and the receiving side
//! adopts each one back into its own reference table, so handle counts
//! balance without any extra messages.

mod codec;
mod record;

pub use record::{DataMode, DataRecord, Record, RecordBuilder};
