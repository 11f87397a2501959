//! Types shared by both sides of the collector bridge.
//!
//! The Rust model (`MetricValue`, `TagSet`, `Timestamp`, `Modifiers`) is what the
//! engine works with. The `raw` module holds the `#[repr(C)]` mirror of that model
//! as it crosses the C boundary, and `ownership` pairs every allocation handed to
//! the foreign side with its one release function.

pub mod value;
pub mod tags;
pub mod timestamp;
pub mod modifiers;
pub mod raw;
pub mod ownership;

pub use value::{MetricValue, ValueKind};
pub use tags::{Tag, TagSet};
pub use timestamp::{Timestamp, TimestampError};
pub use modifiers::{Modifiers, ResolvedMetadata};
pub use raw::{
    DefineCallback, OwnedRawMap, OwnedRawModifiers, RawDecodeError, RawError, RawMap, RawMapElement,
    RawModifiers, RawTimestamp, RawValue, RawValueUnion, TaskCallback,
};
pub use ownership::{abort_on_defect, AllocationKind, AllocationLedger, ReleaseDefect};
