//! # Recorded Traces
//!
//! Heap dumps can be captured from a recording instead of a live session:
//!
//! - **`recording`**: JSON-lines format, [`read_recording`], [`TraceRecorder`]
//! - **`file`**: [`read_heap_dump_file`], offline scan then build
//! - **`session`**: [`ReplayFactory`], a [`crate::capture::TraceSession`] that
//!   plays a recording through the full capture orchestration

pub mod file;
pub mod recording;
pub mod session;

pub use file::read_heap_dump_file;
pub use recording::{parse_recording, read_recording, TraceRecorder};
pub use session::{ReplayFactory, ReplaySession, ReplaySource};
