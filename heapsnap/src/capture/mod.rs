//! # Heap Dump Capture
//!
//! Turns a stream of runtime trace records into one heap graph.
//!
//! ## Stages
//!
//! ```text
//! TraceSession ──▶ EventSource ──▶ HeapDumpReader::process_event   (listener thread)
//!                                      │ classify, queue
//!                                      ▼
//!                                  HeapDumpReader::finalize         (controller thread)
//!                                      │ types, roots, nodes, edges
//!                                      ▼
//!                                  GraphSink (HeapGraph)
//! ```
//!
//! ## Module Structure
//!
//! - **`orchestrator`**: [`HeapDumpCapture`], session lifecycle and the wait loop
//! - **`session`**: [`TraceSession`], [`EventSource`], [`SessionFactory`]
//! - **`demux`**: [`HeapDumpReader`] record classification
//! - **`builder`**: deferred graph construction ([`HeapDumpReader::finalize`])
//! - **`anchor`**: which collection delimits the dump
//! - **`types`**: [`TypeInterner`]
//! - **`queue`**: sequence-checked block queues
//! - **`selector`**, **`config`**, **`progress`**, **`heap_layout`**

pub mod anchor;
pub mod builder;
pub mod config;
pub mod demux;
pub mod heap_layout;
pub mod orchestrator;
pub mod progress;
pub mod queue;
pub mod selector;
pub mod session;
pub mod types;

pub use anchor::{AnchorPredicate, AnchorTracker, DumpState, InducedBlockingGen2, Transition};
pub use builder::RCW_OVERHEAD;
pub use config::CaptureConfig;
pub use demux::{classify_root, HeapDumpReader, ReaderStats};
pub use heap_layout::HeapLayout;
pub use orchestrator::{CaptureRequest, CaptureResult, HeapDumpCapture, WaitOutcome};
pub use progress::CaptureProgress;
pub use selector::ProcessSelector;
pub use session::{EventSource, SessionFactory, TraceSession};
pub use types::{normalize_type_name, TypeInterner};
