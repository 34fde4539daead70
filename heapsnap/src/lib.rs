//! # heapsnap - GC Heap Snapshots from Runtime Traces
//!
//! heapsnap captures the object graph of a .NET process's garbage-collected
//! heap. It asks the runtime for a heap dump through its trace providers,
//! isolates the one collection that carries the dump inside a noisy trace,
//! and rebuilds a directed object graph from the bulk records the runtime
//! emits during that collection.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Target Process                            │
//! │                   (.NET runtime, GC heap)                       │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ runtime / rundown / kernel providers
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              TraceSession  (OS session or replay)               │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ TraceEvent records (listener thread)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     heapsnap (This Crate)                       │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐        │
//! │  │ Orchestrator │──▶│   Demuxer    │──▶│   Builder    │        │
//! │  │  (session)   │   │ (classify,   │   │ (finalize)   │        │
//! │  └──────────────┘   │  queue)      │   └──────┬───────┘        │
//! │                     └──────┬───────┘          │                │
//! │                            ▼                  ▼                │
//! │                     ┌──────────────┐   ┌──────────────┐        │
//! │                     │ModuleResolver│   │  HeapGraph   │        │
//! │                     │TypeInterner  │   │ (arena)      │        │
//! │                     └──────────────┘   └──────────────┘        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`capture`]: session orchestration, record classification, graph construction
//! - [`graph`]: the output graph, root buckets, summaries
//! - [`image`]: loaded images, module identity, PDB signatures
//! - [`events`]: the owned trace record model
//! - [`replay`]: JSON-lines recordings and a session that plays them back
//! - [`cli`]: command-line argument parsing
//! - [`domain`]: core types (`Pid`, `Address`, arena indices) and errors
//!
//! ## Operational Modes
//!
//! 1. **Session** (default): drive a [`capture::TraceSession`] through the full
//!    provider sequence and wait for the dump
//! 2. **Offline** (`--offline`): scan a whole recording, then build
//!
//! ## Typical Usage
//!
//! ```bash
//! # Capture from a recording, selecting the process by name
//! heapsnap MyServer --replay trace.jsonl
//!
//! # First process that reports a dump, offline
//! heapsnap '*' --replay trace.jsonl --offline
//! ```

pub mod capture;
pub mod cli;
pub mod domain;
pub mod events;
pub mod graph;
pub mod image;
pub mod replay;
