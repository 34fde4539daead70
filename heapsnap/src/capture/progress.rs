//! Advisory progress signals shared between the listener and the controller
//!
//! Written by the listener thread, read by the controlling thread to decide
//! when to stop waiting. All accesses are `Relaxed`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CaptureProgress {
    listener_started: AtomicBool,
    dump_started: AtomicBool,
    dump_complete: AtomicBool,
    events: AtomicU64,
    node_blocks: AtomicU64,
}

impl CaptureProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_listener_started(&self) {
        self.listener_started.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn listener_started(&self) -> bool {
        self.listener_started.load(Ordering::Relaxed)
    }

    pub fn mark_dump_started(&self) {
        self.dump_started.store(true, Ordering::Relaxed);
    }

    /// An anchor collection has been seen
    #[must_use]
    pub fn dump_started(&self) -> bool {
        self.dump_started.load(Ordering::Relaxed)
    }

    pub fn mark_dump_complete(&self) {
        self.dump_complete.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn dump_complete(&self) -> bool {
        self.dump_complete.load(Ordering::Relaxed)
    }

    pub fn record_event(&self) {
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn events(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    pub fn record_node_block(&self) {
        self.node_blocks.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn node_blocks(&self) -> u64 {
        self.node_blocks.load(Ordering::Relaxed)
    }
}
