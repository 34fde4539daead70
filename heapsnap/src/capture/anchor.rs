//! # Anchor Collection Selection
//!
//! A trace contains many collections; exactly one of them delimits the heap
//! dump. Which one is decided by a swappable [`AnchorPredicate`] and tracked by
//! a single state machine:
//!
//! ```text
//!            anchor GC start / dump begin
//!   Idle ───────────────────────────────────▶ Observing
//!    ▲                                            │
//!    │  matching GC stop / dump end, no payload   │ matching GC stop / dump end
//!    └────────────────────────────────────────────┤
//!                                                 ▼
//!                                             Ignoring (final)
//! ```

use heapsnap_common::{GC_MAX_GENERATION, GC_REASON_INDUCED, GC_TYPE_NON_CONCURRENT};

use crate::events::{DumpPhase, GcStartEvent};

/// Decides whether a collection start opens the capture window
pub trait AnchorPredicate: Send {
    fn is_anchor(&self, gc: &GcStartEvent) -> bool;
}

/// The collection the runtime performs when a heap dump is requested:
/// blocking, induced, full-depth.
#[derive(Debug, Clone, Copy, Default)]
pub struct InducedBlockingGen2;

impl AnchorPredicate for InducedBlockingGen2 {
    fn is_anchor(&self, gc: &GcStartEvent) -> bool {
        gc.depth >= GC_MAX_GENERATION
            && gc.gc_type == GC_TYPE_NON_CONCURRENT
            && gc.reason == GC_REASON_INDUCED
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpState {
    /// Looking for an anchor collection
    Idle,
    /// Inside the anchor; `gc_count` is `None` when opened by a dump marker
    Observing { gc_count: Option<u32> },
    /// Anchor finished; everything else is ignored
    Ignoring,
}

/// Result of feeding one record to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    Opened,
    Closed,
    /// Anchor closed without payload; searching again
    Reset,
}

pub struct AnchorTracker {
    state: DumpState,
    predicate: Box<dyn AnchorPredicate>,
    ever_observed: bool,
}

impl Default for AnchorTracker {
    fn default() -> Self {
        Self::new(Box::new(InducedBlockingGen2))
    }
}

impl AnchorTracker {
    #[must_use]
    pub fn new(predicate: Box<dyn AnchorPredicate>) -> Self {
        Self { state: DumpState::Idle, predicate, ever_observed: false }
    }

    #[must_use]
    pub fn state(&self) -> DumpState {
        self.state
    }

    #[must_use]
    pub fn is_observing(&self) -> bool {
        matches!(self.state, DumpState::Observing { .. })
    }

    /// Observing was entered at least once
    #[must_use]
    pub fn ever_observed(&self) -> bool {
        self.ever_observed
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == DumpState::Ignoring
    }

    /// Whether `gc` would open the window right now
    #[must_use]
    pub fn would_open(&self, gc: &GcStartEvent) -> bool {
        self.state == DumpState::Idle && self.predicate.is_anchor(gc)
    }

    pub fn on_gc_start(&mut self, gc: &GcStartEvent) -> Transition {
        if self.would_open(gc) {
            self.open(Some(gc.count))
        } else {
            Transition::None
        }
    }

    pub fn on_gc_stop(&mut self, count: u32, has_payload: bool) -> Transition {
        match self.state {
            DumpState::Observing { gc_count: Some(open) } if open == count => {
                self.close(has_payload)
            }
            _ => Transition::None,
        }
    }

    pub fn on_dump_marker(&mut self, phase: DumpPhase, has_payload: bool) -> Transition {
        match (phase, self.state) {
            (DumpPhase::Begin, DumpState::Idle) => self.open(None),
            (DumpPhase::End, DumpState::Observing { .. }) => self.close(has_payload),
            _ => Transition::None,
        }
    }

    fn open(&mut self, gc_count: Option<u32>) -> Transition {
        self.state = DumpState::Observing { gc_count };
        self.ever_observed = true;
        Transition::Opened
    }

    fn close(&mut self, has_payload: bool) -> Transition {
        if has_payload {
            self.state = DumpState::Ignoring;
            Transition::Closed
        } else {
            self.state = DumpState::Idle;
            Transition::Reset
        }
    }
}
