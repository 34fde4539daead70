//! # Event Stream Demultiplexing
//!
//! First of the two capture stages. Every trace record is classified as it
//! arrives on the listener thread:
//!
//! ```text
//! record                      handling
//! ─────────────────────────   ──────────────────────────────────────────────
//! process start               pid -> image name (name selector)
//! image load / debug id       ModuleResolver
//! runtime module load         ModuleResolver (first writer wins)
//! GC start/stop, dump marker  AnchorTracker
//! bulk type                   queued (any state)
//! bulk node / edge            queued while observing
//! bulk CCW / static var       queued while observing
//! bulk root edge              root buckets, immediately
//! bulk RCW                    interop side table, immediately
//! weak table edge             [Dependent Handles], immediately
//! generation range            HeapLayout, once node data has arrived
//! ```
//!
//! Queued blocks are owned clones of the delivered records. Graph
//! construction from the queues happens later in [`HeapDumpReader::finalize`].

use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;

use heapsnap_common::{
    ROOT_FLAG_PINNING, ROOT_FLAG_REF_COUNTED, ROOT_FLAG_WEAK_REF, ROOT_KIND_FINALIZER,
    ROOT_KIND_HANDLE, ROOT_KIND_STACK,
};

use super::anchor::{AnchorPredicate, AnchorTracker, Transition};
use super::heap_layout::HeapLayout;
use super::progress::CaptureProgress;
use super::queue::BlockQueue;
use super::selector::ProcessSelector;
use super::types::TypeInterner;
use crate::domain::{Address, Pid};
use crate::events::{
    BulkCcwBlock, BulkEdgeBlock, BulkNodeBlock, BulkRcwBlock, BulkRootEdgeBlock, BulkStaticVarBlock,
    BulkTypeBlock, BulkWeakTableEdgeBlock, DumpMarkerEvent, GcStartEvent, GcStopEvent, Provider,
    TraceEvent,
};
use crate::graph::roots::{
    COM_OBJECTS, DEPENDENT_HANDLES, FINALIZER_HANDLES, LOCAL_VARS, OTHER_HANDLES, OTHER_ROOTS,
    PINNING_HANDLES, STATIC_VARS, STRONG_HANDLES,
};
use crate::graph::{GraphSink, RootHierarchy};
use crate::image::ModuleResolver;

/// Bucket path for a root edge, `None` for roots that do not keep objects alive
#[must_use]
pub fn classify_root(kind: u32, flags: u32) -> Option<&'static [&'static str]> {
    if flags & ROOT_FLAG_WEAK_REF != 0 {
        return None;
    }
    let path: &'static [&'static str] = if kind == ROOT_KIND_STACK {
        &[LOCAL_VARS]
    } else if flags & ROOT_FLAG_REF_COUNTED != 0 {
        &[OTHER_ROOTS, COM_OBJECTS]
    } else if kind == ROOT_KIND_FINALIZER {
        &[OTHER_ROOTS, FINALIZER_HANDLES]
    } else if kind == ROOT_KIND_HANDLE && flags & ROOT_FLAG_PINNING != 0 {
        &[OTHER_ROOTS, PINNING_HANDLES]
    } else if kind == ROOT_KIND_HANDLE {
        &[OTHER_ROOTS, STRONG_HANDLES]
    } else {
        &[OTHER_ROOTS, OTHER_HANDLES]
    };
    Some(path)
}

/// Counters for the end-of-capture summary
#[derive(Debug, Clone, Copy, Default)]
pub struct ReaderStats {
    pub events: u64,
    pub type_blocks: u64,
    pub node_blocks: u64,
    pub edge_blocks: u64,
    pub roots: u64,
    pub weak_roots_skipped: u64,
    pub rcw_entries: u64,
}

/// Reader-side state of one capture
///
/// Lives on the listener thread while events arrive, then comes back to the
/// controlling thread for [`finalize`](HeapDumpReader::finalize).
pub struct HeapDumpReader<G: GraphSink> {
    pub(super) selector: ProcessSelector,
    /// Target pid, fixed up front or latched from the anchor collection
    pub(super) target: Option<Pid>,
    pub(super) process_names: HashMap<Pid, String>,
    pub(super) anchor: AnchorTracker,
    /// The anchor came from the address-based runtime
    pub(super) address_based: bool,
    /// Type blocks per process until the target is known
    pub(super) type_blocks: HashMap<Pid, Vec<BulkTypeBlock>>,
    pub(super) node_blocks: BlockQueue<BulkNodeBlock>,
    pub(super) edge_blocks: BlockQueue<BulkEdgeBlock>,
    pub(super) ccw_blocks: BlockQueue<BulkCcwBlock>,
    pub(super) static_blocks: BlockQueue<BulkStaticVarBlock>,
    pub(super) roots: RootHierarchy,
    /// Managed object -> wrapped native interface pointer
    pub(super) rcw_table: HashMap<Address, Address>,
    pub(super) modules: ModuleResolver,
    pub(super) types: TypeInterner,
    pub(super) heap_layout: Option<HeapLayout>,
    pub(super) progress: Arc<CaptureProgress>,
    pub(super) graph: G,
    pub(super) stats: ReaderStats,
    pub(super) finalized: bool,
}

impl<G: GraphSink> HeapDumpReader<G> {
    #[must_use]
    pub fn new(selector: ProcessSelector, graph: G) -> Self {
        Self {
            target: selector.pid(),
            selector,
            process_names: HashMap::new(),
            anchor: AnchorTracker::default(),
            address_based: false,
            type_blocks: HashMap::new(),
            node_blocks: BlockQueue::new("node"),
            edge_blocks: BlockQueue::new("edge"),
            ccw_blocks: BlockQueue::new("ccw"),
            static_blocks: BlockQueue::new("static var"),
            roots: RootHierarchy::default(),
            rcw_table: HashMap::new(),
            modules: ModuleResolver::default(),
            types: TypeInterner::new(),
            heap_layout: None,
            progress: Arc::new(CaptureProgress::new()),
            graph,
            stats: ReaderStats::default(),
            finalized: false,
        }
    }

    #[must_use]
    pub fn with_anchor_predicate(mut self, predicate: Box<dyn AnchorPredicate>) -> Self {
        self.anchor = AnchorTracker::new(predicate);
        self
    }

    #[must_use]
    pub fn with_module_resolver(mut self, modules: ModuleResolver) -> Self {
        self.modules = modules;
        self
    }

    /// Also collect generation ranges
    #[must_use]
    pub fn with_heap_layout(mut self) -> Self {
        self.heap_layout = Some(HeapLayout::new());
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<CaptureProgress>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn progress(&self) -> Arc<CaptureProgress> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn target(&self) -> Option<Pid> {
        self.target
    }

    #[must_use]
    pub fn is_address_based(&self) -> bool {
        self.address_based
    }

    #[must_use]
    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    #[must_use]
    pub fn anchor(&self) -> &AnchorTracker {
        &self.anchor
    }

    #[must_use]
    pub fn roots(&self) -> &RootHierarchy {
        &self.roots
    }

    #[must_use]
    pub fn graph(&self) -> &G {
        &self.graph
    }

    #[must_use]
    pub fn heap_layout(&self) -> Option<&HeapLayout> {
        self.heap_layout.as_ref()
    }

    #[must_use]
    pub fn into_parts(self) -> (G, Option<HeapLayout>) {
        (self.graph, self.heap_layout)
    }

    /// How the target is described in errors and logs
    #[must_use]
    pub fn describe_target(&self) -> String {
        match (self.target, &self.selector) {
            (Some(pid), ProcessSelector::Name(name)) => format!("process {pid} ({name})"),
            (Some(pid), _) => format!("process {pid}"),
            (None, selector) => selector.to_string(),
        }
    }

    /// Classify one record
    pub fn process_event(&mut self, event: &TraceEvent) {
        self.stats.events += 1;
        self.progress.record_event();

        match event {
            TraceEvent::ProcessStart(e) => {
                self.process_names.insert(e.pid, e.image_name.clone());
            }
            TraceEvent::ImageLoad(e) if self.is_target(e.pid) => self.modules.record_image_load(e),
            TraceEvent::ImageDebugId(e) if self.is_target(e.pid) => self.modules.record_debug_id(e),
            TraceEvent::ModuleLoad(e) if self.is_target(e.pid) => {
                self.modules.record_runtime_module(e);
            }
            TraceEvent::GcStart(e) => self.on_gc_start(e),
            TraceEvent::GcStop(e) => self.on_gc_stop(e),
            TraceEvent::DumpMarker(e) => self.on_dump_marker(e),
            TraceEvent::BulkType(block) if self.is_target(block.pid) => {
                self.stats.type_blocks += 1;
                self.type_blocks.entry(block.pid).or_default().push(block.clone());
            }
            TraceEvent::BulkNode(block) if self.is_collecting(block.pid) => {
                self.stats.node_blocks += 1;
                self.progress.record_node_block();
                self.node_blocks.push(block.clone());
            }
            TraceEvent::BulkEdge(block) if self.is_collecting(block.pid) => {
                self.stats.edge_blocks += 1;
                self.edge_blocks.push(block.clone());
            }
            TraceEvent::BulkCcw(block) if self.is_collecting(block.pid) => {
                self.ccw_blocks.push(block.clone());
            }
            TraceEvent::BulkStaticVar(block) if self.is_collecting(block.pid) => {
                self.static_blocks.push(block.clone());
            }
            TraceEvent::BulkRootEdge(block) if self.is_collecting(block.pid) => {
                self.on_root_edges(block);
            }
            TraceEvent::BulkRcw(block) if self.is_collecting(block.pid) => self.on_rcws(block),
            TraceEvent::BulkWeakTableEdge(block) if self.is_collecting(block.pid) => {
                self.on_weak_table_edges(block);
            }
            TraceEvent::GenerationRange(e)
                if self.is_collecting(e.pid) && !self.node_blocks.is_empty() =>
            {
                if let Some(layout) = &mut self.heap_layout {
                    layout.record(e);
                }
            }
            _ => {}
        }
    }

    fn is_target(&self, pid: Pid) -> bool {
        match self.target {
            Some(target) => target == pid,
            None => self.selector.matches(pid, self.process_names.get(&pid).map(String::as_str)),
        }
    }

    fn is_collecting(&self, pid: Pid) -> bool {
        self.anchor.is_observing() && self.target == Some(pid)
    }

    fn has_payload(&self) -> bool {
        let types = self
            .target
            .and_then(|pid| self.type_blocks.get(&pid))
            .is_some_and(|b| !b.is_empty());
        types || !self.node_blocks.is_empty() || !self.edge_blocks.is_empty()
    }

    fn on_gc_start(&mut self, gc: &GcStartEvent) {
        if !self.is_target(gc.pid) {
            return;
        }
        if self.anchor.on_gc_start(gc) == Transition::Opened {
            if gc.provider == Provider::NativeRuntime && !self.address_based {
                info!("Anchor GC comes from the address-based runtime");
                self.address_based = true;
            }
            self.opened(gc.pid);
            info!("Anchor GC #{} started for {}", gc.count, self.describe_target());
        }
    }

    fn on_gc_stop(&mut self, gc: &GcStopEvent) {
        if self.target != Some(gc.pid) {
            return;
        }
        let has_payload = self.has_payload();
        let transition = self.anchor.on_gc_stop(gc.count, has_payload);
        self.closed(transition);
    }

    fn on_dump_marker(&mut self, marker: &DumpMarkerEvent) {
        if !self.is_target(marker.pid) {
            return;
        }
        let has_payload = self.has_payload();
        match self.anchor.on_dump_marker(marker.phase, has_payload) {
            Transition::Opened => {
                self.opened(marker.pid);
                info!("Heap dump begin marker for {}", self.describe_target());
            }
            transition => self.closed(transition),
        }
    }

    fn opened(&mut self, pid: Pid) {
        if self.target.is_none() {
            info!("Latched target {pid}");
            self.target = Some(pid);
            self.type_blocks.retain(|&p, _| p == pid);
        }
        self.progress.mark_dump_started();
    }

    fn closed(&mut self, transition: Transition) {
        match transition {
            Transition::Closed => {
                info!(
                    "Heap dump complete: {} node blocks, {} edge blocks, {} roots",
                    self.stats.node_blocks, self.stats.edge_blocks, self.stats.roots
                );
                self.progress.mark_dump_complete();
            }
            Transition::Reset => {
                info!("Anchor GC carried no heap data, looking for another one");
                self.roots = RootHierarchy::default();
                self.rcw_table.clear();
                self.ccw_blocks = BlockQueue::new("ccw");
                self.static_blocks = BlockQueue::new("static var");
            }
            Transition::None | Transition::Opened => {}
        }
    }

    fn on_root_edges(&mut self, block: &BulkRootEdgeBlock) {
        for root in &block.roots {
            let Some(path) = classify_root(root.kind, root.flags) else {
                self.stats.weak_roots_skipped += 1;
                continue;
            };
            self.stats.roots += 1;
            let object = self.graph.node_index(root.object);

            if self.address_based && !root.root_id.is_null() {
                let owner = self.modules.resolve_module_for_address(&mut self.graph, root.root_id);
                if let Some(module) = owner {
                    // Root lives inside an image: a static variable
                    let offset = root.root_id.0 - self.graph.module(module).image_base.0;
                    let ty = self.types.intern_static_at_offset(&mut self.graph, module, offset);
                    let node = self.graph.create_node();
                    self.graph.define_node(node, ty, 0, &[object]);
                    let bucket = self.roots.bucket_at(&[STATIC_VARS]);
                    self.roots.add_member(bucket, node);
                    continue;
                }
            }

            let bucket = self.roots.bucket_at(path);
            self.roots.add_member(bucket, object);
        }
    }

    fn on_rcws(&mut self, block: &BulkRcwBlock) {
        for rcw in &block.wrappers {
            self.stats.rcw_entries += 1;
            self.rcw_table.insert(rcw.object, rcw.iunknown);
        }
    }

    fn on_weak_table_edges(&mut self, block: &BulkWeakTableEdgeBlock) {
        for entry in &block.entries {
            if entry.key.is_null() {
                debug!("Skipping dependent handle with a null key");
                continue;
            }
            let value = self.graph.node_index(entry.value);
            let bucket = self.roots.bucket_at(&[OTHER_ROOTS, DEPENDENT_HANDLES]);
            self.roots.add_member(bucket, value);
        }
    }
}
