//! # Deferred Graph Construction
//!
//! Second capture stage. Runs once, after the event stream has ended, over
//! the queues the demuxer filled:
//!
//! ```text
//! 1. types          every raw type id -> canonical TypeIndex
//! 2. CCW roots      [CCW for T] wrappers under COM/WinRT roots
//! 3. static roots   [static var T.field] leaves
//! 4. nodes + edges  node blocks in sequence, edges drained per node
//! 5. leftovers      no edge may remain unconsumed
//! 6. roots          bucket tree materialized, graph root set
//! ```
//!
//! Types must exist before anything names them, which is why nothing here
//! happens while events are still arriving.

use log::{debug, info};
use std::mem;

use heapsnap_common::STATIC_VAR_FLAG_THREAD_LOCAL;

use super::demux::HeapDumpReader;
use super::queue::{BlockQueue, EdgeReader};
use crate::domain::CaptureError;
use crate::graph::roots::{COM_OBJECTS, OTHER_ROOTS, STATIC_VARS, THREAD_STATIC_VARS};
use crate::graph::GraphSink;

/// Size charged to a managed object for the native object it wraps
pub const RCW_OVERHEAD: u64 = 1000;

impl<G: GraphSink> HeapDumpReader<G> {
    /// Build the graph from everything queued during the capture.
    ///
    /// Calling this again after it has run is a no-op.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::NoDumpFound`] if no anchor collection was seen
    /// - [`CaptureError::DumpIncomplete`] if the anchor never finished
    /// - [`CaptureError::SequenceGap`], [`CaptureError::NotEnoughEdgeData`],
    ///   [`CaptureError::LeftoverEdges`] or [`CaptureError::NodeRedefined`]
    ///   if the recorded stream is internally inconsistent
    pub fn finalize(&mut self) -> Result<(), CaptureError> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;

        if !self.anchor.ever_observed() {
            return Err(CaptureError::NoDumpFound(self.describe_target()));
        }
        if !self.anchor.is_complete() {
            return Err(CaptureError::DumpIncomplete(self.describe_target()));
        }

        self.intern_types();
        self.add_ccw_roots()?;
        self.add_static_roots()?;
        let edges = self.add_nodes()?;

        let remaining = edges.remaining();
        if remaining > 0 {
            return Err(CaptureError::LeftoverEdges { remaining });
        }

        let roots = mem::take(&mut self.roots);
        let root = roots.materialize(&mut self.graph);
        self.graph.set_root(root);

        info!(
            "Built heap graph for {}: {} types interned, {} RCWs",
            self.describe_target(),
            self.types.len(),
            self.rcw_table.len()
        );
        Ok(())
    }

    fn intern_types(&mut self) {
        let blocks = self.target.and_then(|pid| self.type_blocks.remove(&pid)).unwrap_or_default();
        for block in &blocks {
            for value in &block.types {
                if self.address_based {
                    self.types.intern_by_offset(&mut self.graph, &mut self.modules, value);
                } else {
                    self.types.intern_named(&mut self.graph, &mut self.modules, value);
                }
            }
        }
        self.type_blocks.clear();
    }

    fn add_ccw_roots(&mut self) -> Result<(), CaptureError> {
        let mut skipped = 0usize;
        for block in self.ccw_blocks.drain()? {
            for ccw in &block.wrappers {
                // The runtime fills in the interface pointer lazily
                if ccw.iunknown.is_null() {
                    skipped += 1;
                    continue;
                }
                let object = self.graph.node_index(ccw.object);
                let object_type = self.types.type_for_node(&mut self.graph, ccw.type_id);
                let object_name = self.types.display_name(&self.graph, object_type);
                let name = format!("[CCW for {object_name}]");
                let wrapper_type = self.types.intern_name(&mut self.graph, &name, None);

                let wrapper = self.graph.create_node();
                self.graph.define_node(wrapper, wrapper_type, 0, &[object]);
                let bucket = self.roots.bucket_at(&[OTHER_ROOTS, COM_OBJECTS]);
                self.roots.add_member(bucket, wrapper);
            }
        }
        if skipped > 0 {
            debug!("Skipped {skipped} CCWs without an interface pointer");
        }
        Ok(())
    }

    fn add_static_roots(&mut self) -> Result<(), CaptureError> {
        for block in self.static_blocks.drain()? {
            for var in &block.statics {
                if var.object.is_null() {
                    continue;
                }
                let ty = self.types.type_for_node(&mut self.graph, var.type_id);
                let type_name = self.types.display_name(&self.graph, ty);
                let full_name = format!("{type_name}.{}", var.field_name);
                let group = if var.flags & STATIC_VAR_FLAG_THREAD_LOCAL != 0 {
                    THREAD_STATIC_VARS
                } else {
                    STATIC_VARS
                };
                let leaf = format!("[static var {full_name}]");

                let object = self.graph.node_index(var.object);
                let bucket = self.roots.bucket_at(&[group, leaf.as_str()]);
                self.roots.add_member(bucket, object);
            }
        }
        Ok(())
    }

    /// Define every node; returns the edge cursor for the leftover check
    fn add_nodes(&mut self) -> Result<EdgeReader, CaptureError> {
        let edge_blocks = mem::replace(&mut self.edge_blocks, BlockQueue::new("edge"));
        let mut edges = EdgeReader::new(edge_blocks);
        let mut children = Vec::new();
        let mut defined = 0u64;

        while let Some(block) = self.node_blocks.pop()? {
            for value in &block.nodes {
                let node = self.graph.node_index(value.address);
                let base = self.types.type_for_node(&mut self.graph, value.type_id);
                let ty = self.types.sized_type(&mut self.graph, base, value.size);
                let mut size = value.size;

                children.clear();
                for consumed in 0..value.edge_count {
                    let Some(edge) = edges.next_edge()? else {
                        return Err(CaptureError::NotEnoughEdgeData {
                            address: value.address,
                            declared: value.edge_count,
                            consumed,
                        });
                    };
                    children.push(self.graph.node_index(edge.target));
                }

                if let Some(&native) = self.rcw_table.get(&value.address) {
                    children.push(self.graph.node_index(native));
                    size += RCW_OVERHEAD;
                }

                if self.graph.is_defined(node) {
                    return Err(CaptureError::NodeRedefined(value.address));
                }
                self.graph.define_node(node, ty, size, &children);
                defined += 1;
            }
        }

        debug!("Defined {defined} heap nodes");
        Ok(edges)
    }
}
