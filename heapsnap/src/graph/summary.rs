//! Per-type aggregation of a finished heap graph.
//!
//! # Data Flow
//!
//! ```text
//! HeapGraph (defined nodes)
//!     │
//!     └──► GraphSummary::from_graph()  ← group by type display name
//!              │
//!              └──► top types by total bytes, plus totals
//! ```

// Percentages are display-only
#![allow(clippy::cast_precision_loss)]

use std::collections::HashMap;
use std::fmt;

use super::HeapGraph;
use crate::domain::TypeIndex;

/// Instances and bytes for one type name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeStats {
    pub name: String,
    pub count: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct GraphSummary {
    pub nodes: usize,
    pub defined_nodes: usize,
    pub types: usize,
    pub modules: usize,
    pub total_bytes: u64,
    /// Largest types first
    pub top_types: Vec<TypeStats>,
}

impl GraphSummary {
    /// Summarize heap objects (nodes with an address), keeping the `top` largest types
    #[must_use]
    pub fn from_graph(graph: &HeapGraph, top: usize) -> Self {
        let mut by_type: HashMap<TypeIndex, (u64, u64)> = HashMap::new();
        let mut defined_nodes = 0;
        for node in graph.nodes() {
            let (Some(ty), Some(_)) = (node.ty, node.address) else {
                continue;
            };
            defined_nodes += 1;
            let entry = by_type.entry(ty).or_default();
            entry.0 += 1;
            entry.1 += node.size;
        }

        // Size-bucketed variants share a display prefix but stay separate types
        let mut top_types: Vec<TypeStats> = by_type
            .into_iter()
            .map(|(ty, (count, bytes))| TypeStats {
                name: graph.type_display_name(ty),
                count,
                bytes,
            })
            .collect();
        top_types.sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.name.cmp(&b.name)));
        top_types.truncate(top);

        Self {
            nodes: graph.nodes().len(),
            defined_nodes,
            types: graph.types().len(),
            modules: graph.modules().len(),
            total_bytes: graph.total_size(),
            top_types,
        }
    }
}

impl fmt::Display for GraphSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} objects ({} nodes), {} types, {} modules, {} bytes",
            self.defined_nodes, self.nodes, self.types, self.modules, self.total_bytes
        )?;
        for stats in &self.top_types {
            let percent = if self.total_bytes == 0 {
                0.0
            } else {
                stats.bytes as f64 * 100.0 / self.total_bytes as f64
            };
            writeln!(
                f,
                "  {:>12} {:>5.1}% {:>8}  {}",
                stats.bytes, percent, stats.count, stats.name
            )?;
        }
        Ok(())
    }
}
