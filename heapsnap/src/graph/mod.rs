//! # Heap Graph
//!
//! The output of a capture: an arena of nodes (objects), types and modules
//! addressed by small integer handles, plus one root node.
//!
//! ## Identity
//!
//! Objects are keyed by their heap address. The first time anything mentions
//! an address (root, edge target, definition) [`GraphSink::node_index`]
//! hands out a [`NodeIndex`] and every later lookup returns the same one.
//! A node is *defined* (type, size, children) exactly once.
//!
//! ## Module Structure
//!
//! - [`GraphSink`]: what the builder needs from a graph
//! - [`HeapGraph`]: the in-memory arena implementation
//! - [`roots`]: the synthetic root bucket hierarchy
//! - [`summary`]: per-type totals for reporting

pub mod roots;
pub mod summary;

use log::warn;
use std::collections::HashMap;

use crate::domain::{Address, ModuleIndex, NodeIndex, TypeIndex};

pub use roots::{BucketId, RootHierarchy};
pub use summary::{GraphSummary, TypeStats};

/// PDB identity of an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdbIdentity {
    pub name: String,
    pub guid: String,
    pub age: u32,
}

/// A loaded image that owns types
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GraphModule {
    pub image_base: Address,
    pub size: u64,
    pub build_timestamp: u32,
    pub path: Option<String>,
    pub pdb: Option<PdbIdentity>,
}

impl GraphModule {
    /// Module created only from a path (name-based runtime types)
    #[must_use]
    pub fn from_path(path: impl Into<String>) -> Self {
        Self { path: Some(path.into()), ..Self::default() }
    }

    /// File name without directories, falling back to the image base
    #[must_use]
    pub fn name(&self) -> String {
        match self.path.as_deref() {
            Some(path) => match path.rsplit_once(['/', '\\']) {
                Some((_dir, file_name)) => file_name.to_string(),
                None => path.to_string(),
            },
            None => format!("module_{}", self.image_base),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphType {
    pub name: String,
    pub module: Option<ModuleIndex>,
    /// Module-relative offset for address-based types (name unresolved)
    pub offset: Option<u64>,
    pub size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct GraphNode {
    pub address: Option<Address>,
    pub ty: Option<TypeIndex>,
    pub size: u64,
    pub children: Vec<NodeIndex>,
    defined: bool,
}

impl GraphNode {
    #[must_use]
    pub fn is_defined(&self) -> bool {
        self.defined
    }
}

/// Reusable scratch storage for type lookups
#[derive(Debug, Clone, Default)]
pub struct TypeView {
    pub name: String,
    pub module: Option<ModuleIndex>,
    pub offset: Option<u64>,
}

/// What graph construction needs from its output
///
/// Implemented by [`HeapGraph`]; hosts with their own storage can implement it
/// to receive the graph directly.
pub trait GraphSink {
    /// Index for `address`, allocating one on first use
    fn node_index(&mut self, address: Address) -> NodeIndex;

    /// Fresh node with no address (root buckets, wrappers)
    fn create_node(&mut self) -> NodeIndex;

    fn is_defined(&self, node: NodeIndex) -> bool;

    /// Set type, size and children; callers must not define a node twice
    fn define_node(&mut self, node: NodeIndex, ty: TypeIndex, size: u64, children: &[NodeIndex]);

    fn create_type(&mut self, name: &str, module: Option<ModuleIndex>) -> TypeIndex;

    /// Type known only by its offset inside `module`
    fn create_type_at_offset(
        &mut self,
        offset: u64,
        module: ModuleIndex,
        size: u64,
        suffix: &str,
    ) -> TypeIndex;

    fn create_module(&mut self, module: GraphModule) -> ModuleIndex;

    fn module(&self, module: ModuleIndex) -> &GraphModule;

    /// Scratch storage for [`load_type`](GraphSink::load_type)
    fn alloc_type_storage(&self) -> TypeView {
        TypeView::default()
    }

    /// Copy the type's data into `storage`
    fn load_type(&self, ty: TypeIndex, storage: &mut TypeView);

    fn set_root(&mut self, root: NodeIndex);
}

/// In-memory arena graph
#[derive(Debug, Default)]
pub struct HeapGraph {
    nodes: Vec<GraphNode>,
    types: Vec<GraphType>,
    modules: Vec<GraphModule>,
    by_address: HashMap<Address, NodeIndex>,
    root: Option<NodeIndex>,
}

impl HeapGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn node(&self, node: NodeIndex) -> &GraphNode {
        &self.nodes[node.as_usize()]
    }

    #[must_use]
    pub fn node_for_address(&self, address: Address) -> Option<NodeIndex> {
        self.by_address.get(&address).copied()
    }

    #[must_use]
    pub fn graph_type(&self, ty: TypeIndex) -> &GraphType {
        &self.types[ty.as_usize()]
    }

    #[must_use]
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    #[must_use]
    pub fn types(&self) -> &[GraphType] {
        &self.types
    }

    #[must_use]
    pub fn modules(&self) -> &[GraphModule] {
        &self.modules
    }

    #[must_use]
    pub fn root(&self) -> Option<NodeIndex> {
        self.root
    }

    /// Sum of defined node sizes
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.nodes.iter().filter(|n| n.defined).map(|n| n.size).sum()
    }

    /// Display name of a type, qualified by its module when it has one
    #[must_use]
    pub fn type_display_name(&self, ty: TypeIndex) -> String {
        let graph_type = self.graph_type(ty);
        match graph_type.module {
            Some(module) if graph_type.offset.is_some() => {
                format!("{}!{}", self.modules[module.as_usize()].name(), graph_type.name)
            }
            _ => graph_type.name.clone(),
        }
    }

    /// Name of a node's type, if the node has been defined
    #[must_use]
    pub fn node_type_name(&self, node: NodeIndex) -> Option<String> {
        self.node(node).ty.map(|ty| self.type_display_name(ty))
    }

    fn push_node(&mut self, address: Option<Address>) -> NodeIndex {
        #[allow(clippy::cast_possible_truncation)]
        let index = NodeIndex(self.nodes.len() as u32);
        self.nodes.push(GraphNode { address, ..GraphNode::default() });
        index
    }

    fn push_type(&mut self, graph_type: GraphType) -> TypeIndex {
        #[allow(clippy::cast_possible_truncation)]
        let index = TypeIndex(self.types.len() as u32);
        self.types.push(graph_type);
        index
    }
}

impl GraphSink for HeapGraph {
    fn node_index(&mut self, address: Address) -> NodeIndex {
        if let Some(&index) = self.by_address.get(&address) {
            return index;
        }
        let index = self.push_node(Some(address));
        self.by_address.insert(address, index);
        index
    }

    fn create_node(&mut self) -> NodeIndex {
        self.push_node(None)
    }

    fn is_defined(&self, node: NodeIndex) -> bool {
        self.nodes.get(node.as_usize()).is_some_and(GraphNode::is_defined)
    }

    fn define_node(&mut self, node: NodeIndex, ty: TypeIndex, size: u64, children: &[NodeIndex]) {
        let entry = &mut self.nodes[node.as_usize()];
        if entry.defined {
            warn!("Ignoring second definition of {node}");
            return;
        }
        entry.ty = Some(ty);
        entry.size = size;
        entry.children = children.to_vec();
        entry.defined = true;
    }

    fn create_type(&mut self, name: &str, module: Option<ModuleIndex>) -> TypeIndex {
        self.push_type(GraphType { name: name.to_string(), module, offset: None, size: 0 })
    }

    fn create_type_at_offset(
        &mut self,
        offset: u64,
        module: ModuleIndex,
        size: u64,
        suffix: &str,
    ) -> TypeIndex {
        self.push_type(GraphType {
            name: format!("0x{offset:x}{suffix}"),
            module: Some(module),
            offset: Some(offset),
            size,
        })
    }

    fn create_module(&mut self, module: GraphModule) -> ModuleIndex {
        #[allow(clippy::cast_possible_truncation)]
        let index = ModuleIndex(self.modules.len() as u32);
        self.modules.push(module);
        index
    }

    fn module(&self, module: ModuleIndex) -> &GraphModule {
        &self.modules[module.as_usize()]
    }

    fn load_type(&self, ty: TypeIndex, storage: &mut TypeView) {
        let graph_type = &self.types[ty.as_usize()];
        storage.name.clear();
        storage.name.push_str(&graph_type.name);
        storage.module = graph_type.module;
        storage.offset = graph_type.offset;
    }

    fn set_root(&mut self, root: NodeIndex) {
        self.root = Some(root);
    }
}
