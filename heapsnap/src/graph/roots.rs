//! Synthetic root buckets
//!
//! Roots arrive piecemeal (stack roots, handles, statics, interop wrappers)
//! long before the graph is complete, so they are collected into a small
//! tree of named buckets and only turned into real graph nodes once, at the
//! end of construction. [`RootHierarchy::materialize`] consumes the tree.

use std::collections::HashMap;

use super::GraphSink;
use crate::domain::NodeIndex;

pub const ROOT: &str = "[.NET Roots]";
pub const LOCAL_VARS: &str = "[local vars]";
pub const OTHER_ROOTS: &str = "[other roots]";
pub const STATIC_VARS: &str = "[static vars]";
pub const THREAD_STATIC_VARS: &str = "[thread static vars]";
pub const COM_OBJECTS: &str = "[COM/WinRT Objects]";
pub const FINALIZER_HANDLES: &str = "[finalizer Handles]";
pub const PINNING_HANDLES: &str = "[pinning Handles]";
pub const STRONG_HANDLES: &str = "[strong Handles]";
pub const OTHER_HANDLES: &str = "[other Handles]";
pub const DEPENDENT_HANDLES: &str = "[Dependent Handles]";

/// Handle to a bucket inside one [`RootHierarchy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketId(usize);

#[derive(Debug)]
struct Bucket {
    name: String,
    child_buckets: Vec<BucketId>,
    by_name: HashMap<String, BucketId>,
    members: Vec<NodeIndex>,
}

impl Bucket {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            child_buckets: Vec::new(),
            by_name: HashMap::new(),
            members: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct RootHierarchy {
    buckets: Vec<Bucket>,
}

impl Default for RootHierarchy {
    fn default() -> Self {
        Self::new(ROOT)
    }
}

impl RootHierarchy {
    #[must_use]
    pub fn new(root_name: &str) -> Self {
        Self { buckets: vec![Bucket::new(root_name)] }
    }

    #[must_use]
    pub fn root(&self) -> BucketId {
        BucketId(0)
    }

    pub fn find_or_create_child(&mut self, parent: BucketId, name: &str) -> BucketId {
        if let Some(&existing) = self.buckets[parent.0].by_name.get(name) {
            return existing;
        }
        let id = BucketId(self.buckets.len());
        self.buckets.push(Bucket::new(name));
        let parent = &mut self.buckets[parent.0];
        parent.child_buckets.push(id);
        parent.by_name.insert(name.to_string(), id);
        id
    }

    /// Find or create each bucket along `path`, starting at the root
    pub fn bucket_at(&mut self, path: &[&str]) -> BucketId {
        path.iter().fold(self.root(), |parent, name| self.find_or_create_child(parent, name))
    }

    pub fn add_member(&mut self, bucket: BucketId, node: NodeIndex) {
        self.buckets[bucket.0].members.push(node);
    }

    #[must_use]
    pub fn name(&self, bucket: BucketId) -> &str {
        &self.buckets[bucket.0].name
    }

    #[must_use]
    pub fn members(&self, bucket: BucketId) -> &[NodeIndex] {
        &self.buckets[bucket.0].members
    }

    /// Child bucket called `name`, if it exists
    #[must_use]
    pub fn child(&self, parent: BucketId, name: &str) -> Option<BucketId> {
        self.buckets[parent.0].by_name.get(name).copied()
    }

    /// Turn every bucket into a defined graph node; returns the root's node
    pub fn materialize<G: GraphSink>(self, graph: &mut G) -> NodeIndex {
        let mut nodes: Vec<Option<NodeIndex>> = vec![None; self.buckets.len()];
        // Buckets are always created after their parent, so walking backwards
        // visits children first.
        for (id, bucket) in self.buckets.iter().enumerate().rev() {
            let node = graph.create_node();
            let mut children: Vec<NodeIndex> =
                bucket.child_buckets.iter().filter_map(|child| nodes[child.0]).collect();
            children.extend_from_slice(&bucket.members);
            let ty = graph.create_type(&bucket.name, None);
            graph.define_node(node, ty, 0, &children);
            nodes[id] = Some(node);
        }
        nodes[0].unwrap_or_else(|| graph.create_node())
    }
}
