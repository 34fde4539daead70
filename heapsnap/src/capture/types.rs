//! # Type Interning
//!
//! Runtime type ids are process-local handles; several of them can describe
//! the same type (module reloads, rundown repeats). The interner maps every
//! raw id onto one canonical graph type.
//!
//! ## Canonical Identity
//!
//! ```text
//! name-based runtime     "<module>!<normalized name>"   -> TypeIndex
//! address-based runtime  (module, name offset)          -> TypeIndex
//! size bucket            (base TypeIndex, bucket)       -> TypeIndex
//! ```

use log::{debug, warn};
use std::collections::HashMap;

use heapsnap_common::{TYPE_FLAG_ARRAY, TYPE_FLAG_EXTERNALLY_IMPLEMENTED_COM};

use crate::domain::{Address, ModuleIndex, TypeIndex};
use crate::events::BulkTypeValue;
use crate::graph::{GraphSink, TypeView};
use crate::image::ModuleResolver;

/// Prefix for types implemented outside the runtime (COM / WinRT)
pub const RCW_PREFIX: &str = "[RCW] ";

/// Name suffix of address-based static variable types
pub const STATIC_VAR_SUFFIX: &str = " (static var)";

/// Instances above this many bytes get a size-bucketed type
pub const SIZE_BUCKET_THRESHOLD: u64 = 1000;

/// Lower bound (exclusive) and name suffix of each size bucket
pub const SIZE_BUCKETS: [(u64, &str); 6] = [
    (1_000, " (Bytes > 1K)"),
    (10_000, " (Bytes > 10K)"),
    (100_000, " (Bytes > 100K)"),
    (1_000_000, " (Bytes > 1M)"),
    (10_000_000, " (Bytes > 10M)"),
    (100_000_000, " (Bytes > 100M)"),
];

/// Index into [`SIZE_BUCKETS`] for an instance of `size` bytes
#[must_use]
pub fn size_bucket(size: u64) -> Option<usize> {
    SIZE_BUCKETS.iter().rposition(|&(threshold, _)| size > threshold)
}

/// Canonical display form of a runtime type name.
///
/// Strips generic arity (`` List`1 `` becomes `List`) and rewrites bracketed
/// generic arguments to angle brackets, leaving array ranks (`[]`, `[,]`)
/// alone:
///
/// ```text
/// System.Collections.Generic.Dictionary`2[System.String,System.Int32]
///   -> System.Collections.Generic.Dictionary<System.String,System.Int32>
/// System.Int32[,]  -> System.Int32[,]
/// ```
#[must_use]
pub fn normalize_type_name(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len());
    // For each open '[': true if it was rewritten to '<'
    let mut open: Vec<bool> = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '`' => {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                continue;
            }
            '[' => {
                let is_array_rank = chars[i + 1..]
                    .iter()
                    .take_while(|&&c| c != ']')
                    .all(|&c| c == ',')
                    && chars[i + 1..].contains(&']');
                if is_array_rank {
                    out.push('[');
                    open.push(false);
                } else {
                    out.push('<');
                    open.push(true);
                }
            }
            ']' => match open.pop() {
                Some(true) => out.push('>'),
                _ => out.push(']'),
            },
            c => out.push(c),
        }
        i += 1;
    }
    out
}

/// Maps raw runtime type ids to canonical graph types
#[derive(Debug, Default)]
pub struct TypeInterner {
    by_raw_id: HashMap<u64, TypeIndex>,
    by_name: HashMap<String, TypeIndex>,
    by_offset: HashMap<(ModuleIndex, u64), TypeIndex>,
    statics: HashMap<(ModuleIndex, u64), TypeIndex>,
    bucketed: HashMap<(TypeIndex, usize), TypeIndex>,
    /// Normalized names by raw id, for array placeholders
    raw_names: HashMap<u64, String>,
    /// Taken from the graph on first lookup
    scratch: Option<TypeView>,
}

impl TypeInterner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_raw_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_raw_id.is_empty()
    }

    #[must_use]
    pub fn get(&self, type_id: u64) -> Option<TypeIndex> {
        self.by_raw_id.get(&type_id).copied()
    }

    /// Intern a type record from the name-based runtime
    pub fn intern_named<G: GraphSink>(
        &mut self,
        graph: &mut G,
        modules: &mut ModuleResolver,
        value: &BulkTypeValue,
    ) -> TypeIndex {
        let mut name = if value.name.is_empty() {
            self.placeholder_name(value)
        } else {
            normalize_type_name(&value.name)
        };
        if value.flags & TYPE_FLAG_EXTERNALLY_IMPLEMENTED_COM != 0 {
            name.insert_str(0, RCW_PREFIX);
        }
        self.raw_names.insert(value.type_id, name.clone());

        let module = if value.module_id == 0 {
            None
        } else {
            let path = match modules.runtime_module_path(Address(value.module_id)) {
                Some(path) => path.to_string(),
                None => format!("UnknownModule_0x{:x}", value.module_id),
            };
            Some(modules.resolve_module_by_path(graph, &path))
        };

        let ty = self.intern_name(graph, &name, module);
        self.by_raw_id.insert(value.type_id, ty);
        ty
    }

    /// Type for `name` in `module`, created on first use
    pub fn intern_name<G: GraphSink>(
        &mut self,
        graph: &mut G,
        name: &str,
        module: Option<ModuleIndex>,
    ) -> TypeIndex {
        let key = match module {
            Some(module) => format!("{}!{name}", graph.module(module).name()),
            None => name.to_string(),
        };
        if let Some(&existing) = self.by_name.get(&key) {
            return existing;
        }
        let ty = graph.create_type(name, module);
        self.by_name.insert(key, ty);
        ty
    }

    /// Human-readable name of `ty`; offset types are qualified by module
    pub fn display_name<G: GraphSink>(&mut self, graph: &G, ty: TypeIndex) -> String {
        let view = self.load(graph, ty);
        match (view.offset, view.module) {
            (Some(_), Some(module)) => format!("{}!{}", graph.module(module).name(), view.name),
            _ => view.name.clone(),
        }
    }

    fn load<G: GraphSink>(&mut self, graph: &G, ty: TypeIndex) -> &TypeView {
        let view = self.scratch.get_or_insert_with(|| graph.alloc_type_storage());
        graph.load_type(ty, view);
        view
    }

    /// Intern a type record from the address-based runtime.
    ///
    /// The type id is an address inside the image and `type_name_id` its
    /// offset from the image base.
    pub fn intern_by_offset<G: GraphSink>(
        &mut self,
        graph: &mut G,
        modules: &mut ModuleResolver,
        value: &BulkTypeValue,
    ) -> TypeIndex {
        let image_base = Address(value.type_id.wrapping_sub(value.type_name_id));
        let module = modules.resolve_module_by_image_base(graph, image_base);
        let offset = value.type_name_id;
        let ty = *self
            .by_offset
            .entry((module, offset))
            .or_insert_with(|| graph.create_type_at_offset(offset, module, 0, ""));
        self.by_raw_id.insert(value.type_id, ty);
        ty
    }

    /// Type of the static variable at `offset` inside `module` (address-based
    /// runtime roots)
    pub fn intern_static_at_offset<G: GraphSink>(
        &mut self,
        graph: &mut G,
        module: ModuleIndex,
        offset: u64,
    ) -> TypeIndex {
        *self
            .statics
            .entry((module, offset))
            .or_insert_with(|| graph.create_type_at_offset(offset, module, 0, STATIC_VAR_SUFFIX))
    }

    /// Canonical type for a node, substituting a placeholder for unknown ids
    pub fn type_for_node<G: GraphSink>(&mut self, graph: &mut G, type_id: u64) -> TypeIndex {
        if let Some(ty) = self.get(type_id) {
            return ty;
        }
        warn!("Unknown type id 0x{type_id:x}, using a placeholder type");
        let ty = graph.create_type(&format!("UNKNOWN_TYPE 0x{type_id:x}"), None);
        self.by_raw_id.insert(type_id, ty);
        ty
    }

    /// `base`, or its size-bucketed variant when `size` is over the threshold
    pub fn sized_type<G: GraphSink>(
        &mut self,
        graph: &mut G,
        base: TypeIndex,
        size: u64,
    ) -> TypeIndex {
        let Some(bucket) = size_bucket(size) else {
            return base;
        };
        if let Some(&ty) = self.bucketed.get(&(base, bucket)) {
            return ty;
        }

        let suffix = SIZE_BUCKETS[bucket].1;
        let view = self.load(graph, base);
        let (offset, module) = (view.offset, view.module);
        let name = format!("{}{suffix}", view.name);
        let ty = match (offset, module) {
            (Some(offset), Some(module)) => graph.create_type_at_offset(offset, module, 0, suffix),
            _ => self.intern_name(graph, &name, module),
        };
        debug!("Created size bucket {ty} for {base}{suffix}");
        self.bucketed.insert((base, bucket), ty);
        ty
    }

    fn placeholder_name(&self, value: &BulkTypeValue) -> String {
        if value.flags & TYPE_FLAG_ARRAY != 0 {
            let element = value.type_parameters.first().and_then(|id| self.raw_names.get(id));
            if let Some(element) = element {
                return format!("{element}[]");
            }
        }
        format!("UNKNOWN_TYPE 0x{:x}", value.type_id)
    }
}
