//! Module bookkeeping for the target process
//!
//! Collects what the trace says about loaded images (kernel image loads,
//! debug-id records, runtime loader records) and turns it into graph modules
//! on demand.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::Path;

use super::pe_info::{ObjectPeReader, PeReader};
use crate::domain::{Address, ModuleIndex, Timestamp};
use crate::events::{ImageDebugIdEvent, ImageLoadEvent, ModuleLoadEvent};
use crate::graph::{GraphModule, GraphSink, PdbIdentity};

/// Address range of a loaded image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    pub start: u64,
    pub end: u64,
}

impl MemoryRange {
    /// Check if an address falls within this memory range
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }
}

/// An image seen through kernel image-load records
#[derive(Debug, Clone)]
pub struct ImageInfo {
    pub range: MemoryRange,
    pub build_timestamp: u32,
    pub path: String,
    pub pdb: Option<PdbIdentity>,
    load_time: Timestamp,
}

pub struct ModuleResolver {
    images: Vec<ImageInfo>,
    image_by_base: HashMap<Address, usize>,
    /// Image load waiting for its debug-id record
    pending_debug_id: Option<usize>,
    /// Runtime module id → path; first writer wins
    runtime_modules: HashMap<Address, String>,
    modules_by_base: HashMap<Address, ModuleIndex>,
    modules_by_path: HashMap<String, ModuleIndex>,
    /// Most recently resolved image, for runs of lookups in the same module
    last_resolved: Option<(MemoryRange, ModuleIndex)>,
    pe_reader: Box<dyn PeReader>,
}

impl Default for ModuleResolver {
    fn default() -> Self {
        Self::new(Box::new(ObjectPeReader))
    }
}

impl ModuleResolver {
    #[must_use]
    pub fn new(pe_reader: Box<dyn PeReader>) -> Self {
        Self {
            images: Vec::new(),
            image_by_base: HashMap::new(),
            pending_debug_id: None,
            runtime_modules: HashMap::new(),
            modules_by_base: HashMap::new(),
            modules_by_path: HashMap::new(),
            last_resolved: None,
            pe_reader,
        }
    }

    pub fn record_image_load(&mut self, event: &ImageLoadEvent) {
        if let Some(&existing) = self.image_by_base.get(&event.image_base) {
            // Rundown repeats loads we may already have; keep the first record
            // but still let the debug-id that follows attach to it.
            self.pending_debug_id = Some(existing);
            self.images[existing].load_time = event.timestamp;
            return;
        }
        let index = self.images.len();
        self.images.push(ImageInfo {
            range: MemoryRange {
                start: event.image_base.0,
                end: event.image_base.0.saturating_add(event.image_size),
            },
            build_timestamp: event.build_timestamp,
            path: event.file_name.clone(),
            pdb: None,
            load_time: event.timestamp,
        });
        self.image_by_base.insert(event.image_base, index);
        self.pending_debug_id = Some(index);
    }

    /// Attach PDB identity to the image load carrying the same timestamp
    pub fn record_debug_id(&mut self, event: &ImageDebugIdEvent) {
        let Some(index) = self.pending_debug_id else {
            debug!("Debug id for {} with no preceding image load", event.image_base);
            return;
        };
        let image = &mut self.images[index];
        if image.load_time != event.timestamp {
            debug!(
                "Debug id at {:?} does not match image load at {:?}",
                event.timestamp, image.load_time
            );
            return;
        }
        if image.pdb.is_none() {
            image.pdb = Some(PdbIdentity {
                name: event.pdb_name.clone(),
                guid: event.guid.clone(),
                age: event.age,
            });
        }
        self.pending_debug_id = None;
    }

    pub fn record_runtime_module(&mut self, event: &ModuleLoadEvent) {
        let path = event.path();
        if path.is_empty() {
            return;
        }
        self.runtime_modules.entry(event.module_id).or_insert_with(|| path.to_string());
    }

    #[must_use]
    pub fn runtime_module_path(&self, module_id: Address) -> Option<&str> {
        self.runtime_modules.get(&module_id).map(String::as_str)
    }

    /// Module for the image at `base`, creating it on first use
    pub fn resolve_module_by_image_base<G: GraphSink>(
        &mut self,
        graph: &mut G,
        base: Address,
    ) -> ModuleIndex {
        if let Some(&module) = self.modules_by_base.get(&base) {
            return module;
        }

        let mut module = GraphModule { image_base: base, ..GraphModule::default() };
        if let Some(image) = self.image_by_base.get(&base).map(|&i| &self.images[i]) {
            module.size = image.range.end - image.range.start;
            module.build_timestamp = image.build_timestamp;
            module.path = Some(image.path.clone());
            module.pdb.clone_from(&image.pdb);
        } else if let Some(path) = self.runtime_modules.get(&base) {
            module.path = Some(path.clone());
        }

        if module.pdb.is_none() {
            if let Some(path) = module.path.as_deref() {
                module.pdb = self.read_pdb_fallback(path);
            }
        }

        let index = graph.create_module(module);
        self.modules_by_base.insert(base, index);
        index
    }

    /// Module whose image contains `addr`, if any
    pub fn resolve_module_for_address<G: GraphSink>(
        &mut self,
        graph: &mut G,
        addr: Address,
    ) -> Option<ModuleIndex> {
        if let Some((range, module)) = self.last_resolved {
            if range.contains(addr.0) {
                return Some(module);
            }
        }

        let range = self.images.iter().map(|image| image.range).find(|r| r.contains(addr.0))?;
        let module = self.resolve_module_by_image_base(graph, Address(range.start));
        self.last_resolved = Some((range, module));
        Some(module)
    }

    /// Module known only by path (name-based runtime types)
    pub fn resolve_module_by_path<G: GraphSink>(
        &mut self,
        graph: &mut G,
        path: &str,
    ) -> ModuleIndex {
        if let Some(&module) = self.modules_by_path.get(path) {
            return module;
        }
        let module = graph.create_module(GraphModule::from_path(path));
        self.modules_by_path.insert(path.to_string(), module);
        module
    }

    fn read_pdb_fallback(&self, path: &str) -> Option<PdbIdentity> {
        match self.pe_reader.read_pdb_identity(Path::new(path)) {
            Ok(Some(pdb)) => {
                info!("Read PDB signature for {path} from the image file");
                Some(pdb)
            }
            Ok(None) => {
                info!("Image {path} has no PDB signature");
                None
            }
            Err(e) => {
                warn!("Could not read PDB signature for {path}: {e:#}");
                None
            }
        }
    }
}
