//! Owned trace records
//!
//! Every record the capture pipeline understands, as an owned value. Event
//! delivery layers reuse their buffers between callbacks, so queuing a record
//! always means cloning one of these (a deep copy, `Vec` payloads included);
//! nothing in the pipeline keeps a borrow into a delivery buffer.
//!
//! The same types are the JSON-lines recording format (`kind`-tagged).

use heapsnap_common::{
    NATIVE_RUNTIME_PROVIDER_GUID, PRIVATE_RUNTIME_PROVIDER_GUID, RUNDOWN_PROVIDER_GUID,
    RUNTIME_PROVIDER_GUID,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{Address, Pid, Timestamp};

/// Provider a record originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Kernel,
    #[default]
    Runtime,
    Rundown,
    /// Address-based ("Project N") runtime
    NativeRuntime,
    PrivateRuntime,
}

impl Provider {
    /// Provider GUID; the kernel logger has none
    #[must_use]
    pub fn guid(self) -> Option<&'static str> {
        match self {
            Self::Kernel => None,
            Self::Runtime => Some(RUNTIME_PROVIDER_GUID),
            Self::Rundown => Some(RUNDOWN_PROVIDER_GUID),
            Self::NativeRuntime => Some(NATIVE_RUNTIME_PROVIDER_GUID),
            Self::PrivateRuntime => Some(PRIVATE_RUNTIME_PROVIDER_GUID),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Kernel => "Kernel",
            Self::Runtime => "Runtime",
            Self::Rundown => "Rundown",
            Self::NativeRuntime => "NativeRuntime",
            Self::PrivateRuntime => "PrivateRuntime",
        };
        f.write_str(name)
    }
}

/// Kernel process start (or process rundown)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStartEvent {
    pub pid: Pid,
    #[serde(default)]
    pub timestamp: Timestamp,
    pub image_name: String,
}

/// Kernel image load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageLoadEvent {
    pub pid: Pid,
    #[serde(default)]
    pub timestamp: Timestamp,
    pub image_base: Address,
    pub image_size: u64,
    /// Link-time stamp from the PE header
    #[serde(default)]
    pub build_timestamp: u32,
    pub file_name: String,
}

/// Debug identifier emitted right after an image load with the same timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDebugIdEvent {
    pub pid: Pid,
    #[serde(default)]
    pub timestamp: Timestamp,
    pub image_base: Address,
    pub guid: String,
    pub age: u32,
    pub pdb_name: String,
}

/// Runtime loader module load / unload (live or rundown)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleLoadEvent {
    pub pid: Pid,
    #[serde(default)]
    pub timestamp: Timestamp,
    #[serde(default)]
    pub provider: Provider,
    pub module_id: Address,
    #[serde(default)]
    pub il_path: String,
    #[serde(default)]
    pub native_path: String,
    #[serde(default)]
    pub unload: bool,
}

impl ModuleLoadEvent {
    /// Path used to name the module (native image preferred)
    #[must_use]
    pub fn path(&self) -> &str {
        if self.native_path.is_empty() {
            &self.il_path
        } else {
            &self.native_path
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcStartEvent {
    pub pid: Pid,
    #[serde(default)]
    pub timestamp: Timestamp,
    #[serde(default)]
    pub provider: Provider,
    /// Collection identifier, matched by the stop record
    pub count: u32,
    /// Deepest generation collected
    pub depth: u32,
    pub gc_type: u32,
    pub reason: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcStopEvent {
    pub pid: Pid,
    #[serde(default)]
    pub timestamp: Timestamp,
    #[serde(default)]
    pub provider: Provider,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DumpPhase {
    Begin,
    End,
}

/// Generation-aware dump marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpMarkerEvent {
    pub pid: Pid,
    #[serde(default)]
    pub timestamp: Timestamp,
    pub phase: DumpPhase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkTypeValue {
    pub type_id: u64,
    #[serde(default)]
    pub module_id: u64,
    /// Offset of the type's name in its image (address-based runtime)
    #[serde(default)]
    pub type_name_id: u64,
    #[serde(default)]
    pub flags: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub type_parameters: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkTypeBlock {
    pub pid: Pid,
    #[serde(default)]
    pub timestamp: Timestamp,
    #[serde(default)]
    pub provider: Provider,
    pub index: u32,
    pub types: Vec<BulkTypeValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkNodeValue {
    pub address: Address,
    pub size: u64,
    pub type_id: u64,
    pub edge_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkNodeBlock {
    pub pid: Pid,
    #[serde(default)]
    pub timestamp: Timestamp,
    #[serde(default)]
    pub provider: Provider,
    pub index: u32,
    pub nodes: Vec<BulkNodeValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkEdgeValue {
    pub target: Address,
    #[serde(default)]
    pub field_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkEdgeBlock {
    pub pid: Pid,
    #[serde(default)]
    pub timestamp: Timestamp,
    #[serde(default)]
    pub provider: Provider,
    pub index: u32,
    pub edges: Vec<BulkEdgeValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootEdgeValue {
    pub object: Address,
    pub kind: u32,
    #[serde(default)]
    pub flags: u32,
    #[serde(default)]
    pub root_id: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkRootEdgeBlock {
    pub pid: Pid,
    #[serde(default)]
    pub timestamp: Timestamp,
    #[serde(default)]
    pub provider: Provider,
    pub index: u32,
    pub roots: Vec<RootEdgeValue>,
}

/// Conditional weak table entry: `value` is alive as long as `key` is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeakTableEdgeValue {
    pub key: Address,
    pub value: Address,
    #[serde(default)]
    pub root_id: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkWeakTableEdgeBlock {
    pub pid: Pid,
    #[serde(default)]
    pub timestamp: Timestamp,
    #[serde(default)]
    pub provider: Provider,
    pub index: u32,
    pub entries: Vec<WeakTableEdgeValue>,
}

/// COM-callable wrapper rooting a managed object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CcwValue {
    /// Address of the wrapper itself
    pub root_id: Address,
    pub object: Address,
    pub type_id: u64,
    /// Native interface pointer; set lazily by the runtime, may stay zero
    #[serde(default)]
    pub iunknown: Address,
    #[serde(default)]
    pub ref_count: u32,
    #[serde(default)]
    pub flags: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkCcwBlock {
    pub pid: Pid,
    #[serde(default)]
    pub timestamp: Timestamp,
    #[serde(default)]
    pub provider: Provider,
    pub index: u32,
    pub wrappers: Vec<CcwValue>,
}

/// Runtime-callable wrapper: managed object standing for a native one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RcwValue {
    pub object: Address,
    #[serde(default)]
    pub type_id: u64,
    pub iunknown: Address,
    #[serde(default)]
    pub ref_count: u32,
    #[serde(default)]
    pub flags: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkRcwBlock {
    pub pid: Pid,
    #[serde(default)]
    pub timestamp: Timestamp,
    #[serde(default)]
    pub provider: Provider,
    pub index: u32,
    pub wrappers: Vec<RcwValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticVarValue {
    pub root_id: Address,
    pub object: Address,
    pub type_id: u64,
    #[serde(default)]
    pub flags: u32,
    pub field_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkStaticVarBlock {
    pub pid: Pid,
    #[serde(default)]
    pub timestamp: Timestamp,
    #[serde(default)]
    pub provider: Provider,
    pub index: u32,
    pub statics: Vec<StaticVarValue>,
}

/// One generation's address range after (or before) a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRangeEvent {
    pub pid: Pid,
    #[serde(default)]
    pub timestamp: Timestamp,
    #[serde(default)]
    pub provider: Provider,
    pub generation: u32,
    pub range_start: Address,
    pub used_length: u64,
    #[serde(default)]
    pub reserved_length: u64,
}

/// Every record the demuxer classifies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEvent {
    ProcessStart(ProcessStartEvent),
    ImageLoad(ImageLoadEvent),
    ImageDebugId(ImageDebugIdEvent),
    ModuleLoad(ModuleLoadEvent),
    GcStart(GcStartEvent),
    GcStop(GcStopEvent),
    DumpMarker(DumpMarkerEvent),
    BulkType(BulkTypeBlock),
    BulkNode(BulkNodeBlock),
    BulkEdge(BulkEdgeBlock),
    BulkRootEdge(BulkRootEdgeBlock),
    BulkWeakTableEdge(BulkWeakTableEdgeBlock),
    BulkCcw(BulkCcwBlock),
    BulkRcw(BulkRcwBlock),
    BulkStaticVar(BulkStaticVarBlock),
    GenerationRange(GenerationRangeEvent),
}

impl TraceEvent {
    #[must_use]
    pub fn pid(&self) -> Pid {
        match self {
            Self::ProcessStart(e) => e.pid,
            Self::ImageLoad(e) => e.pid,
            Self::ImageDebugId(e) => e.pid,
            Self::ModuleLoad(e) => e.pid,
            Self::GcStart(e) => e.pid,
            Self::GcStop(e) => e.pid,
            Self::DumpMarker(e) => e.pid,
            Self::BulkType(e) => e.pid,
            Self::BulkNode(e) => e.pid,
            Self::BulkEdge(e) => e.pid,
            Self::BulkRootEdge(e) => e.pid,
            Self::BulkWeakTableEdge(e) => e.pid,
            Self::BulkCcw(e) => e.pid,
            Self::BulkRcw(e) => e.pid,
            Self::BulkStaticVar(e) => e.pid,
            Self::GenerationRange(e) => e.pid,
        }
    }

    #[must_use]
    pub fn provider(&self) -> Provider {
        match self {
            Self::ProcessStart(_) | Self::ImageLoad(_) | Self::ImageDebugId(_) => Provider::Kernel,
            Self::DumpMarker(_) => Provider::PrivateRuntime,
            Self::ModuleLoad(e) => e.provider,
            Self::GcStart(e) => e.provider,
            Self::GcStop(e) => e.provider,
            Self::BulkType(e) => e.provider,
            Self::BulkNode(e) => e.provider,
            Self::BulkEdge(e) => e.provider,
            Self::BulkRootEdge(e) => e.provider,
            Self::BulkWeakTableEdge(e) => e.provider,
            Self::BulkCcw(e) => e.provider,
            Self::BulkRcw(e) => e.provider,
            Self::BulkStaticVar(e) => e.provider,
            Self::GenerationRange(e) => e.provider,
        }
    }

    /// Short record name for logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProcessStart(_) => "ProcessStart",
            Self::ImageLoad(_) => "ImageLoad",
            Self::ImageDebugId(_) => "ImageDebugId",
            Self::ModuleLoad(_) => "ModuleLoad",
            Self::GcStart(_) => "GcStart",
            Self::GcStop(_) => "GcStop",
            Self::DumpMarker(_) => "DumpMarker",
            Self::BulkType(_) => "BulkType",
            Self::BulkNode(_) => "BulkNode",
            Self::BulkEdge(_) => "BulkEdge",
            Self::BulkRootEdge(_) => "BulkRootEdge",
            Self::BulkWeakTableEdge(_) => "BulkWeakTableEdge",
            Self::BulkCcw(_) => "BulkCcw",
            Self::BulkRcw(_) => "BulkRcw",
            Self::BulkStaticVar(_) => "BulkStaticVar",
            Self::GenerationRange(_) => "GenerationRange",
        }
    }
}
