//! # Shared Trace Vocabulary (Provider ↔ Userspace)
//!
//! Defines the identifiers, keyword masks and record flag values that the
//! runtime's trace providers emit and that the capture pipeline interprets.
//! Every layer (session setup, event demultiplexing, graph building) reads
//! these constants from one place so that a runtime-version change is a
//! one-file edit.
//!
//! ## Key Groups
//!
//! - Provider identifiers (runtime, rundown, native runtime, kernel)
//! - Keyword masks used during the provider-enable sequence
//! - GC start classification values (type, reason)
//! - Root edge flags and kinds
//! - Bulk type flags and static variable flags

#![no_std]

// ============================================================================
// Providers
// ============================================================================

/// Managed runtime provider (`Microsoft-Windows-DotNETRuntime`)
pub const RUNTIME_PROVIDER_GUID: &str = "e13c0d23-ccbc-4e12-931b-d9cc2eee27e4";

/// Managed runtime rundown provider
///
/// Enabled after the GC-only pass so that module/loader records show up even
/// for modules loaded before the session started.
pub const RUNDOWN_PROVIDER_GUID: &str = "a669021c-c450-4609-a035-5af59af4df18";

/// Native (address-based, "Project N") runtime provider
///
/// Types reported by this provider carry module-relative offsets instead of
/// names.
pub const NATIVE_RUNTIME_PROVIDER_GUID: &str = "47c3ba0c-77f1-4eb0-8d4d-aef447f16a85";

/// Private runtime provider carrying the generation-aware dump markers
pub const PRIVATE_RUNTIME_PROVIDER_GUID: &str = "763fd754-7086-4dfe-95eb-c01a46faf4ca";

// ============================================================================
// Levels
// ============================================================================

pub const LEVEL_INFORMATIONAL: u8 = 4;
pub const LEVEL_VERBOSE: u8 = 5;

// ============================================================================
// Runtime Keywords
// ============================================================================

pub const KEYWORD_GC: u64 = 0x1;
pub const KEYWORD_LOADER: u64 = 0x8;
pub const KEYWORD_TYPE: u64 = 0x8_0000;
pub const KEYWORD_GC_HEAP_DUMP: u64 = 0x10_0000;
pub const KEYWORD_GC_HEAP_COLLECT: u64 = 0x80_0000;
pub const KEYWORD_GC_HEAP_AND_TYPE_NAMES: u64 = 0x100_0000;

/// Rundown keyword asking the runtime to enumerate already-loaded state
pub const KEYWORD_RUNDOWN_START: u64 = 0x40;

/// Everything needed to force and stream one heap dump
///
/// Enabling `KEYWORD_GC_HEAP_COLLECT` is what makes the runtime induce the
/// collection; the others select the bulk node/edge/type/root records.
pub const HEAP_DUMP_KEYWORDS: u64 = KEYWORD_GC
    | KEYWORD_TYPE
    | KEYWORD_GC_HEAP_DUMP
    | KEYWORD_GC_HEAP_COLLECT
    | KEYWORD_GC_HEAP_AND_TYPE_NAMES;

// ============================================================================
// Kernel Keywords
// ============================================================================

pub const KERNEL_KEYWORD_PROCESS: u64 = 0x1;
pub const KERNEL_KEYWORD_IMAGE_LOAD: u64 = 0x4;

// ============================================================================
// GC Start Classification
// ============================================================================

/// Blocking collection (no background marking)
pub const GC_TYPE_NON_CONCURRENT: u32 = 0;
pub const GC_TYPE_BACKGROUND: u32 = 1;
pub const GC_TYPE_FOREGROUND: u32 = 2;

pub const GC_REASON_ALLOC_SMALL: u32 = 0;
/// Explicitly requested collection (what a heap dump request produces)
pub const GC_REASON_INDUCED: u32 = 1;
pub const GC_REASON_LOW_MEMORY: u32 = 2;

/// Deepest generation a blocking full collection reports
pub const GC_MAX_GENERATION: u32 = 2;

// ============================================================================
// Root Edges
// ============================================================================

pub const ROOT_KIND_STACK: u32 = 0;
pub const ROOT_KIND_FINALIZER: u32 = 1;
pub const ROOT_KIND_HANDLE: u32 = 2;
pub const ROOT_KIND_OLDER: u32 = 3;
pub const ROOT_KIND_SIZED_REF: u32 = 4;
pub const ROOT_KIND_OVERFLOW: u32 = 5;

pub const ROOT_FLAG_PINNING: u32 = 0x1;
pub const ROOT_FLAG_WEAK_REF: u32 = 0x2;
pub const ROOT_FLAG_INTERIOR: u32 = 0x4;
/// Handle kept alive by an external reference count (COM/WinRT)
pub const ROOT_FLAG_REF_COUNTED: u32 = 0x8;

// ============================================================================
// Bulk Types
// ============================================================================

pub const TYPE_FLAG_FINALIZER: u32 = 0x1;
/// Type is implemented outside the runtime and reached through a wrapper
pub const TYPE_FLAG_EXTERNALLY_IMPLEMENTED_COM: u32 = 0x2;
pub const TYPE_FLAG_ARRAY: u32 = 0x8;

// ============================================================================
// Static Variables
// ============================================================================

pub const STATIC_VAR_FLAG_THREAD_LOCAL: u32 = 0x1;
