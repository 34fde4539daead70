//! # Image and Module Resolution
//!
//! Types in an address-based runtime are identified by an offset inside a
//! loaded image, and static-variable roots are recognised by falling inside
//! an image's address range. This module keeps track of those images.
//!
//! ## Sources of Module Information
//!
//! ```text
//! 1. Kernel image load         base, size, build stamp, file path
//! 2. Kernel debug-id record    PDB name / GUID / age, same timestamp as (1)
//! 3. Runtime loader record     runtime module id -> IL / native path
//! 4. PE file on disk           PDB signature when (2) never arrived
//! ```
//!
//! ## Module Structure
//!
//! - **`module_table`**: [`ModuleResolver`], image ranges, lazy module creation
//! - **`pe_info`**: [`PeReader`] and the `object`-based implementation

pub mod module_table;
pub mod pe_info;

pub use module_table::{ImageInfo, MemoryRange, ModuleResolver};
pub use pe_info::{ObjectPeReader, PeReader};
