//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep heap addresses, graph arena indices and process
//! ids from being mixed up, and make function signatures more expressive.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

impl From<u32> for Pid {
    fn from(pid: u32) -> Self {
        Pid(pid)
    }
}

/// Address in the target process
///
/// Heap object addresses, native handles, image bases and root ids all travel
/// as addresses. Zero is the "no value" sentinel the runtime uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub u64);

impl Address {
    #[must_use]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Index into the graph's node arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    #[must_use]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node#{}", self.0)
    }
}

/// Index into the graph's type arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIndex(pub u32);

impl TypeIndex {
    #[must_use]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type#{}", self.0)
    }
}

/// Index into the graph's module arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleIndex(pub u32);

impl ModuleIndex {
    #[must_use]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Trace timestamp (raw ticks as delivered by the session)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_display() {
        assert_eq!(Pid(1234).to_string(), "PID:1234");
    }

    #[test]
    fn test_address_null_and_display() {
        assert!(Address(0).is_null());
        assert!(!Address(0x1000).is_null());
        assert_eq!(Address(0xdead).to_string(), "0xdead");
    }

    #[test]
    fn test_index_display() {
        assert_eq!(NodeIndex(7).to_string(), "Node#7");
        assert_eq!(TypeIndex(3).to_string(), "Type#3");
        assert_eq!(NodeIndex(7).as_usize(), 7);
    }
}
