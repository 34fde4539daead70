//! Which process a capture is about.

use std::fmt;
use std::path::Path;

use crate::domain::Pid;

/// Target process selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessSelector {
    Pid(Pid),
    /// First process whose image name matches
    Name(String),
    /// First process that reports a dump
    Any,
}

impl ProcessSelector {
    /// `*` selects any process, digits a pid, anything else a name
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text == "*" {
            Self::Any
        } else if let Ok(pid) = text.parse::<u32>() {
            Self::Pid(Pid(pid))
        } else {
            Self::Name(text.to_string())
        }
    }

    /// Pid to put in the provider filter, if the selector names one
    #[must_use]
    pub fn pid(&self) -> Option<Pid> {
        match self {
            Self::Pid(pid) => Some(*pid),
            Self::Name(_) | Self::Any => None,
        }
    }

    /// Whether a record from `pid` (with image name `image_name`, if known)
    /// belongs to the target
    #[must_use]
    pub fn matches(&self, pid: Pid, image_name: Option<&str>) -> bool {
        match self {
            Self::Pid(target) => *target == pid,
            Self::Name(pattern) => image_name.is_some_and(|name| is_match(name, pattern)),
            Self::Any => true,
        }
    }
}

impl fmt::Display for ProcessSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pid(pid) => write!(f, "process {pid}"),
            Self::Name(name) => write!(f, "process matching '{name}'"),
            Self::Any => write!(f, "any process"),
        }
    }
}

/// Check if an image name matches the search pattern.
///
/// Image names on Windows are case-insensitive and usually carry an `.exe`
/// extension the user leaves off.
fn is_match(image_name: &str, pattern: &str) -> bool {
    let image_basename = basename(image_name).to_ascii_lowercase();
    let pattern_basename = basename(pattern).to_ascii_lowercase();
    let image_stem = image_basename.strip_suffix(".exe").unwrap_or(&image_basename);

    // Exact match on basename or stem
    image_basename == pattern_basename
        || image_stem == pattern_basename
        // Substring match for flexibility
        || image_basename.contains(&pattern_basename)
}

fn basename(path: &str) -> &str {
    match path.rsplit_once('\\') {
        Some((_dir, name)) => name,
        None => Path::new(path).file_name().and_then(|n| n.to_str()).unwrap_or(path),
    }
}
