//! PDB signature lookup from PE files on disk
//!
//! Used only when the trace never delivered a debug-id record for an image.

use anyhow::{bail, Context, Result};
use object::read::pe::{PeFile32, PeFile64};
use object::{FileKind, Object};
use std::fs;
use std::path::Path;

use crate::graph::PdbIdentity;

/// Reads the CodeView (PDB) record out of an image file
pub trait PeReader: Send {
    /// `Ok(None)` when the image carries no PDB record
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a PE image
    fn read_pdb_identity(&self, path: &Path) -> Result<Option<PdbIdentity>>;
}

/// [`PeReader`] backed by the `object` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectPeReader;

impl PeReader for ObjectPeReader {
    fn read_pdb_identity(&self, path: &Path) -> Result<Option<PdbIdentity>> {
        let data =
            fs::read(path).with_context(|| format!("Failed to read image {}", path.display()))?;
        pdb_identity_from_bytes(&data)
    }
}

/// Parse a PE image held in memory
///
/// # Errors
/// Returns an error if `data` is not a 32- or 64-bit PE image
pub fn pdb_identity_from_bytes(data: &[u8]) -> Result<Option<PdbIdentity>> {
    let kind = FileKind::parse(data).context("Failed to identify image format")?;
    let code_view = match kind {
        FileKind::Pe32 => PeFile32::parse(data)
            .context("Failed to parse PE32 image")?
            .pdb_info()
            .context("Failed to read debug directory")?
            .map(|cv| (cv.path().to_vec(), cv.guid(), cv.age())),
        FileKind::Pe64 => PeFile64::parse(data)
            .context("Failed to parse PE32+ image")?
            .pdb_info()
            .context("Failed to read debug directory")?
            .map(|cv| (cv.path().to_vec(), cv.guid(), cv.age())),
        other => bail!("Not a PE image ({other:?})"),
    };

    Ok(code_view.map(|(path, guid, age)| {
        let path = String::from_utf8_lossy(&path).into_owned();
        let name = match path.rsplit_once(['/', '\\']) {
            Some((_dir, file_name)) => file_name.to_string(),
            None => path,
        };
        PdbIdentity { name, guid: format_guid(&guid), age }
    }))
}

/// Format a CodeView GUID the way debug-id records spell it
///
/// The first three fields are stored little-endian.
#[must_use]
pub fn format_guid(bytes: &[u8; 16]) -> String {
    let data1 = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let data2 = u16::from_le_bytes([bytes[4], bytes[5]]);
    let data3 = u16::from_le_bytes([bytes[6], bytes[7]]);
    format!(
        "{data1:08x}-{data2:04x}-{data3:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_guid_mixed_endian() {
        let bytes = [
            0x78, 0x56, 0x34, 0x12, 0x34, 0x12, 0x78, 0x56, 0x9a, 0xbc, 0xde, 0xf0, 0x01, 0x02,
            0x03, 0x04,
        ];
        assert_eq!(format_guid(&bytes), "12345678-1234-5678-9abc-def001020304");
    }

    #[test]
    fn test_non_pe_data_is_an_error() {
        assert!(pdb_identity_from_bytes(b"definitely not an image").is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = ObjectPeReader.read_pdb_identity(Path::new("/nonexistent/image.dll"));
        assert!(result.is_err());
    }
}
