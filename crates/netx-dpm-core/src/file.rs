//! File classification and descriptors
//!
//! Firmware and configuration files are identified purely by their short
//! (8.3) filename - the content is never inspected. The recognized
//! extension set is fixed: `.nxf` (firmware), `.nxo` (option module) and
//! the legacy `.nxm` (monolithic firmware module). Everything else is
//! `Unknown`, which is not an error; callers simply skip such files.

use core::fmt;

use crate::error::{Error, Result};

/// Maximum short filename length in characters. The wire format reserves
/// 16 bytes including the terminator.
pub const SHORT_NAME_MAX: usize = 15;

/// File category derived from the filename extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    /// Legacy monolithic firmware (`.nxm`)
    Firmware,
    /// netX firmware file (`.nxf`)
    Nxf,
    /// netX option module (`.nxo`)
    Nxo,
    /// Not a recognized file type; skipped by download logic
    Unknown,
}

impl FileCategory {
    /// True for any category that counts as firmware for removal purposes
    pub fn is_firmware(self) -> bool {
        !matches!(self, FileCategory::Unknown)
    }
}

/// Protocol-level transfer-type code, telling the device how to interpret
/// the file content. The code travels in the download request; the packet
/// encoding itself is not this crate's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TransferType {
    /// Complete firmware image
    Firmware = 1,
    /// Loadable module
    Module = 3,
}

/// Classify a file by its extension, case-insensitively
pub fn classify(name: &str) -> FileCategory {
    match extension(name) {
        Some(ext) if ext.eq_ignore_ascii_case("nxm") => FileCategory::Firmware,
        Some(ext) if ext.eq_ignore_ascii_case("nxf") => FileCategory::Nxf,
        Some(ext) if ext.eq_ignore_ascii_case("nxo") => FileCategory::Nxo,
        _ => FileCategory::Unknown,
    }
}

/// Wire transfer-type code for a filename, `None` if unrecognized
pub fn transfer_type(name: &str) -> Option<TransferType> {
    match classify(name) {
        FileCategory::Firmware | FileCategory::Nxf => Some(TransferType::Firmware),
        FileCategory::Nxo => Some(TransferType::Module),
        FileCategory::Unknown => None,
    }
}

fn extension(name: &str) -> Option<&str> {
    let dot = name.rfind('.')?;
    let ext = &name[dot + 1..];
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

/// Validated 8.3 short filename.
///
/// Stem of at most 8 characters, optional extension of at most 3, ASCII
/// only, no whitespace or path separators. Case is preserved as given;
/// lookups compare case-insensitively via [`ShortName::matches`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortName(heapless::String<SHORT_NAME_MAX>);

impl ShortName {
    /// Validate and store a short filename
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() || name.len() > SHORT_NAME_MAX {
            return Err(Error::InvalidFileName);
        }
        let (stem, ext) = match name.rfind('.') {
            Some(dot) => (&name[..dot], Some(&name[dot + 1..])),
            None => (name, None),
        };
        if stem.is_empty() || stem.len() > 8 {
            return Err(Error::InvalidFileName);
        }
        if let Some(ext) = ext {
            if ext.is_empty() || ext.len() > 3 {
                return Err(Error::InvalidFileName);
            }
        }
        let valid_char = |c: char| c.is_ascii_graphic() && !matches!(c, '/' | '\\' | ':' | '.');
        if !stem.chars().all(valid_char) || !ext.map_or(true, |e| e.chars().all(valid_char)) {
            return Err(Error::InvalidFileName);
        }

        let mut s = heapless::String::new();
        // Length was checked above
        s.push_str(name).map_err(|_| Error::InvalidFileName)?;
        Ok(Self(s))
    }

    /// The name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against another name
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }

    /// Category of this file
    pub fn category(&self) -> FileCategory {
        classify(&self.0)
    }
}

impl fmt::Display for ShortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Descriptor of a file as known to a channel. Immutable once created;
/// only the owning channel tracks its lifecycle.
#[cfg(any(test, feature = "alloc"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    short_name: ShortName,
    full_name: alloc::string::String,
    file_size: u32,
    transfer_type: TransferType,
}

#[cfg(any(test, feature = "alloc"))]
impl FileDescriptor {
    /// Create a descriptor, deriving the transfer type from the short name.
    ///
    /// Fails with [`Error::UnknownFileType`] for unrecognized extensions.
    pub fn new(short_name: ShortName, full_name: &str, file_size: u32) -> Result<Self> {
        let transfer_type =
            transfer_type(short_name.as_str()).ok_or(Error::UnknownFileType)?;
        Ok(Self {
            short_name,
            full_name: alloc::string::String::from(full_name),
            file_size,
            transfer_type,
        })
    }

    /// Short (8.3) filename
    pub fn short_name(&self) -> &ShortName {
        &self.short_name
    }

    /// Full path as supplied by the host
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// File length in bytes
    pub fn file_size(&self) -> u32 {
        self.file_size
    }

    /// Wire transfer-type code
    pub fn transfer_type(&self) -> TransferType {
        self.transfer_type
    }
}
