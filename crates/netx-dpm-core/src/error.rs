//! Error types for netx-dpm-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate.

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Detection errors
    /// No cookie or boot identifier matched any known chip family
    DetectionFailed,

    // Handshake errors
    /// Peer did not acknowledge within the timeout
    HandshakeTimeout,
    /// Mailbox lock is held elsewhere
    DeviceBusy,

    // Transfer errors
    /// Retry budget exhausted, current transfer aborted
    TransferAborted,
    /// Device returned less data than expected during upload
    ShortRead {
        /// Number of bytes expected for this chunk
        expected: u32,
        /// Number of bytes actually received
        got: u32,
    },
    /// File extension is not in the recognized set
    UnknownFileType,
    /// File is not present in the channel's file table
    FileNotFound,

    // Address/size errors
    /// Access beyond the DPM window
    AddressOutOfBounds,
    /// Provided buffer is too small for the operation
    BufferTooSmall,
    /// Payload exceeds the mailbox buffer for this direction
    PayloadTooLarge,
    /// Filename does not follow the 8.3 short name convention
    InvalidFileName,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DetectionFailed => write!(f, "no netX chip detected"),
            Self::HandshakeTimeout => write!(f, "mailbox handshake timed out"),
            Self::DeviceBusy => write!(f, "mailbox is busy"),
            Self::TransferAborted => write!(f, "transfer aborted: retry budget exhausted"),
            Self::ShortRead { expected, got } => {
                write!(f, "short read: expected {} bytes, got {}", expected, got)
            }
            Self::UnknownFileType => write!(f, "unrecognized file type"),
            Self::FileNotFound => write!(f, "file not found in channel file table"),
            Self::AddressOutOfBounds => write!(f, "access beyond DPM window"),
            Self::BufferTooSmall => write!(f, "buffer too small"),
            Self::PayloadTooLarge => write!(f, "payload exceeds mailbox buffer"),
            Self::InvalidFileName => write!(f, "invalid 8.3 filename"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
