//! DPM window access trait
//!
//! The dual-port memory is a shared window addressable by both the host and
//! the netX controller. How the window is actually reached (PCI BAR, serial
//! DPM over SPI, memory-mapped bus) is the host's concern; this crate only
//! requires the byte-level primitives below.
//!
//! All multi-byte registers in the DPM are little-endian on the wire. The
//! 16/32-bit accessors take and return host-order values; the conversion
//! happens here, once, so the rest of the crate never touches raw bytes.

use crate::error::{Error, Result};

/// Access to one dual-port memory window.
///
/// Implementors provide bounds-checked block access plus a delay primitive;
/// the sized accessors are derived from those. `delay_us` lives on this
/// trait because polling intervals must be slept on whatever the host's
/// notion of time is - the protocol code never busy-spins on its own.
pub trait DpmWindow {
    /// Size of the window in bytes
    fn size(&self) -> usize;

    /// Read a block of bytes starting at `offset`
    fn read_block(&mut self, offset: u32, buf: &mut [u8]) -> Result<()>;

    /// Write a block of bytes starting at `offset`
    fn write_block(&mut self, offset: u32, data: &[u8]) -> Result<()>;

    /// Sleep for at least the specified number of microseconds
    fn delay_us(&mut self, us: u32);

    /// Read a single byte
    fn read8(&mut self, offset: u32) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_block(offset, &mut b)?;
        Ok(b[0])
    }

    /// Read a little-endian 16-bit register
    fn read16(&mut self, offset: u32) -> Result<u16> {
        let mut b = [0u8; 2];
        self.read_block(offset, &mut b)?;
        Ok(u16::from_le_bytes(b))
    }

    /// Read a little-endian 32-bit register
    fn read32(&mut self, offset: u32) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read_block(offset, &mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    /// Write a single byte
    fn write8(&mut self, offset: u32, value: u8) -> Result<()> {
        self.write_block(offset, &[value])
    }

    /// Write a little-endian 16-bit register
    fn write16(&mut self, offset: u32, value: u16) -> Result<()> {
        self.write_block(offset, &value.to_le_bytes())
    }

    /// Write a little-endian 32-bit register
    fn write32(&mut self, offset: u32, value: u32) -> Result<()> {
        self.write_block(offset, &value.to_le_bytes())
    }
}

/// Bounds check helper for `DpmWindow` implementations
pub fn check_range(window_size: usize, offset: u32, len: usize) -> Result<()> {
    let end = offset as u64 + len as u64;
    if end > window_size as u64 {
        return Err(Error::AddressOutOfBounds);
    }
    Ok(())
}
