//! ROM-loader DPM layout
//!
//! Byte-exact layout of the netX90/netX4x00 dual-port memory as presented
//! by the second-stage ROM loader (boot stage) and, for the application
//! stage, the trailing global register block.
//!
//! The layout is described as offset tables with typed accessor views
//! instead of `#[repr(C)]` overlays: offsets are fixed by the protocol
//! version and must not depend on host struct layout or alignment rules.
//! Only one of the two layouts is valid for a window at any time, depending
//! on the boot phase.

use crate::error::{Error, Result};
use crate::window::DpmWindow;

// =============================================================================
// Chip identification constants
// =============================================================================

/// netX90 base cookie, after masking out type and ROM step fields
pub const NETX90_COOKIE: u32 = 0x0900000D;
/// Device type sub-field of the netX90 version cookie
pub const NETX90_TYPE_MASK: u32 = 0x00FF0000;
/// ROM step sub-field of the netX90 version cookie
pub const NETX90_ROMSTEP_MASK: u32 = 0x0000FF00;

/// netX4000 version cookie, matched exactly
pub const NETX4000_COOKIE: u32 = 0x84524C0B;
/// netX4100 version cookie, matched exactly
pub const NETX4100_COOKIE: u32 = 0x93615B0B;

/// 'NXBL' boot identifier. Present once the ROM code is actually running.
pub const DPM_BOOT_ID: u32 = 0x4C42584E;
/// Window offset of the boot identifier
pub const DPM_BOOT_ID_OFFSET: u32 = 0x100;

// =============================================================================
// Boot-stage configuration area (window offset 0x00, 0x100 bytes)
// =============================================================================

/// DPM status word
pub const CFG_DPM_STATUS: u32 = 0x1C;
/// System status word
pub const CFG_DPM_SYS_STA: u32 = 0xD8;
/// Reset request word
pub const CFG_DPM_RESET_REQUEST: u32 = 0xDC;
/// Version/cookie word used for chip identification at boot stage
pub const CFG_DPM_NETX_VERSION: u32 = 0xFC;
/// Total size of the configuration area
pub const CFG_AREA_SIZE: u32 = 0x100;

/// DPM unlocked bit in the status word
pub const DPM_STATUS_UNLOCKED: u32 = 0x0000_0001;
/// Bit-flip indicator in the system status word
pub const SYS_STA_BITFLIP: u32 = 0x80;
/// netX state code field in the system status word
pub const SYS_STA_STATE_CODE_MASK: u32 = 0x00FF_0000;
/// Shift of the netX state code field
pub const SYS_STA_STATE_CODE_SHIFT: u32 = 16;

// =============================================================================
// Boot-stage mailbox block (window offset 0x100, 0x700 bytes)
// =============================================================================

/// Start of the mailbox block
pub const MAILBOX_BLOCK_OFFSET: u32 = 0x100;

/// Boot identifier word, relative to the block start
pub const MBX_BOOT_ID: u32 = 0x00;
/// DPM byte size word, relative to the block start
pub const MBX_BYTE_SIZE: u32 = 0x04;
/// Device-to-host message length, relative to the block start
pub const MBX_NETX_TO_HOST_SIZE: u32 = 0x78;
/// Host-to-device message length, relative to the block start
pub const MBX_HOST_TO_NETX_SIZE: u32 = 0x7C;
/// Handshake word, relative to the block start
pub const MBX_HANDSHAKE: u32 = 0x80;
/// Device-to-host data buffer, relative to the block start
pub const MBX_NETX_TO_HOST_DATA: u32 = 0x100;
/// Host-to-device data buffer, relative to the block start
pub const MBX_HOST_TO_NETX_DATA: u32 = 0x300;

/// Capacity of the device-to-host buffer
pub const NETX_TO_HOST_BUFFER_SIZE: u32 = 0x200;
/// Capacity of the host-to-device buffer
pub const HOST_TO_NETX_BUFFER_SIZE: u32 = 0x400;

/// Scratch region tolerant of transient corruption. Follows the mailbox
/// buffers and takes the rest of a 64 KiB window; not part of the message
/// protocol.
pub const BITFLIP_AREA_OFFSET: u32 = 0x800;
/// Size of the bit-flip scratch region
pub const BITFLIP_AREA_SIZE: u32 = 0xF800;

// =============================================================================
// Application-stage global register block (end of the window, 0x200 bytes)
// =============================================================================

/// Size of the trailing global register block
pub const GLOBAL_REGISTER_BLOCK_SIZE: u32 = 0x200;
/// Mirrored netX version word, relative to the block start
pub const GLOBAL_NETX_VERSION: u32 = 0x1F8;

/// Boot-stage configuration register view.
///
/// A transient, read-mostly view; create it on demand and drop it after
/// the access. Valid only while the ROM loader owns the window.
pub struct BootCfgArea<'a, W: DpmWindow> {
    win: &'a mut W,
}

impl<'a, W: DpmWindow> BootCfgArea<'a, W> {
    /// Create a view over the window's configuration area
    pub fn new(win: &'a mut W) -> Self {
        Self { win }
    }

    /// DPM status word
    pub fn status(&mut self) -> Result<u32> {
        self.win.read32(CFG_DPM_STATUS)
    }

    /// True if the DPM is unlocked for host access
    pub fn is_unlocked(&mut self) -> Result<bool> {
        Ok(self.status()? & DPM_STATUS_UNLOCKED != 0)
    }

    /// System status word
    pub fn system_status(&mut self) -> Result<u32> {
        self.win.read32(CFG_DPM_SYS_STA)
    }

    /// netX state code from the system status word
    pub fn state_code(&mut self) -> Result<u8> {
        let sta = self.system_status()?;
        Ok(((sta & SYS_STA_STATE_CODE_MASK) >> SYS_STA_STATE_CODE_SHIFT) as u8)
    }

    /// True if the ROM loader signals bit-flip test mode
    pub fn bitflip_active(&mut self) -> Result<bool> {
        Ok(self.system_status()? & SYS_STA_BITFLIP != 0)
    }

    /// Version/cookie word
    pub fn netx_version(&mut self) -> Result<u32> {
        self.win.read32(CFG_DPM_NETX_VERSION)
    }

    /// Request a device reset by writing the reset request word
    pub fn request_reset(&mut self, value: u32) -> Result<()> {
        self.win.write32(CFG_DPM_RESET_REQUEST, value)
    }
}

/// Boot-stage mailbox block view.
pub struct MailboxBlock<'a, W: DpmWindow> {
    win: &'a mut W,
}

impl<'a, W: DpmWindow> MailboxBlock<'a, W> {
    /// Create a view over the window's mailbox block
    pub fn new(win: &'a mut W) -> Self {
        Self { win }
    }

    fn reg(offset: u32) -> u32 {
        MAILBOX_BLOCK_OFFSET + offset
    }

    /// Boot identifier word ('NXBL' while the ROM code runs)
    pub fn boot_id(&mut self) -> Result<u32> {
        self.win.read32(Self::reg(MBX_BOOT_ID))
    }

    /// DPM byte size as reported by the ROM loader
    pub fn byte_size(&mut self) -> Result<u32> {
        self.win.read32(Self::reg(MBX_BYTE_SIZE))
    }

    /// Length of the current device-to-host message
    pub fn netx_to_host_size(&mut self) -> Result<u32> {
        self.win.read32(Self::reg(MBX_NETX_TO_HOST_SIZE))
    }

    /// Set the length of the current device-to-host message
    pub fn set_netx_to_host_size(&mut self, len: u32) -> Result<()> {
        self.win.write32(Self::reg(MBX_NETX_TO_HOST_SIZE), len)
    }

    /// Length of the current host-to-device message
    pub fn host_to_netx_size(&mut self) -> Result<u32> {
        self.win.read32(Self::reg(MBX_HOST_TO_NETX_SIZE))
    }

    /// Set the length of the current host-to-device message
    pub fn set_host_to_netx_size(&mut self, len: u32) -> Result<()> {
        self.win.write32(Self::reg(MBX_HOST_TO_NETX_SIZE), len)
    }

    /// Handshake word (both directions' flag pairs)
    pub fn handshake(&mut self) -> Result<u32> {
        self.win.read32(Self::reg(MBX_HANDSHAKE))
    }

    /// Write the handshake word
    pub fn set_handshake(&mut self, value: u32) -> Result<()> {
        self.win.write32(Self::reg(MBX_HANDSHAKE), value)
    }

    /// Read the device-to-host data buffer
    pub fn read_netx_to_host(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.len() as u32 > NETX_TO_HOST_BUFFER_SIZE {
            return Err(Error::PayloadTooLarge);
        }
        self.win.read_block(Self::reg(MBX_NETX_TO_HOST_DATA), buf)
    }

    /// Write the device-to-host data buffer (device side)
    pub fn write_netx_to_host(&mut self, data: &[u8]) -> Result<()> {
        if data.len() as u32 > NETX_TO_HOST_BUFFER_SIZE {
            return Err(Error::PayloadTooLarge);
        }
        self.win.write_block(Self::reg(MBX_NETX_TO_HOST_DATA), data)
    }

    /// Read the host-to-device data buffer (device side)
    pub fn read_host_to_netx(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.len() as u32 > HOST_TO_NETX_BUFFER_SIZE {
            return Err(Error::PayloadTooLarge);
        }
        self.win.read_block(Self::reg(MBX_HOST_TO_NETX_DATA), buf)
    }

    /// Write the host-to-device data buffer
    pub fn write_host_to_netx(&mut self, data: &[u8]) -> Result<()> {
        if data.len() as u32 > HOST_TO_NETX_BUFFER_SIZE {
            return Err(Error::PayloadTooLarge);
        }
        self.win.write_block(Self::reg(MBX_HOST_TO_NETX_DATA), data)
    }
}

/// Application-stage global register view, anchored at the end of the
/// window. Mutually exclusive with the boot-stage views.
pub struct GlobalRegisters<'a, W: DpmWindow> {
    win: &'a mut W,
    base: u32,
}

impl<'a, W: DpmWindow> GlobalRegisters<'a, W> {
    /// Create a view over the window's trailing register block
    pub fn new(win: &'a mut W) -> Result<Self> {
        let size = win.size() as u32;
        if size < GLOBAL_REGISTER_BLOCK_SIZE {
            return Err(Error::AddressOutOfBounds);
        }
        let base = size - GLOBAL_REGISTER_BLOCK_SIZE;
        Ok(Self { win, base })
    }

    /// Mirrored version/cookie word
    pub fn netx_version(&mut self) -> Result<u32> {
        self.win.read32(self.base + GLOBAL_NETX_VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_offsets() {
        // Seven reserved words, then the status word
        assert_eq!(CFG_DPM_STATUS, 7 * 4);
        // 46 reserved words between status and system status
        assert_eq!(CFG_DPM_SYS_STA, CFG_DPM_STATUS + 4 + 46 * 4);
        assert_eq!(CFG_DPM_RESET_REQUEST, CFG_DPM_SYS_STA + 4);
        // Seven reserved words before the version cookie
        assert_eq!(CFG_DPM_NETX_VERSION, CFG_DPM_RESET_REQUEST + 4 + 7 * 4);
        assert_eq!(CFG_AREA_SIZE, CFG_DPM_NETX_VERSION + 4);

        // The boot id is the first word of the mailbox block
        assert_eq!(MAILBOX_BLOCK_OFFSET + MBX_BOOT_ID, DPM_BOOT_ID_OFFSET);
        // 28 reserved words between byte size and the data size words
        assert_eq!(MBX_NETX_TO_HOST_SIZE, MBX_BYTE_SIZE + 4 + 28 * 4);
        assert_eq!(MBX_HANDSHAKE, MBX_HOST_TO_NETX_SIZE + 4);
        // 31 reserved words between the handshake word and the buffers
        assert_eq!(MBX_NETX_TO_HOST_DATA, MBX_HANDSHAKE + 4 + 31 * 4);
        assert_eq!(
            MBX_HOST_TO_NETX_DATA,
            MBX_NETX_TO_HOST_DATA + NETX_TO_HOST_BUFFER_SIZE
        );

        // Config area + mailbox block + bit-flip area fill a 64 KiB window
        assert_eq!(
            BITFLIP_AREA_OFFSET,
            MAILBOX_BLOCK_OFFSET + MBX_HOST_TO_NETX_DATA + HOST_TO_NETX_BUFFER_SIZE
        );
        assert_eq!(BITFLIP_AREA_OFFSET + BITFLIP_AREA_SIZE, 0x10000);
    }

    #[test]
    fn test_boot_id_is_nxbl() {
        assert_eq!(DPM_BOOT_ID.to_le_bytes(), *b"NXBL");
    }
}
