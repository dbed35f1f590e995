//! netX chip family identification
//!
//! Three incompatible device families are classified from the 32-bit
//! version/cookie word in the DPM. netX4000 and netX4100 use exact cookie
//! matches; netX90 carries its device type and ROM step in sub-fields of
//! the cookie, which are masked out before comparison.
//!
//! At boot stage the cookie can be read from memory the ROM loader has not
//! initialized yet, so a netX90 match additionally requires the 'NXBL'
//! boot identifier at offset 0x100 before it is trusted.

use crate::dpm::{
    BootCfgArea, GlobalRegisters, DPM_BOOT_ID, DPM_BOOT_ID_OFFSET, NETX4000_COOKIE,
    NETX4100_COOKIE, NETX90_COOKIE, NETX90_ROMSTEP_MASK, NETX90_TYPE_MASK,
};
use crate::error::{Error, Result};
use crate::window::DpmWindow;

/// Identified netX chip family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipType {
    /// netX90
    Netx90,
    /// netX4000
    Netx4000,
    /// netX4100
    Netx4100,
}

/// How the host is allowed to treat the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceType {
    /// Probe boot and application layouts as needed
    #[default]
    Autodetect,
    /// Device boots autonomously from flash
    FlashBased,
    /// RAM-based device, firmware downloaded by the host
    Ram,
    /// Device must not be reconfigured by the host
    DontTouch,
}

/// Classify the chip family from the DPM version cookie.
///
/// The cookie is read from the trailing global register block when
/// `use_global_registers` is set or the device type is flash-based or
/// do-not-touch; otherwise from the boot-stage configuration area. In the
/// boot-stage case a masked netX90 cookie match is only accepted together
/// with the 'NXBL' boot identifier.
///
/// Pure classification: no state is modified. Returns
/// [`Error::DetectionFailed`] when nothing matched; the caller may retry
/// with the other register block.
pub fn identify<W: DpmWindow>(
    win: &mut W,
    device_type: DeviceType,
    use_global_registers: bool,
) -> Result<ChipType> {
    let from_global = use_global_registers
        || matches!(device_type, DeviceType::FlashBased | DeviceType::DontTouch);

    let version = if from_global {
        GlobalRegisters::new(win)?.netx_version()?
    } else {
        BootCfgArea::new(win).netx_version()?
    };

    if version == NETX4000_COOKIE {
        log::debug!("netX4000 cookie matched (0x{:08X})", version);
        return Ok(ChipType::Netx4000);
    }
    if version == NETX4100_COOKIE {
        log::debug!("netX4100 cookie matched (0x{:08X})", version);
        return Ok(ChipType::Netx4100);
    }

    // Mask out the netX90 specific differentiation fields
    let mask = !(NETX90_TYPE_MASK | NETX90_ROMSTEP_MASK);
    if version & mask == NETX90_COOKIE {
        if from_global {
            log::debug!("netX90 cookie matched in register block (0x{:08X})", version);
            return Ok(ChipType::Netx90);
        }
        // At DPM start the cookie may be stale memory; require the ROM
        // code cookie 'NXBL' at offset 0x100 as confirmation.
        let boot_id = win.read32(DPM_BOOT_ID_OFFSET)?;
        if boot_id == DPM_BOOT_ID {
            log::debug!("netX90 cookie and boot identifier matched (0x{:08X})", version);
            return Ok(ChipType::Netx90);
        }
        log::debug!(
            "netX90 cookie matched but boot identifier missing (got 0x{:08X})",
            boot_id
        );
        return Err(Error::DetectionFailed);
    }

    log::debug!("no chip family matched cookie 0x{:08X}", version);
    Err(Error::DetectionFailed)
}
