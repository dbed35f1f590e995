//! Device and channel instances
//!
//! A [`DeviceInstance`] owns one DPM window and the channels living in it.
//! The chip type is identified once and never re-derived; channels track
//! their downloaded files and serialize all mailbox access through a
//! per-channel lock.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::chip::{self, ChipType, DeviceType};
use crate::dpm::HOST_TO_NETX_BUFFER_SIZE;
use crate::error::{Error, Result};
use crate::file::FileDescriptor;
use crate::mailbox::{self, Direction};
use crate::window::DpmWindow;

/// Lifecycle of a channel's firmware, advancing monotonically. It only
/// goes back to `NotLoaded` on explicit file removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// No firmware present
    #[default]
    NotLoaded,
    /// A download is in progress (or was aborted and must be retried)
    Downloading,
    /// Firmware completely transferred
    Loaded,
}

/// One entry of a channel's file table
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Descriptor of the transferred file
    pub descriptor: FileDescriptor,
}

/// Serializes all mailbox access of one channel.
///
/// The protocol allows a single operation in flight per channel: a
/// transfer holds the lock for the whole multi-chunk operation, and the
/// cyclic poller takes it before touching handshake registers. Contention
/// is reported as [`Error::DeviceBusy`] so callers can back off.
#[derive(Debug, Default)]
pub struct ChannelLock {
    held: AtomicBool,
}

impl ChannelLock {
    /// Try to take the lock; never blocks
    pub fn try_acquire(&self) -> Result<ChannelGuard<'_>> {
        if self
            .held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Ok(ChannelGuard { lock: self })
        } else {
            Err(Error::DeviceBusy)
        }
    }
}

/// Scoped ownership of a [`ChannelLock`]; released on drop, which covers
/// every exit path including timeout and abort.
#[derive(Debug)]
pub struct ChannelGuard<'a> {
    lock: &'a ChannelLock,
}

impl Drop for ChannelGuard<'_> {
    fn drop(&mut self) {
        self.lock.held.store(false, Ordering::Release);
    }
}

/// One communication channel of a device
#[derive(Debug, Default)]
pub struct ChannelInstance {
    /// Channel number within the device
    pub number: u32,
    /// Negotiated mailbox size for transfers on this channel
    pub mailbox_size: u32,
    /// Firmware lifecycle of this channel
    pub load_state: LoadState,
    /// Files known to be present on the device, keyed by short name
    pub files: Vec<FileEntry>,
    /// Mailbox access lock
    pub lock: ChannelLock,
}

impl ChannelInstance {
    /// Create a channel with the given number and mailbox size
    pub fn new(number: u32, mailbox_size: u32) -> Self {
        Self {
            number,
            mailbox_size,
            ..Self::default()
        }
    }

    /// Look up a file table entry by short name, case-insensitively
    pub fn find_file(&self, name: &str) -> Option<&FileEntry> {
        self.files
            .iter()
            .find(|e| e.descriptor.short_name().matches(name))
    }
}

/// One device on the host, owning a DPM window exclusively
pub struct DeviceInstance<W: DpmWindow> {
    name: heapless::String<15>,
    window: W,
    device_type: DeviceType,
    chip_type: Option<ChipType>,
    channels: Vec<ChannelInstance>,
}

impl<W: DpmWindow> DeviceInstance<W> {
    /// Create a device instance over a DPM window.
    ///
    /// The name identifies the board in logs and is truncated to 15
    /// characters if longer.
    pub fn new(name: &str, window: W, device_type: DeviceType) -> Self {
        let mut n = heapless::String::new();
        for c in name.chars().take(15) {
            let _ = n.push(c);
        }
        Self {
            name: n,
            window,
            device_type,
            chip_type: None,
            channels: Vec::new(),
        }
    }

    /// Board name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device classification
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Identified chip family, if detection has run successfully
    pub fn chip_type(&self) -> Option<ChipType> {
        self.chip_type
    }

    /// The DPM window
    pub fn window_mut(&mut self) -> &mut W {
        &mut self.window
    }

    /// Identify the chip family and record it.
    ///
    /// Tries the boot-stage configuration area first and falls back to the
    /// trailing global register block, the same order a device-add
    /// sequence probes. Once identified the type is frozen for the
    /// lifetime of the instance: later calls return the stored value
    /// without touching the hardware.
    pub fn detect_chip(&mut self) -> Result<ChipType> {
        if let Some(chip) = self.chip_type {
            return Ok(chip);
        }

        let chip = chip::identify(&mut self.window, self.device_type, false)
            .or_else(|e| match e {
                Error::DetectionFailed => {
                    chip::identify(&mut self.window, self.device_type, true)
                }
                other => Err(other),
            })?;

        log::debug!("{}: detected {:?}", self.name, chip);
        self.chip_type = Some(chip);
        Ok(chip)
    }

    /// Add a channel with the default mailbox size and return its index
    pub fn add_channel(&mut self, number: u32) -> usize {
        self.channels
            .push(ChannelInstance::new(number, HOST_TO_NETX_BUFFER_SIZE));
        self.channels.len() - 1
    }

    /// Channels of this device
    pub fn channels(&self) -> &[ChannelInstance] {
        &self.channels
    }

    /// Split borrow: the window plus one channel, for transfer operations
    pub fn channel_parts(&mut self, index: usize) -> Option<(&mut W, &mut ChannelInstance)> {
        let channel = self.channels.get_mut(index)?;
        Some((&mut self.window, channel))
    }

    /// Periodic housekeeping, called from the host's cyclic timer.
    ///
    /// For every channel whose lock is free, clears stale delivered
    /// handshake cycles so a late acknowledgment from a timed-out exchange
    /// does not wedge the mailbox. Channels busy with a transfer are
    /// skipped; their operation owns the handshake registers.
    pub fn cyclic_poll(&mut self) -> Result<()> {
        let window = &mut self.window;
        for channel in self.channels.iter_mut() {
            let _guard = match channel.lock.try_acquire() {
                Ok(g) => g,
                Err(_) => continue,
            };
            mailbox::drain_stale(window, Direction::HostToDevice)?;
        }
        Ok(())
    }
}
