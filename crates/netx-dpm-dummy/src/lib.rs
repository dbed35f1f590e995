//! netx-dpm-dummy - In-memory netX DPM emulator for testing
//!
//! This crate provides a dummy DPM window backed by plain memory, with a
//! small simulated ROM loader behind it. The device side runs inside
//! `delay_us`: every poll interval the host sleeps, the simulated loader
//! gets a chance to acknowledge handshakes, consume download fragments or
//! post upload responses. That makes the full protocol stack testable
//! without hardware, including timeout and retry paths.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
use alloc::string::String;
#[cfg(feature = "alloc")]
use alloc::vec;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use netx_dpm_core::dpm::{
    CFG_DPM_NETX_VERSION, CFG_DPM_STATUS, DPM_BOOT_ID, DPM_BOOT_ID_OFFSET, DPM_STATUS_UNLOCKED,
    GLOBAL_NETX_VERSION, GLOBAL_REGISTER_BLOCK_SIZE, MAILBOX_BLOCK_OFFSET, MBX_BYTE_SIZE,
    MBX_HANDSHAKE, MBX_HOST_TO_NETX_DATA, MBX_HOST_TO_NETX_SIZE, MBX_NETX_TO_HOST_DATA,
    MBX_NETX_TO_HOST_SIZE, NETX90_COOKIE, NETX_TO_HOST_BUFFER_SIZE,
};
use netx_dpm_core::error::Result;
use netx_dpm_core::mailbox::Handshake;
#[cfg(feature = "alloc")]
use netx_dpm_core::transfer::{CMD_DELETE, CMD_DOWNLOAD, CMD_UPLOAD, FRAME_HEADER_LEN};
use netx_dpm_core::window::{check_range, DpmWindow};

/// When the simulated loader reacts to a posted host message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Acknowledge on the first poll interval
    Always,
    /// Never acknowledge; every exchange times out
    Never,
    /// Acknowledge once the message has been pending for this many poll
    /// intervals, counted across retries of the same message
    AfterTicks(u32),
}

/// Configuration for the dummy DPM
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Version cookie presented in the configuration area and mirrored
    /// into the trailing register block
    pub cookie: u32,
    /// Whether the 'NXBL' boot identifier is present at offset 0x100
    pub boot_id_present: bool,
    /// Window size in bytes
    pub dpm_size: usize,
    /// Acknowledgment behavior of the simulated loader
    pub ack_mode: AckMode,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            // netX90 with device type and ROM step fields populated
            cookie: NETX90_COOKIE | 0x0002_0000 | 0x0000_0300,
            boot_id_present: true,
            dpm_size: 0x10000,
            ack_mode: AckMode::Always,
        }
    }
}

/// Dummy DPM window
///
/// Emulates the boot-stage DPM of a netX device in memory. Downloaded
/// files are stored per name and can be read back through upload requests
/// or inspected directly from tests.
#[cfg(feature = "alloc")]
pub struct DummyDpm {
    config: DummyConfig,
    mem: Vec<u8>,
    files: Vec<(String, Vec<u8>)>,
    pending_ticks: u32,
}

#[cfg(feature = "alloc")]
fn get32(mem: &[u8], offset: u32) -> u32 {
    let s = offset as usize;
    if s + 4 > mem.len() {
        return 0;
    }
    let mut b = [0u8; 4];
    b.copy_from_slice(&mem[s..s + 4]);
    u32::from_le_bytes(b)
}

#[cfg(feature = "alloc")]
fn put32(mem: &mut [u8], offset: u32, value: u32) {
    let s = offset as usize;
    if s + 4 <= mem.len() {
        mem[s..s + 4].copy_from_slice(&value.to_le_bytes());
    }
}

#[cfg(feature = "alloc")]
impl DummyDpm {
    /// Create a dummy DPM with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        let mut mem = vec![0u8; config.dpm_size];

        put32(&mut mem, CFG_DPM_STATUS, DPM_STATUS_UNLOCKED);
        put32(&mut mem, CFG_DPM_NETX_VERSION, config.cookie);
        if config.boot_id_present {
            put32(&mut mem, DPM_BOOT_ID_OFFSET, DPM_BOOT_ID);
        }
        put32(
            &mut mem,
            MAILBOX_BLOCK_OFFSET + MBX_BYTE_SIZE,
            config.dpm_size as u32,
        );
        // The cookie is also visible through the trailing register block
        if config.dpm_size as u32 >= GLOBAL_REGISTER_BLOCK_SIZE {
            let base = config.dpm_size as u32 - GLOBAL_REGISTER_BLOCK_SIZE;
            put32(&mut mem, base + GLOBAL_NETX_VERSION, config.cookie);
        }

        Self {
            config,
            mem,
            files: Vec::new(),
            pending_ticks: 0,
        }
    }

    /// Create a dummy DPM with default configuration (netX90, boot stage)
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// The configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Content of a stored file, if present
    pub fn file(&self, name: &str) -> Option<&[u8]> {
        self.files
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, d)| d.as_slice())
    }

    /// Mutable content of a stored file, for fault injection
    pub fn file_mut(&mut self, name: &str) -> Option<&mut Vec<u8>> {
        self.files
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, d)| d)
    }

    /// Number of stored files
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    fn store_mut(&mut self, name: &str) -> &mut Vec<u8> {
        let i = match self
            .files
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(i) => i,
            None => {
                self.files.push((String::from(name), Vec::new()));
                self.files.len() - 1
            }
        };
        &mut self.files[i].1
    }

    /// One step of the simulated loader. Runs automatically on every
    /// `delay_us`, but can also be driven manually.
    pub fn tick(&mut self) {
        let hs_reg = MAILBOX_BLOCK_OFFSET + MBX_HANDSHAKE;
        let device_cycle = (Handshake::NETX_SEND | Handshake::HOST_RECEIVED).bits();

        // Finish our own completed device-to-host cycle first
        let hs = get32(&self.mem, hs_reg);
        if hs & device_cycle == device_cycle {
            put32(&mut self.mem, hs_reg, hs & !device_cycle);
        }

        let hs = get32(&self.mem, hs_reg);
        let posted = hs & Handshake::HOST_SEND.bits() != 0;
        let acked = hs & Handshake::NETX_RECEIVED.bits() != 0;
        if !posted || acked {
            return;
        }

        match self.config.ack_mode {
            AckMode::Never => return,
            AckMode::Always => {}
            AckMode::AfterTicks(n) => {
                self.pending_ticks += 1;
                if self.pending_ticks < n {
                    return;
                }
                self.pending_ticks = 0;
            }
        }

        self.process_host_message();

        let hs = get32(&self.mem, hs_reg);
        put32(&mut self.mem, hs_reg, hs | Handshake::NETX_RECEIVED.bits());
    }

    fn process_host_message(&mut self) {
        let len = get32(&self.mem, MAILBOX_BLOCK_OFFSET + MBX_HOST_TO_NETX_SIZE) as usize;
        let start = (MAILBOX_BLOCK_OFFSET + MBX_HOST_TO_NETX_DATA) as usize;
        if len < FRAME_HEADER_LEN || start + len > self.mem.len() {
            // Not a transfer frame; acknowledge and ignore
            return;
        }
        let frame = self.mem[start..start + len].to_vec();

        let cmd = frame[0];
        let name_end = frame[4..20].iter().position(|&b| b == 0).unwrap_or(16);
        let name = String::from_utf8_lossy(&frame[4..4 + name_end]).into_owned();
        let total = get32(&frame, 20);
        let offset = get32(&frame, 24) as usize;
        let req_len = get32(&frame, 28) as usize;

        match cmd {
            CMD_DOWNLOAD => {
                let store = self.store_mut(&name);
                if offset == 0 {
                    store.clear();
                }
                store.extend_from_slice(&frame[FRAME_HEADER_LEN..]);
                log::trace!(
                    "dummy: stored fragment of {} at {} ({} of {} bytes)",
                    name,
                    offset,
                    store.len(),
                    total
                );
            }
            CMD_UPLOAD => {
                let data = self.file(&name).unwrap_or(&[]);
                let begin = offset.min(data.len());
                let end = (offset + req_len)
                    .min(data.len())
                    .min(begin + NETX_TO_HOST_BUFFER_SIZE as usize);
                let response = data[begin..end].to_vec();

                let out = (MAILBOX_BLOCK_OFFSET + MBX_NETX_TO_HOST_DATA) as usize;
                self.mem[out..out + response.len()].copy_from_slice(&response);
                put32(
                    &mut self.mem,
                    MAILBOX_BLOCK_OFFSET + MBX_NETX_TO_HOST_SIZE,
                    response.len() as u32,
                );
                let hs_reg = MAILBOX_BLOCK_OFFSET + MBX_HANDSHAKE;
                let hs = get32(&self.mem, hs_reg);
                put32(&mut self.mem, hs_reg, hs | Handshake::NETX_SEND.bits());
                log::trace!(
                    "dummy: posted {} byte fragment of {} at {}",
                    response.len(),
                    name,
                    offset
                );
            }
            CMD_DELETE => {
                self.files.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
                log::trace!("dummy: deleted {}", name);
            }
            _ => {
                log::trace!("dummy: ignoring unknown command {}", cmd);
            }
        }
    }
}

#[cfg(feature = "alloc")]
impl DpmWindow for DummyDpm {
    fn size(&self) -> usize {
        self.mem.len()
    }

    fn read_block(&mut self, offset: u32, buf: &mut [u8]) -> Result<()> {
        check_range(self.mem.len(), offset, buf.len())?;
        let start = offset as usize;
        buf.copy_from_slice(&self.mem[start..start + buf.len()]);
        Ok(())
    }

    fn write_block(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        check_range(self.mem.len(), offset, data.len())?;
        let start = offset as usize;
        self.mem[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn delay_us(&mut self, _us: u32) {
        // The host sleeping is the device's time to run
        self.tick();
    }
}
