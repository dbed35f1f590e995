//! Host-side access to the netX dual-port memory boot interface.
//!
//! This crate talks to Hilscher netX network controllers through their
//! dual-port memory (DPM) window: identifying the chip family from its
//! version cookies, exchanging messages with the ROM loader through the
//! polled mailbox handshake, and downloading or uploading firmware files
//! in mailbox-sized chunks.
//!
//! The crate is transport-agnostic. Hosts implement [`window::DpmWindow`]
//! for whatever bus reaches the DPM (PCI BAR, SPI, memory-mapped) and
//! everything above it - detection, handshake, transfers - is plain
//! `no_std` logic on top of those primitives. The `alloc` feature enables
//! the device/channel model and the transfer engine, which track file
//! tables in heap memory; `std` additionally implements
//! `std::error::Error` for [`Error`].
//!
//! Typical flow:
//!
//! 1. wrap the bus in a [`window::DpmWindow`]
//! 2. create a [`device::DeviceInstance`] and call `detect_chip`
//! 3. add channels, then drive [`transfer::process_fw_download`] /
//!    [`transfer::upload_file`] with a [`transfer::MailboxTransport`]

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(any(test, feature = "alloc"))]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod chip;
#[cfg(any(test, feature = "alloc"))]
pub mod device;
pub mod dpm;
pub mod error;
pub mod file;
pub mod mailbox;
pub mod poll;
#[cfg(any(test, feature = "alloc"))]
pub mod transfer;
pub mod window;

pub use error::{Error, Result};

#[cfg(test)]
mod testutil {
    //! Vec-backed DPM window for unit tests.
    //!
    //! Counts delay calls and supports scripted register writes that fire
    //! while "time" passes in `delay_us`, standing in for a device that
    //! acknowledges a handshake mid-poll.

    use alloc::vec;
    use alloc::vec::Vec;

    use crate::error::Result;
    use crate::window::{check_range, DpmWindow};

    struct Scripted {
        after_delays: u32,
        offset: u32,
        value: u32,
        done: bool,
    }

    pub struct MemWindow {
        mem: Vec<u8>,
        pub delay_calls: u32,
        pub delayed_us: u32,
        scripts: Vec<Scripted>,
    }

    impl MemWindow {
        pub fn new(size: usize) -> Self {
            Self {
                mem: vec![0; size],
                delay_calls: 0,
                delayed_us: 0,
                scripts: Vec::new(),
            }
        }

        /// Register a 32-bit write that takes effect once `after_delays`
        /// delay calls have happened.
        pub fn script_write32(&mut self, after_delays: u32, offset: u32, value: u32) {
            self.scripts.push(Scripted {
                after_delays,
                offset,
                value,
                done: false,
            });
        }
    }

    impl DpmWindow for MemWindow {
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

        fn delay_us(&mut self, us: u32) {
            self.delay_calls += 1;
            self.delayed_us += us;
            for s in self.scripts.iter_mut() {
                if !s.done && self.delay_calls >= s.after_delays {
                    s.done = true;
                    let start = s.offset as usize;
                    self.mem[start..start + 4].copy_from_slice(&s.value.to_le_bytes());
                }
            }
        }
    }
}
