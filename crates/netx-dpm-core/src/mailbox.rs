//! Mailbox handshake engine
//!
//! One message in flight per direction, flow-controlled by a 2-bit flag
//! pair in the shared handshake word. The sender writes payload and length,
//! raises its send flag, and waits for the receiver's received flag; once
//! acknowledged it clears both flags together, freeing the buffer. There is
//! no interrupt path - all waiting is bounded polling through
//! [`poll_until`].
//!
//! A timeout leaves the buffer state untouched so the exchange stays
//! retryable; the remote side may still complete an abandoned cycle later,
//! which the next send drains before starting a new one.

use bitflags::bitflags;

use crate::dpm::{MailboxBlock, HOST_TO_NETX_BUFFER_SIZE, NETX_TO_HOST_BUFFER_SIZE};
use crate::error::{Error, Result};
use crate::poll::{poll_until, POLL_INTERVAL_US};
use crate::window::DpmWindow;

/// Bit position of the device (netX) flag pair in the handshake word
pub const NETX_FLAGS_SHIFT: u32 = 16;
/// Bit position of the host flag pair in the handshake word
pub const HOST_FLAGS_SHIFT: u32 = 24;

bitflags! {
    /// Flags of the mailbox handshake word.
    ///
    /// Each direction owns one send flag on the producer side and one
    /// received flag on the consumer side; the pairs live in separate
    /// bytes of the word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Handshake: u32 {
        /// Device has consumed the current host-to-device message
        const NETX_RECEIVED = 0x01 << NETX_FLAGS_SHIFT;
        /// Device has posted a device-to-host message
        const NETX_SEND     = 0x02 << NETX_FLAGS_SHIFT;
        /// Host has posted a host-to-device message
        const HOST_SEND     = 0x01 << HOST_FLAGS_SHIFT;
        /// Host has consumed the current device-to-host message
        const HOST_RECEIVED = 0x02 << HOST_FLAGS_SHIFT;
    }
}

/// Message flow direction through the mailbox buffer pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host produces, device consumes (1024-byte buffer)
    HostToDevice,
    /// Device produces, host consumes (512-byte buffer)
    DeviceToHost,
}

impl Direction {
    /// The producer's send flag for this direction
    pub fn send_flag(self) -> Handshake {
        match self {
            Direction::HostToDevice => Handshake::HOST_SEND,
            Direction::DeviceToHost => Handshake::NETX_SEND,
        }
    }

    /// The consumer's received flag for this direction
    pub fn received_flag(self) -> Handshake {
        match self {
            Direction::HostToDevice => Handshake::NETX_RECEIVED,
            Direction::DeviceToHost => Handshake::HOST_RECEIVED,
        }
    }

    /// Capacity of this direction's data buffer
    pub fn buffer_capacity(self) -> u32 {
        match self {
            Direction::HostToDevice => HOST_TO_NETX_BUFFER_SIZE,
            Direction::DeviceToHost => NETX_TO_HOST_BUFFER_SIZE,
        }
    }
}

/// Observable state of one mailbox direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Buffer free, no message posted
    Idle,
    /// Sender posted a message, no acknowledgment yet
    Pending,
    /// Receiver acknowledged; sender must clear both flags before reuse
    Delivered,
}

/// Derive the state of one direction from a raw handshake word
pub fn state_of(word: u32, direction: Direction) -> HandshakeState {
    let flags = Handshake::from_bits_truncate(word);
    if flags.contains(direction.received_flag()) {
        HandshakeState::Delivered
    } else if flags.contains(direction.send_flag()) {
        HandshakeState::Pending
    } else {
        HandshakeState::Idle
    }
}

fn read_handshake<W: DpmWindow>(win: &mut W) -> Result<u32> {
    MailboxBlock::new(win).handshake()
}

fn clear_cycle<W: DpmWindow>(win: &mut W, direction: Direction) -> Result<()> {
    let mut mbx = MailboxBlock::new(win);
    let word = mbx.handshake()?;
    let cleared = word & !(direction.send_flag() | direction.received_flag()).bits();
    mbx.set_handshake(cleared)
}

/// Clear a stale `Delivered` cycle left over from an abandoned send.
///
/// Only the sending side of a direction may call this: the receiver's
/// acknowledgment for a timed-out message can arrive long after the sender
/// gave up, and the flags must be reset together before the buffer is
/// reused. Returns whether anything was drained.
pub fn drain_stale<W: DpmWindow>(win: &mut W, direction: Direction) -> Result<bool> {
    let word = read_handshake(win)?;
    if state_of(word, direction) == HandshakeState::Delivered {
        log::trace!("draining stale delivered cycle ({:?})", direction);
        clear_cycle(win, direction)?;
        return Ok(true);
    }
    Ok(false)
}

fn write_payload<W: DpmWindow>(win: &mut W, direction: Direction, payload: &[u8]) -> Result<()> {
    let mut mbx = MailboxBlock::new(win);
    match direction {
        Direction::HostToDevice => {
            mbx.write_host_to_netx(payload)?;
            mbx.set_host_to_netx_size(payload.len() as u32)
        }
        Direction::DeviceToHost => {
            mbx.write_netx_to_host(payload)?;
            mbx.set_netx_to_host_size(payload.len() as u32)
        }
    }
}

/// Send one message and wait for the receiver's acknowledgment.
///
/// Writes the payload and its length, raises the send flag and polls the
/// received flag. On acknowledgment both flags are cleared in a single
/// register write and the buffer is free again. On
/// [`Error::HandshakeTimeout`] the flags and payload are left as they are,
/// so the same call can simply be repeated.
pub fn send_and_await_ack<W: DpmWindow>(
    win: &mut W,
    direction: Direction,
    payload: &[u8],
    timeout_us: u32,
) -> Result<()> {
    if payload.len() as u32 > direction.buffer_capacity() {
        return Err(Error::PayloadTooLarge);
    }

    drain_stale(win, direction)?;

    write_payload(win, direction, payload)?;
    let mut mbx = MailboxBlock::new(win);
    let word = mbx.handshake()?;
    mbx.set_handshake(word | direction.send_flag().bits())?;
    log::trace!(
        "posted {} byte message ({:?}), awaiting ack",
        payload.len(),
        direction
    );

    poll_until(win, timeout_us, POLL_INTERVAL_US, |w| {
        Ok(state_of(read_handshake(w)?, direction) == HandshakeState::Delivered)
    })
    .map_err(|e| {
        if e == Error::HandshakeTimeout {
            log::warn!("no ack within {} us ({:?})", timeout_us, direction);
        }
        e
    })?;

    clear_cycle(win, direction)
}

/// Wait for a message in the given direction and consume it.
///
/// Polls until the sender's flag is raised for a fresh cycle, copies the
/// message into `buf` and raises the received flag. Clearing the flag pair
/// is the sender's job. Returns the message length.
pub fn await_and_receive<W: DpmWindow>(
    win: &mut W,
    direction: Direction,
    buf: &mut [u8],
    timeout_us: u32,
) -> Result<usize> {
    poll_until(win, timeout_us, POLL_INTERVAL_US, |w| {
        Ok(state_of(read_handshake(w)?, direction) == HandshakeState::Pending)
    })?;

    let mut mbx = MailboxBlock::new(win);
    let len = match direction {
        Direction::HostToDevice => mbx.host_to_netx_size()?,
        Direction::DeviceToHost => mbx.netx_to_host_size()?,
    };
    if len > direction.buffer_capacity() {
        return Err(Error::PayloadTooLarge);
    }
    if len as usize > buf.len() {
        return Err(Error::BufferTooSmall);
    }

    let mut mbx = MailboxBlock::new(win);
    match direction {
        Direction::HostToDevice => mbx.read_host_to_netx(&mut buf[..len as usize])?,
        Direction::DeviceToHost => mbx.read_netx_to_host(&mut buf[..len as usize])?,
    }

    let mut mbx = MailboxBlock::new(win);
    let word = mbx.handshake()?;
    mbx.set_handshake(word | direction.received_flag().bits())?;
    log::trace!("consumed {} byte message ({:?})", len, direction);
    Ok(len as usize)
}
