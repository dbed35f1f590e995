//! Poll-with-backoff utility
//!
//! The DPM has no reliable interrupt path, so every wait in this crate is a
//! bounded poll: check a condition, sleep one interval through the window's
//! delay primitive, repeat until the timeout elapses. Both the mailbox
//! handshake engine and the cyclic poller go through this helper.

use crate::error::{Error, Result};
use crate::window::DpmWindow;

/// Default polling interval in microseconds
pub const POLL_INTERVAL_US: u32 = 1_000;

/// Poll `cond` until it reports true or `timeout_us` elapses.
///
/// The condition is checked once before any delay, so a zero timeout still
/// performs a single check. Never busy-spins: between checks the window's
/// `delay_us` is invoked, which hosts implement as a real sleep or yield.
///
/// Returns [`Error::HandshakeTimeout`] when the timeout elapses.
pub fn poll_until<W, F>(win: &mut W, timeout_us: u32, interval_us: u32, mut cond: F) -> Result<()>
where
    W: DpmWindow,
    F: FnMut(&mut W) -> Result<bool>,
{
    let interval = interval_us.max(1);
    let mut elapsed: u32 = 0;

    loop {
        if cond(win)? {
            return Ok(());
        }
        if elapsed >= timeout_us {
            return Err(Error::HandshakeTimeout);
        }
        let step = interval.min(timeout_us - elapsed);
        win.delay_us(step);
        elapsed += step;
    }
}
