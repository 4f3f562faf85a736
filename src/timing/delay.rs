use embedded_hal::delay::DelayNs;

use crate::line::{Clock, LinePin};
use crate::link::{FrameHandler, Link};

/// Runs a blocking loop that repeatedly calls [`Link::poll`].
///
/// For firmware whose only job is to keep the link serviced. Each poll blocks
/// for up to 10 ms waiting for a byte, so `interval_us` is an extra pause
/// between polls and may be 0.
///
/// # Example
/// ```rust,ignore
/// use butcom::timing::run_poll_loop;
/// let mut link = Link::new(pin, Pull::Up, clock, 1);
/// link.start(true)?;
/// run_poll_loop(&mut link, &mut delay, 0);
/// ```
///
/// # Notes
/// - This loop never returns.
/// - Pin errors are logged and polling continues.
pub fn run_poll_loop<P, C, H, D>(link: &mut Link<P, C, H>, delay: &mut D, interval_us: u32) -> !
where
    P: LinePin,
    C: Clock,
    H: FrameHandler,
    D: DelayNs,
{
    loop {
        poll_once(link, delay, interval_us);
    }
}

/// Like [`run_poll_loop`], but returns once `done` reports `true`.
///
/// `done` is checked before every poll, so a link that is already done is
/// never polled.
pub fn run_poll_loop_until<P, C, H, D, F>(
    link: &mut Link<P, C, H>,
    delay: &mut D,
    interval_us: u32,
    mut done: F,
) where
    P: LinePin,
    C: Clock,
    H: FrameHandler,
    D: DelayNs,
    F: FnMut(&Link<P, C, H>) -> bool,
{
    while !done(link) {
        poll_once(link, delay, interval_us);
    }
}

fn poll_once<P, C, H, D>(link: &mut Link<P, C, H>, delay: &mut D, interval_us: u32)
where
    P: LinePin,
    C: Clock,
    H: FrameHandler,
    D: DelayNs,
{
    // poll only fails on pin errors, which carry no defmt formatting
    if link.poll().is_err() {
        warn!("line pin error while polling");
    }
    if interval_us > 0 {
        delay.delay_us(interval_us);
    }
}
