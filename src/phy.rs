//! Bit-banged byte transport over one shared, idle-high line.
//!
//! This module provides [`Phy`], the signaling layer. It turns a byte into a
//! timed sequence of line levels and samples such a sequence back into a byte,
//! using only a [`LinePin`] and a [`Clock`].
//!
//! ## Bit format
//!
//! Each byte is framed like asynchronous serial:
//!
//! - start bit: line driven low for one bit-time
//! - 8 data bits, LSB first: `1` releases the line, `0` drives it low
//! - stop bit: line released for one bit-time
//!
//! Before transmitting, the line must have been continuously high for three
//! bit-times. This is the only collision guard; there is no arbitration.
//!
//! ## Reception
//!
//! The receiver waits for the line to rest high, then for a falling edge. The
//! edge is re-sampled a quarter bit later and ignored if the line is already
//! high again. For a genuine start bit, data bit 0 is sampled 1.5 bit-times
//! after the edge and each following bit one bit-time later, which keeps every
//! sample in the middle of its bit despite drift between the two clocks.
//!
//! Every wait is bounded by the receive timeout. Deadlines are compared with
//! wrapping arithmetic, so counter roll-over in the middle of a byte is fine.

use crate::error::Error;
use crate::line::{Clock, LinePin, Pull};
use crate::timing::Timing;

/// The signaling layer: owns the line pin and the clock.
///
/// ## Type Parameters
///
/// - `P`: the shared line, see [`LinePin`]
/// - `C`: time source and busy-wait delays, see [`Clock`]
///
/// ## Example
///
/// ```rust
/// # use embedded_hal::delay::DelayNs;
/// # use embedded_hal_mock::eh1::digital::{Mock as Pin, State as PinState, Transaction as PinTransaction};
/// # // Coarse clock: every read moves time on by a millisecond
/// # struct Ticks(u32);
/// # impl DelayNs for Ticks {
/// #     fn delay_ns(&mut self, ns: u32) { self.0 = self.0.wrapping_add(ns.div_ceil(1_000)); }
/// # }
/// # impl butcom::line::Clock for Ticks {
/// #     fn now_us(&mut self) -> u32 { self.0 = self.0.wrapping_add(1_000); self.0 }
/// #     fn now_ms(&mut self) -> u32 { self.now_us() / 1_000 }
/// # }
/// use butcom::error::Error;
/// use butcom::line::{OpenDrain, Pull};
/// use butcom::phy::Phy;
///
/// # let pin = Pin::new(&[
/// #     PinTransaction::set(PinState::High),
/// #     PinTransaction::get(PinState::High),
/// # ]);
/// let mut phy = Phy::new(OpenDrain::new(pin), Pull::Up, Ticks(0));
/// phy.begin().unwrap();
/// phy.set_bit_time(300);
///
/// // Nothing is sending: the line rests high until the deadline
/// assert_eq!(phy.receive_byte(0), Err(Error::Timeout));
/// # let (line, _clock) = phy.free();
/// # line.into_inner().done();
/// ```
#[derive(Debug)]
pub struct Phy<P, C> {
    pin: P,
    clock: C,
    pull: Pull,
    timing: Timing,
}

impl<P, C> Phy<P, C>
where
    P: LinePin,
    C: Clock,
{
    /// Creates a signaling layer with the default 500 µs bit time.
    ///
    /// The pin is not touched until [`begin`](Phy::begin).
    pub fn new(pin: P, pull: Pull, clock: C) -> Self {
        Self {
            pin,
            clock,
            pull,
            timing: Timing::default(),
        }
    }

    /// Releases the line so it rests high, with the configured pull mode.
    pub fn begin(&mut self) -> Result<(), Error<P::Error>> {
        self.release()
    }

    /// Sets the bit duration, clamped to 300..=2000 µs.
    ///
    /// Takes effect on the next transmit or receive.
    pub fn set_bit_time(&mut self, bit_us: u16) {
        self.set_timing(Timing::new(bit_us));
    }

    /// Replaces the line timing.
    pub fn set_timing(&mut self, timing: Timing) {
        self.timing = timing;
    }

    /// Current line timing.
    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// Pull mode applied whenever the line is released.
    pub fn pull(&self) -> Pull {
        self.pull
    }

    /// Reads the millisecond clock.
    pub fn now_ms(&mut self) -> u32 {
        self.clock.now_ms()
    }

    /// Consumes the signaling layer, returning the pin and the clock.
    pub fn free(self) -> (P, C) {
        (self.pin, self.clock)
    }

    fn release(&mut self) -> Result<(), Error<P::Error>> {
        self.pin.release(self.pull).map_err(Error::Pin)
    }

    fn drive_low(&mut self) -> Result<(), Error<P::Error>> {
        self.pin.drive_low().map_err(Error::Pin)
    }

    fn is_high(&mut self) -> Result<bool, Error<P::Error>> {
        self.pin.is_high().map_err(Error::Pin)
    }

    fn expired(&mut self, start_ms: u32, timeout_ms: u32) -> bool {
        self.clock.now_ms().wrapping_sub(start_ms) > timeout_ms
    }

    /// Blocks until the line has been high for the idle threshold.
    ///
    /// There is no timeout: a line held low forever blocks forever.
    fn wait_idle(&mut self) -> Result<(), Error<P::Error>> {
        let idle_us = self.timing.idle_us();
        let mut high_since = self.clock.now_us();
        loop {
            if self.is_high()? {
                if self.clock.now_us().wrapping_sub(high_since) >= idle_us {
                    return Ok(());
                }
            } else {
                high_since = self.clock.now_us();
            }
        }
    }

    /// Transmits one byte: start bit, 8 data bits LSB first, stop bit.
    ///
    /// Waits for an idle line first, then occupies the caller for ten
    /// bit-times.
    pub fn transmit_byte(&mut self, value: u8) -> Result<(), Error<P::Error>> {
        self.wait_idle()?;
        let bit_us = u32::from(self.timing.bit_us());

        self.drive_low()?;
        self.clock.delay_us(bit_us);

        for i in 0..8 {
            if (value >> i) & 1 == 1 {
                self.release()?;
            } else {
                self.drive_low()?;
            }
            self.clock.delay_us(bit_us);
        }

        self.release()?;
        self.clock.delay_us(bit_us);
        Ok(())
    }

    /// Transmits `bytes` back to back, each behind its own idle guard.
    pub fn transmit(&mut self, bytes: &[u8]) -> Result<(), Error<P::Error>> {
        for &b in bytes {
            self.transmit_byte(b)?;
        }
        Ok(())
    }

    /// Receives one byte, giving up after `timeout_ms` milliseconds.
    ///
    /// The timeout bounds the wait for a genuine start bit. Once one is
    /// confirmed, the byte is sampled to its last bit even if that ends past
    /// the deadline. Returns [`Error::Timeout`] when no start bit arrived in
    /// time.
    pub fn receive_byte(&mut self, timeout_ms: u32) -> Result<u8, Error<P::Error>> {
        let start_ms = self.clock.now_ms();

        // A line that is already low is mid-byte or held; wait for rest.
        while !self.is_high()? {
            if self.expired(start_ms, timeout_ms) {
                return Err(Error::Timeout);
            }
        }

        loop {
            if self.expired(start_ms, timeout_ms) {
                return Err(Error::Timeout);
            }
            if self.is_high()? {
                continue;
            }

            let edge_us = self.clock.now_us();
            self.clock
                .delay_us(u32::from(self.timing.quarter_bit_us()));
            if self.is_high()? {
                trace!("false start bit rejected");
                continue;
            }

            return self.sample_byte(edge_us);
        }
    }

    /// Samples the eight data bits of a confirmed start bit.
    ///
    /// Not bounded by the receive timeout: the last sample is always
    /// `first_sample_us + 7 * bit_us` after the edge, so a byte whose start
    /// bit arrived in time is read to the end.
    fn sample_byte(&mut self, edge_us: u32) -> Result<u8, Error<P::Error>> {
        let bit_us = u32::from(self.timing.bit_us());
        let mut sample_at = edge_us.wrapping_add(self.timing.first_sample_us());
        let mut value = 0u8;

        for i in 0..8 {
            while (self.clock.now_us().wrapping_sub(sample_at) as i32) < 0 {}
            if self.is_high()? {
                value |= 1 << i;
            }
            sample_at = sample_at.wrapping_add(bit_us);
        }

        Ok(value)
    }
}
