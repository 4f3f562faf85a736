//! Deterministic line and clock simulation for tests.
//!
//! A [`SimLine`] is one device's view of the wire: a virtual microsecond
//! clock, the level the peer is producing (an injected waveform), and what
//! this device has driven (recorded transitions). Every pin read and clock read
//! costs one virtual microsecond, so busy-wait loops always make progress.
//!
//! Two devices are simulated by taking the waveform one records and injecting
//! it into the other.
#![allow(dead_code)]

use core::convert::Infallible;
use std::cell::RefCell;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use crate::frame::Frame;
use crate::line::Clock;
use crate::receiver::FrameAssembler;

/// A list of `(time_us, level)` transitions, sorted by time.
pub(crate) type Waveform = Vec<(u64, bool)>;

#[derive(Debug)]
struct Wire {
    now_us: u64,
    incoming: Waveform,
    driving_low: bool,
    outgoing: Waveform,
}

#[derive(Debug, Clone)]
pub(crate) struct SimLine(Rc<RefCell<Wire>>);

impl SimLine {
    pub(crate) fn new() -> Self {
        Self::starting_at(1_000_000)
    }

    pub(crate) fn starting_at(now_us: u64) -> Self {
        Self(Rc::new(RefCell::new(Wire {
            now_us,
            incoming: Vec::new(),
            driving_low: false,
            outgoing: Vec::new(),
        })))
    }

    pub(crate) fn now(&self) -> u64 {
        self.0.borrow().now_us
    }

    pub(crate) fn advance(&self, us: u64) {
        self.0.borrow_mut().now_us += us;
    }

    /// Schedules `waveform` so its first transition happens `delay_us` from now.
    pub(crate) fn inject(&self, waveform: &[(u64, bool)], delay_us: u64) {
        let Some(&(first, _)) = waveform.first() else {
            return;
        };
        let mut wire = self.0.borrow_mut();
        let offset = wire.now_us + delay_us;
        wire.incoming
            .extend(waveform.iter().map(|&(t, level)| (t - first + offset, level)));
        wire.incoming.sort_by_key(|&(t, _)| t);
    }

    /// Everything this device has driven since the last call.
    pub(crate) fn take_outgoing(&self) -> Waveform {
        core::mem::take(&mut self.0.borrow_mut().outgoing)
    }

    fn tick(&self) -> u64 {
        let mut wire = self.0.borrow_mut();
        wire.now_us += 1;
        wire.now_us
    }

    fn level(&self) -> bool {
        let now = self.tick();
        let wire = self.0.borrow();
        !wire.driving_low && level_at(&wire.incoming, now)
    }

    fn drive(&self, low: bool) {
        let mut wire = self.0.borrow_mut();
        if wire.driving_low != low {
            wire.driving_low = low;
            let now = wire.now_us;
            wire.outgoing.push((now, !low));
        }
    }
}

impl ErrorType for SimLine {
    type Error = Infallible;
}

impl InputPin for SimLine {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.level())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.level())
    }
}

impl OutputPin for SimLine {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(true);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(false);
        Ok(())
    }
}

impl DelayNs for SimLine {
    fn delay_ns(&mut self, ns: u32) {
        self.advance(u64::from(ns).div_ceil(1_000));
    }
}

impl Clock for SimLine {
    fn now_us(&mut self) -> u32 {
        self.tick() as u32
    }

    fn now_ms(&mut self) -> u32 {
        (self.tick() / 1_000) as u32
    }
}

/// Level of `waveform` at time `t`; the line idles high.
pub(crate) fn level_at(waveform: &[(u64, bool)], t: u64) -> bool {
    match waveform.partition_point(|&(at, _)| at <= t) {
        0 => true,
        n => waveform[n - 1].1,
    }
}

/// Ideal async-serial waveform for `bytes`, starting at t = 0, with
/// `gap_bits` of idle between stop bit and the next start bit.
pub(crate) fn uart_waveform(bytes: &[u8], bit_us: u64, gap_bits: u64) -> Waveform {
    let mut waveform = Vec::new();
    let mut level = true;
    let mut push = |t: u64, next: bool| {
        if next != level {
            waveform.push((t, next));
            level = next;
        }
    };
    let mut t = 0;
    for &byte in bytes {
        push(t, false);
        for i in 0..8 {
            push(t + bit_us * (1 + i), (byte >> i) & 1 == 1);
        }
        push(t + bit_us * 9, true);
        t += bit_us * (10 + gap_bits);
    }
    waveform
}

/// Offline decoder: samples each byte at 1.5 bit-times after its start edge.
pub(crate) fn decode_waveform(waveform: &[(u64, bool)], bit_us: u64) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut cursor = 0;
    while let Some(&(start, _)) = waveform
        .iter()
        .find(|&&(t, level)| t >= cursor && !level)
    {
        let mut value = 0u8;
        for i in 0..8 {
            if level_at(waveform, start + bit_us * 3 / 2 + bit_us * i) {
                value |= 1 << i;
            }
        }
        bytes.push(value);
        // Middle of the stop bit
        cursor = start + bit_us * 9 + bit_us / 2;
    }
    bytes
}

/// Every valid frame contained in `bytes`.
pub(crate) fn frames_in(bytes: &[u8]) -> Vec<Frame> {
    let mut assembler = FrameAssembler::new();
    bytes
        .iter()
        .filter_map(|&b| assembler.feed(b).ok().flatten())
        .collect()
}

/// Time from the first transition to the end of the last stop bit.
pub(crate) fn duration(waveform: &[(u64, bool)], bit_us: u64) -> u64 {
    match (waveform.first(), waveform.last()) {
        (Some(&(first, _)), Some(&(last, _))) => last - first + bit_us,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uart_waveform_decodes() {
        let bytes = [0xa5, 0x00, 0xff, 0x3c];
        let waveform = uart_waveform(&bytes, 500, 3);
        assert_eq!(decode_waveform(&waveform, 500), bytes);
    }

    #[test]
    fn test_line_idles_high() {
        let mut line = SimLine::new();
        assert!(line.is_high().unwrap());
    }

    #[test]
    fn test_injected_waveform_is_seen() {
        let mut line = SimLine::new();
        line.inject(&[(0, false), (100, true)], 10);
        assert!(line.is_high().unwrap());
        line.advance(20);
        assert!(line.is_low().unwrap());
        line.advance(100);
        assert!(line.is_high().unwrap());
    }

    #[test]
    fn test_driving_is_recorded() {
        let mut line = SimLine::new();
        let start = line.now();
        line.set_low().unwrap();
        assert!(line.is_low().unwrap());
        line.delay_us(500);
        line.set_high().unwrap();
        line.set_high().unwrap();

        assert_eq!(
            line.take_outgoing(),
            vec![(start, false), (start + 501, true)]
        );
        assert!(line.take_outgoing().is_empty());
    }
}
