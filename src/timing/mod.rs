//! Line timing and poll scheduling.
//!
//! The protocol has no clock line, so both devices time every bit from their
//! own clock. [`Timing`] holds the bit duration and the thresholds derived from
//! it; [`SpeedQuality`] is the coarse knob that trades throughput for noise
//! margin on long or noisy cables.
//!
//! | Level | [`SpeedQuality`] | Bit time | ACK timeout |
//! |-------|------------------|----------|-------------|
//! |     1 | `Fastest`        |   300 µs |       40 ms |
//! |     2 | `Fast` (default) |   500 µs |       40 ms |
//! |     3 | `Robust`         |   800 µs |       60 ms |
//! |     4 | `MostRobust`     |  1200 µs |       80 ms |
//!
//! With the `poll-loop` feature this module also provides
//! [`run_poll_loop`] and [`run_poll_loop_until`], blocking drivers that call
//! [`Link::poll`](crate::link::Link::poll) at a fixed cadence.

use libm::roundf;

use crate::consts::{
    DEFAULT_BIT_TIME_US, IDLE_BITS, MAX_BIT_TIME_US, MIN_BIT_TIME_US, RX_BYTE_TIMEOUT_MS,
};

#[cfg(feature = "poll-loop")]
mod delay;
#[cfg(feature = "poll-loop")]
pub use delay::*;

/// Bit duration and the thresholds derived from it.
///
/// The bit time is always inside [`MIN_BIT_TIME_US`]..=[`MAX_BIT_TIME_US`], and
/// the derived values are recomputed whenever it changes.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Timing {
    bit_us: u16,
    half_bit_us: u16,
    idle_us: u32,
}

impl Timing {
    /// Builds timing for `bit_us`, clamped to the safe operating band.
    pub const fn new(bit_us: u16) -> Self {
        let bit_us = if bit_us < MIN_BIT_TIME_US {
            MIN_BIT_TIME_US
        } else if bit_us > MAX_BIT_TIME_US {
            MAX_BIT_TIME_US
        } else {
            bit_us
        };
        Self {
            bit_us,
            half_bit_us: bit_us / 2,
            idle_us: IDLE_BITS * bit_us as u32,
        }
    }

    /// Builds timing for a bit rate in bits per second.
    ///
    /// The bit time is `1_000_000 / baud` rounded to the nearest microsecond,
    /// then clamped like [`Timing::new`]. A rate of zero selects the slowest
    /// supported timing.
    pub fn from_baud(baud: u32) -> Self {
        if baud == 0 {
            return Self::new(MAX_BIT_TIME_US);
        }
        let bit_us = roundf(1_000_000.0 / baud as f32);
        if bit_us >= f32::from(MAX_BIT_TIME_US) {
            Self::new(MAX_BIT_TIME_US)
        } else {
            Self::new(bit_us as u16)
        }
    }

    /// Duration of one bit, in microseconds.
    pub const fn bit_us(&self) -> u16 {
        self.bit_us
    }

    /// Half a bit, in microseconds.
    pub const fn half_bit_us(&self) -> u16 {
        self.half_bit_us
    }

    /// Delay between spotting a falling edge and re-checking it for a glitch.
    pub const fn quarter_bit_us(&self) -> u16 {
        self.half_bit_us / 2
    }

    /// How long the line must be continuously high before transmitting.
    pub const fn idle_us(&self) -> u32 {
        self.idle_us
    }

    /// Offset from the start edge to the middle of data bit 0.
    pub const fn first_sample_us(&self) -> u32 {
        self.bit_us as u32 + self.half_bit_us as u32
    }

    /// How long one [`Link::poll`](crate::link::Link::poll) waits for a start bit.
    ///
    /// [`RX_BYTE_TIMEOUT_MS`], raised when needed so it always covers the gap
    /// between two bytes of a frame: the rest of the previous byte, its stop
    /// bit and the sender's idle guard, plus one bit of margin.
    pub const fn rx_timeout_ms(&self) -> u32 {
        let gap_ms = ((IDLE_BITS + 3) * self.bit_us as u32).div_ceil(1_000);
        if gap_ms > RX_BYTE_TIMEOUT_MS {
            gap_ms
        } else {
            RX_BYTE_TIMEOUT_MS
        }
    }

    /// Nominal bit rate for this timing.
    pub const fn baud(&self) -> u32 {
        1_000_000 / self.bit_us as u32
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::new(DEFAULT_BIT_TIME_US)
    }
}

/// Speed/robustness trade-off for the whole link.
///
/// Slower settings give each bit more time, which tolerates more clock drift
/// and cable capacitance at the cost of throughput. The ACK timeout grows with
/// the bit time so a slow peer still gets to answer.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum SpeedQuality {
    /// Level 1: 300 µs per bit.
    Fastest,
    /// Level 2: 500 µs per bit.
    #[default]
    Fast,
    /// Level 3: 800 µs per bit.
    Robust,
    /// Level 4: 1200 µs per bit.
    MostRobust,
}

impl SpeedQuality {
    /// Maps a level in `1..=4` to a setting, clamping out-of-range values.
    pub const fn from_level(level: u8) -> Self {
        match level {
            0 | 1 => Self::Fastest,
            2 => Self::Fast,
            3 => Self::Robust,
            _ => Self::MostRobust,
        }
    }

    /// The level (`1..=4`) this setting corresponds to.
    pub const fn level(&self) -> u8 {
        match self {
            Self::Fastest => 1,
            Self::Fast => 2,
            Self::Robust => 3,
            Self::MostRobust => 4,
        }
    }

    /// Bit duration for this setting, in microseconds.
    pub const fn bit_time_us(&self) -> u16 {
        match self {
            Self::Fastest => 300,
            Self::Fast => 500,
            Self::Robust => 800,
            Self::MostRobust => 1_200,
        }
    }

    /// ACK timeout matching this setting, in milliseconds.
    pub const fn ack_timeout_ms(&self) -> u16 {
        let bit_us = self.bit_time_us();
        if bit_us <= 500 {
            40
        } else if bit_us <= 800 {
            60
        } else {
            80
        }
    }

    /// Line timing for this setting.
    pub const fn timing(&self) -> Timing {
        Timing::new(self.bit_time_us())
    }
}
