//! Capability surface consumed by the signaling layer.
//!
//! The protocol needs three things from the platform: a pin that can be
//! released (high impedance, optionally pulled up) or driven low, a way to read
//! that pin, and a monotonic clock with microsecond busy-waits. These are
//! expressed as the [`LinePin`] and [`Clock`] traits so the whole stack can run
//! against real GPIO or against a simulated line in tests.
//!
//! Most HALs can configure a GPIO as an open-drain output that still reads its
//! input level. Such pins implement both `embedded_hal::digital::InputPin` and
//! `OutputPin`, and [`OpenDrain`] turns them into a [`LinePin`]:
//! `set_high` releases the line, `set_low` drives it.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

/// How the line is biased while this device is not driving it.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Pull {
    /// Plain input; an external resistor or the peer holds the line high.
    Floating,
    /// Input with the internal pull-up enabled.
    #[default]
    Up,
}

/// A bidirectional pin for the shared, idle-high line.
///
/// Logical 1 is sent by releasing the line, logical 0 by driving it low, so an
/// idle receiver never fights a transmitter.
pub trait LinePin: ErrorType {
    /// Switches the pin to input (high impedance), applying `pull`.
    fn release(&mut self, pull: Pull) -> Result<(), Self::Error>;

    /// Switches the pin to output and drives it low.
    fn drive_low(&mut self) -> Result<(), Self::Error>;

    /// Reads the current line level.
    fn is_high(&mut self) -> Result<bool, Self::Error>;
}

/// Monotonic time source plus busy-wait delays.
///
/// Both counters are free-running and wrap; callers only ever compare them with
/// wrapping subtraction.
pub trait Clock: DelayNs {
    /// Microseconds since an arbitrary epoch.
    fn now_us(&mut self) -> u32;

    /// Milliseconds since an arbitrary epoch.
    fn now_ms(&mut self) -> u32;
}

/// Adapts an open-drain `embedded-hal` pin to [`LinePin`].
///
/// The pull mode is fixed when the HAL configures the pin, so
/// [`release`](LinePin::release) ignores its argument here.
///
/// ## Example
///
/// ```rust
/// # use embedded_hal_mock::eh1::digital::{Mock as Pin, State as PinState, Transaction as PinTransaction};
/// use butcom::line::{LinePin, OpenDrain, Pull};
///
/// # let pin = Pin::new(&[PinTransaction::set(PinState::High)]);
/// let mut line = OpenDrain::new(pin);
/// line.release(Pull::Up).unwrap();
/// # line.into_inner().done();
/// ```
#[derive(Debug)]
pub struct OpenDrain<P>(P);

impl<P> OpenDrain<P> {
    /// Wraps an open-drain pin.
    pub fn new(pin: P) -> Self {
        Self(pin)
    }

    /// Returns the wrapped pin.
    pub fn into_inner(self) -> P {
        self.0
    }
}

impl<P: ErrorType> ErrorType for OpenDrain<P> {
    type Error = P::Error;
}

impl<P> LinePin for OpenDrain<P>
where
    P: InputPin + OutputPin,
{
    fn release(&mut self, _pull: Pull) -> Result<(), Self::Error> {
        self.0.set_high()
    }

    fn drive_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }
}
