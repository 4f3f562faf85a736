//! # butcom
//!
//! A portable, no_std Rust implementation of a single-wire, half-duplex link
//! between two microcontrollers sharing one open-drain GPIO line.
//!
//! The crate is split into two layers:
//! - a **signaling layer** ([`phy::Phy`]) that bit-bangs async-serial bytes
//!   (start bit, 8 data bits LSB first, stop bit) with an idle guard before
//!   every byte and a glitch filter on every start bit
//! - a **protocol layer** ([`link::Link`]) that adds CRC-8 framing, automatic
//!   ACKs, bounded retries, a duplicate filter and HELLO peer discovery
//!
//! Hardware access goes through `embedded-hal` 1.0 traits only: any open-drain
//! pin that is both an `InputPin` and an `OutputPin` can be wrapped in
//! [`line::OpenDrain`], and any `DelayNs` with a free-running counter can
//! implement [`line::Clock`].
//!
//! ## Crate features
//! | Feature           | Description |
//! |-------------------|-------------|
//! | `std`             | Links `std` and enables `std` support in dependencies |
//! | `inbox` (default) | [`inbox::Inbox`], a `critical-section` guarded frame queue |
//! | `poll-loop`       | Blocking [`timing::run_poll_loop`] drivers built on `DelayNs` |
//! | `defmt-0-3`       | `defmt::Format` for public types and `defmt` logging |
//! | `log`             | Uses `log` logging |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use butcom::frame::MessageType;
//! use butcom::line::{OpenDrain, Pull};
//! use butcom::link::Link;
//!
//! let mut link = Link::new(OpenDrain::new(pin), Pull::Up, clock, 0x01)
//!     .with_handler(|id: u8, kind: MessageType, payload: &[u8]| {
//!         // called once per accepted frame
//!     });
//! link.set_speed_quality(2);
//! link.start(true)?;
//!
//! let msg_id = link.send(&[0x10, 0x20], true)?;
//! while link.delivery(msg_id) == Err(nb::Error::WouldBlock) {
//!     link.poll()?;
//! }
//! ```
//!
//! ## Integration Notes
//!
//! - Exactly two devices may share a line; there is no addressing.
//! - Transmit and receive busy-wait. Each `poll` waits up to 10 ms for a
//!   start bit and then reads the whole byte, and sending a frame occupies
//!   the caller for its whole duration.
//! - Call `poll` often: a byte whose start bit is missed is lost.
//! - Both devices must use the same bit time.
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
mod fmt;

#[cfg(feature = "inbox")]
pub use critical_section;
pub use heapless;
pub use nb;

pub mod consts;
pub(crate) mod crc;
pub mod error;
pub mod frame;
#[cfg(feature = "inbox")]
pub mod inbox;
pub mod line;
pub mod link;
pub mod phy;
pub mod receiver;
#[cfg(test)]
mod sim;
pub mod timing;

pub use error::Error;
pub use frame::{Frame, MessageType};
pub use line::{Clock, LinePin, OpenDrain, Pull};
pub use link::{FrameHandler, Link, LinkConfig, LinkStats};
pub use timing::{SpeedQuality, Timing};
