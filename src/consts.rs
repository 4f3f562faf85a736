//! Constants used across the single-wire protocol implementation.
//!
//! This module defines the wire-format markers, frame size limits, line timing
//! bounds and the protocol defaults (ACK timeout, retry budget, discovery period).
//!
//! ## Key Concepts
//!
//! - **Body length**: the byte after the START marker. It counts the type byte,
//!   the message id, the payload and the trailing CRC, but not itself.
//! - **Bit time**: the duration of one transmitted bit in microseconds. It is
//!   always kept inside [`MIN_BIT_TIME_US`]..=[`MAX_BIT_TIME_US`].
//! - **Idle guard**: a transmitter waits for [`IDLE_BITS`] bit-times of
//!   continuous high before driving the line.

/// START marker that opens every frame on the wire.
pub const START_MARKER: u8 = 0xA5;

/// Maximum number of payload bytes carried by a single frame.
///
/// Longer payloads are truncated by [`Link::send`](crate::link::Link::send).
pub const MAX_PAYLOAD: u8 = 16;

/// See [`MAX_PAYLOAD`](crate::consts::MAX_PAYLOAD)
pub const MAX_PAYLOAD_USIZE: usize = MAX_PAYLOAD as usize;

/// Smallest valid body length: type + message id + CRC.
pub const MIN_BODY_LEN: u8 = 3;

/// Largest valid body length: type + message id + [`MAX_PAYLOAD`] + CRC.
pub const MAX_BODY_LEN: u8 = 2 + MAX_PAYLOAD + 1;

/// See [`MAX_BODY_LEN`](crate::consts::MAX_BODY_LEN)
pub const MAX_BODY_LEN_USIZE: usize = MAX_BODY_LEN as usize;

/// Largest encoded frame: START + body length byte + the body itself.
pub const MAX_FRAME_LEN_USIZE: usize = 2 + MAX_BODY_LEN_USIZE;

/// Lower clamp for the bit duration, in microseconds.
pub const MIN_BIT_TIME_US: u16 = 300;

/// Upper clamp for the bit duration, in microseconds.
pub const MAX_BIT_TIME_US: u16 = 2_000;

/// Bit duration used until the link is reconfigured (0.5 ms per bit).
pub const DEFAULT_BIT_TIME_US: u16 = 500;

/// Number of bit-times the line must stay high before a transmitter may start.
pub const IDLE_BITS: u32 = 3;

/// Default wait, in milliseconds, for an ACK before a reliable send is retried.
pub const DEFAULT_ACK_TIMEOUT_MS: u16 = 40;

/// Default number of retransmissions before a reliable send is abandoned.
pub const DEFAULT_MAX_RETRIES: u8 = 2;

/// Default period, in milliseconds, between HELLO announcements.
pub const DEFAULT_DISCOVERY_INTERVAL_MS: u32 = 5_000;

/// How long a single [`Link::poll`](crate::link::Link::poll) waits for a byte.
///
/// Slow bit times raise it, see
/// [`Timing::rx_timeout_ms`](crate::timing::Timing::rx_timeout_ms).
pub const RX_BYTE_TIMEOUT_MS: u32 = 10;

/// Message id assigned to the first locally originated message.
pub const FIRST_MESSAGE_ID: u8 = 1;
