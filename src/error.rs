//! Error type shared by the signaling and protocol layers.
//!
//! Protocol-level failures (noise, bad CRC, missing ACKs) are absorbed inside
//! the link and never show up here. What remains is what a caller can act on:
//! a pin that failed at the HAL level, a receive that ran out of time, or the
//! final outcome of a reliable send.

/// Errors returned by [`Phy`](crate::phy::Phy) and [`Link`](crate::link::Link).
///
/// `E` is the error type of the underlying [`LinePin`](crate::line::LinePin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Error<E> {
    /// The line pin reported an error while being driven, released or read.
    #[error("line pin error: {0:?}")]
    Pin(E),
    /// No byte arrived before the receive timeout elapsed.
    #[error("timed out waiting for a byte")]
    Timeout,
    /// The reliable send was retransmitted `max_retries` times without an ACK.
    #[error("reliable send abandoned after exhausting its retries")]
    Abandoned,
    /// The message id is not the one being tracked for delivery.
    #[error("message id is not tracked for delivery")]
    Untracked,
}
