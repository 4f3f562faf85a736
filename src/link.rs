//! Reliable, duplicate-free message exchange between two devices.
//!
//! This module provides [`Link`], the protocol layer. It owns a
//! [`Phy`](crate::phy::Phy) and adds framing, CRC-8 validation, automatic
//! ACKs, retries for reliable sends, a single-slot duplicate filter and
//! periodic HELLO announcements for peer discovery.
//!
//! The link does nothing on its own: call [`Link::poll`] as often as possible.
//! Each call receives at most one byte (waiting up to 10 ms for its start
//! bit, longer at bit times above 1.6 ms), then
//! services the retry timer and the discovery timer.
//!
//! ## Example
//!
//! ```rust
//! # use core::convert::Infallible;
//! # use embedded_hal::delay::DelayNs;
//! # use embedded_hal::digital::ErrorType;
//! # use butcom::line::{Clock, LinePin};
//! # /// A line nobody answers on.
//! # struct QuietLine;
//! # impl ErrorType for QuietLine { type Error = Infallible; }
//! # impl LinePin for QuietLine {
//! #     fn release(&mut self, _pull: Pull) -> Result<(), Infallible> { Ok(()) }
//! #     fn drive_low(&mut self) -> Result<(), Infallible> { Ok(()) }
//! #     fn is_high(&mut self) -> Result<bool, Infallible> { Ok(true) }
//! # }
//! # struct Ticks(u32);
//! # impl DelayNs for Ticks {
//! #     fn delay_ns(&mut self, ns: u32) { self.0 = self.0.wrapping_add(ns.div_ceil(1_000)); }
//! # }
//! # impl Clock for Ticks {
//! #     fn now_us(&mut self) -> u32 { self.0 = self.0.wrapping_add(1); self.0 }
//! #     fn now_ms(&mut self) -> u32 { self.now_us() / 1_000 }
//! # }
//! use butcom::error::Error;
//! use butcom::frame::MessageType;
//! use butcom::line::Pull;
//! use butcom::link::Link;
//!
//! let mut link = Link::new(QuietLine, Pull::Up, Ticks(0), 1)
//!     .with_handler(|_msg_id: u8, _kind: MessageType, _payload: &[u8]| {
//!         // handle the frame
//!     });
//! link.start(false).unwrap();
//!
//! let id = link.send(&[0x10, 0x20], true).unwrap();
//! while link.delivery(id) == Err(nb::Error::WouldBlock) {
//!     link.poll().unwrap();
//! }
//! // Nobody acknowledged it, even after two retries
//! assert_eq!(link.delivery(id), Err(nb::Error::Other(Error::Abandoned)));
//! assert_eq!(link.stats().retransmissions, 2);
//! ```
//!
//! ## Design Notes
//!
//! Exactly two devices may share one line. Nothing arbitrates access beyond
//! the idle guard before each byte, and ACKs, the duplicate filter and the
//! peer id all assume a single counterpart.
//!
//! Only one reliable send is tracked at a time. A reliable send requested
//! while another is outstanding goes out once, untracked.

use crate::consts::{
    DEFAULT_ACK_TIMEOUT_MS, DEFAULT_BIT_TIME_US, DEFAULT_DISCOVERY_INTERVAL_MS,
    DEFAULT_MAX_RETRIES, FIRST_MESSAGE_ID, MAX_PAYLOAD_USIZE,
};
use crate::error::Error;
use crate::frame::{Frame, FrameError, MessageType};
use crate::line::{Clock, LinePin, Pull};
use crate::phy::Phy;
use crate::receiver::FrameAssembler;
use crate::timing::{SpeedQuality, Timing};

/// Receives every accepted frame.
///
/// Called synchronously from [`Link::poll`], once per CRC-valid,
/// non-duplicate frame. ACK frames are delivered too.
pub trait FrameHandler {
    /// Handles one accepted frame. `payload` is empty when the frame has none.
    fn on_frame(&mut self, msg_id: u8, kind: MessageType, payload: &[u8]);
}

impl<F> FrameHandler for F
where
    F: FnMut(u8, MessageType, &[u8]),
{
    fn on_frame(&mut self, msg_id: u8, kind: MessageType, payload: &[u8]) {
        self(msg_id, kind, payload)
    }
}

/// A handler that discards every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHandler;

impl FrameHandler for NoHandler {
    fn on_frame(&mut self, _msg_id: u8, _kind: MessageType, _payload: &[u8]) {}
}

/// Tunable protocol parameters.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct LinkConfig {
    /// Bit duration in microseconds, clamped to 300..=2000.
    pub bit_time_us: u16,
    /// How long to wait for an ACK before retransmitting, in milliseconds.
    pub ack_timeout_ms: u16,
    /// Retransmissions before a reliable send is abandoned.
    pub max_retries: u8,
    /// Period between HELLO announcements in milliseconds; 0 disables them.
    pub discovery_interval_ms: u32,
}

impl LinkConfig {
    /// Default configuration with the timing of `quality`.
    pub const fn for_speed_quality(quality: SpeedQuality) -> Self {
        Self {
            bit_time_us: quality.bit_time_us(),
            ack_timeout_ms: quality.ack_timeout_ms(),
            max_retries: DEFAULT_MAX_RETRIES,
            discovery_interval_ms: DEFAULT_DISCOVERY_INTERVAL_MS,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            bit_time_us: DEFAULT_BIT_TIME_US,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            discovery_interval_ms: DEFAULT_DISCOVERY_INTERVAL_MS,
        }
    }
}

/// Counters describing link activity. All counters saturate.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct LinkStats {
    /// Frames transmitted, including retries and ACKs.
    pub frames_sent: u32,
    /// CRC-valid frames received, duplicates included.
    pub frames_received: u32,
    /// Frames dropped because their CRC did not match.
    pub crc_errors: u32,
    /// Frames aborted for an invalid length or buffer overflow.
    pub framing_errors: u32,
    /// DATA frames suppressed by the duplicate filter.
    pub duplicates: u32,
    /// Retransmissions of reliable sends.
    pub retransmissions: u32,
    /// Reliable sends confirmed by an ACK.
    pub delivered: u32,
    /// Reliable sends abandoned after exhausting their retries.
    pub abandoned: u32,
}

/// The single outstanding reliable send.
#[derive(Debug, Clone)]
struct PendingTx {
    frame: Frame,
    retries: u8,
    last_send_ms: u32,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum Outcome {
    Delivered,
    Abandoned,
}

/// The protocol layer for one end of a two-device line.
///
/// ## Type Parameters
///
/// - `P`: the shared line, see [`LinePin`]
/// - `C`: time source and busy-wait delays, see [`Clock`]
/// - `H`: receives accepted frames, see [`FrameHandler`]
#[derive(Debug)]
pub struct Link<P, C, H = NoHandler> {
    phy: Phy<P, C>,
    handler: H,
    id: u8,
    peer: Option<u8>,
    assembler: FrameAssembler,
    last_data_id: Option<u8>,
    pending: Option<PendingTx>,
    last_outcome: Option<(u8, Outcome)>,
    config: LinkConfig,
    last_hello_ms: u32,
    next_msg_id: u8,
    stats: LinkStats,
}

impl<P, C> Link<P, C, NoHandler>
where
    P: LinePin,
    C: Clock,
{
    /// Creates a link with the default configuration.
    ///
    /// `local_id` is announced in HELLO frames. Exactly one other device may
    /// share the line behind `pin`.
    pub fn new(pin: P, pull: Pull, clock: C, local_id: u8) -> Self {
        Self::with_config(pin, pull, clock, local_id, LinkConfig::default())
    }

    /// Creates a link with an explicit configuration.
    pub fn with_config(pin: P, pull: Pull, clock: C, local_id: u8, config: LinkConfig) -> Self {
        let mut phy = Phy::new(pin, pull, clock);
        phy.set_bit_time(config.bit_time_us);
        let config = LinkConfig {
            bit_time_us: phy.timing().bit_us(),
            ..config
        };
        Self {
            phy,
            handler: NoHandler,
            id: local_id,
            peer: None,
            assembler: FrameAssembler::new(),
            last_data_id: None,
            pending: None,
            last_outcome: None,
            config,
            last_hello_ms: 0,
            next_msg_id: FIRST_MESSAGE_ID,
            stats: LinkStats::default(),
        }
    }
}

impl<P, C, H> Link<P, C, H>
where
    P: LinePin,
    C: Clock,
    H: FrameHandler,
{
    /// Replaces the frame handler, changing its type.
    pub fn with_handler<H2: FrameHandler>(self, handler: H2) -> Link<P, C, H2> {
        Link {
            phy: self.phy,
            handler,
            id: self.id,
            peer: self.peer,
            assembler: self.assembler,
            last_data_id: self.last_data_id,
            pending: self.pending,
            last_outcome: self.last_outcome,
            config: self.config,
            last_hello_ms: self.last_hello_ms,
            next_msg_id: self.next_msg_id,
            stats: self.stats,
        }
    }

    /// Replaces the frame handler.
    pub fn set_handler(&mut self, handler: H) {
        self.handler = handler;
    }

    /// Mutable access to the frame handler.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Selects a speed/robustness level in `1..=4` (clamped).
    ///
    /// Sets the bit time and the matching ACK timeout.
    pub fn set_speed_quality(&mut self, level: u8) {
        let quality = SpeedQuality::from_level(level);
        self.set_bit_time(quality.bit_time_us());
        self.config.ack_timeout_ms = quality.ack_timeout_ms();
    }

    /// Overrides the bit time, clamped to 300..=2000 µs.
    pub fn set_bit_time(&mut self, bit_us: u16) {
        self.set_timing(Timing::new(bit_us));
    }

    /// Sets the bit time from a bit rate in bits per second.
    pub fn set_baud_rate(&mut self, baud: u32) {
        self.set_timing(Timing::from_baud(baud));
    }

    fn set_timing(&mut self, timing: Timing) {
        self.phy.set_timing(timing);
        self.config.bit_time_us = timing.bit_us();
    }

    /// Sets the ACK timeout in milliseconds.
    pub fn set_ack_timeout(&mut self, ms: u16) {
        self.config.ack_timeout_ms = ms;
    }

    /// Sets how many retransmissions a reliable send gets.
    pub fn set_max_retries(&mut self, retries: u8) {
        self.config.max_retries = retries;
    }

    /// Sets the HELLO period in milliseconds; 0 disables periodic HELLOs.
    pub fn set_discovery_interval(&mut self, ms: u32) {
        self.config.discovery_interval_ms = ms;
    }

    /// This device's id.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// The peer's id, once a HELLO from it has been received.
    pub fn peer(&self) -> Option<u8> {
        self.peer
    }

    /// Whether a HELLO from the peer has been received.
    pub fn has_peer(&self) -> bool {
        self.peer.is_some()
    }

    /// Whether a reliable send is waiting for its ACK.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Activity counters.
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Current line timing.
    pub fn timing(&self) -> Timing {
        self.phy.timing()
    }

    /// Current configuration.
    pub fn config(&self) -> LinkConfig {
        self.config
    }

    /// Consumes the link, returning the pin, the clock and the handler.
    pub fn free(self) -> (P, C, H) {
        let (pin, clock) = self.phy.free();
        (pin, clock, self.handler)
    }

    /// Puts the line into its idle, listening state.
    ///
    /// Restarts the discovery timer and, if `send_hello` is set, announces
    /// this device right away.
    pub fn start(&mut self, send_hello: bool) -> Result<(), Error<P::Error>> {
        self.phy.begin()?;
        self.last_hello_ms = self.phy.now_ms();
        if send_hello {
            self.send_hello()?;
        }
        Ok(())
    }

    /// Sends a DATA frame and returns its message id.
    ///
    /// Payloads longer than 16 bytes are truncated. The frame goes out
    /// immediately. With `request_ack`, and no other reliable send outstanding,
    /// it is also tracked and retransmitted by [`poll`](Link::poll) until
    /// acknowledged or out of retries.
    pub fn send(&mut self, payload: &[u8], request_ack: bool) -> Result<u8, Error<P::Error>> {
        if payload.len() > MAX_PAYLOAD_USIZE {
            warn!(
                "payload of {} bytes truncated to {}",
                payload.len(),
                MAX_PAYLOAD_USIZE
            );
        }
        let msg_id = self.take_msg_id();
        let frame = Frame::data(msg_id, payload);
        self.transmit(&frame)?;

        if request_ack {
            if self.pending.is_none() {
                self.pending = Some(PendingTx {
                    frame,
                    retries: 0,
                    last_send_ms: self.phy.now_ms(),
                });
            } else {
                debug!(
                    "reliable send {} outstanding, {} goes out untracked",
                    self.pending_id(),
                    msg_id
                );
            }
        }
        Ok(msg_id)
    }

    /// Delivery state of a reliable send.
    ///
    /// - `Err(nb::Error::WouldBlock)` while `msg_id` waits for its ACK
    /// - `Ok(())` once it was acknowledged
    /// - `Err(nb::Error::Other(Error::Abandoned))` after its retries ran out
    /// - `Err(nb::Error::Other(Error::Untracked))` if `msg_id` is neither
    ///   pending nor the most recently finished reliable send
    pub fn delivery(&self, msg_id: u8) -> nb::Result<(), Error<P::Error>> {
        if let Some(pending) = &self.pending {
            if pending.frame.msg_id == msg_id {
                return Err(nb::Error::WouldBlock);
            }
        }
        match self.last_outcome {
            Some((id, Outcome::Delivered)) if id == msg_id => Ok(()),
            Some((id, Outcome::Abandoned)) if id == msg_id => {
                Err(nb::Error::Other(Error::Abandoned))
            }
            _ => Err(nb::Error::Other(Error::Untracked)),
        }
    }

    /// Runs one protocol step.
    ///
    /// Receives at most one byte, waiting [`Timing::rx_timeout_ms`] for it,
    /// then retransmits or abandons an overdue reliable send, then sends a
    /// HELLO if the discovery interval has passed. Only pin errors are returned.
    pub fn poll(&mut self) -> Result<(), Error<P::Error>> {
        let timeout_ms = self.phy.timing().rx_timeout_ms();
        match self.phy.receive_byte(timeout_ms) {
            Ok(byte) => self.handle_byte(byte)?,
            Err(Error::Timeout) => {}
            Err(e) => return Err(e),
        }

        let now = self.phy.now_ms();
        self.service_retry(now)?;
        self.service_discovery(now)
    }

    fn take_msg_id(&mut self) -> u8 {
        let id = self.next_msg_id;
        self.next_msg_id = self.next_msg_id.wrapping_add(1);
        id
    }

    fn pending_id(&self) -> u8 {
        self.pending.as_ref().map_or(0, |p| p.frame.msg_id)
    }

    fn transmit(&mut self, frame: &Frame) -> Result<(), Error<P::Error>> {
        self.phy.transmit(&frame.encode())?;
        self.stats.frames_sent = self.stats.frames_sent.saturating_add(1);
        trace!("sent {:?} frame {}", frame.kind, frame.msg_id);
        Ok(())
    }

    fn send_hello(&mut self) -> Result<(), Error<P::Error>> {
        let frame = Frame::hello(self.take_msg_id(), self.id);
        self.transmit(&frame)?;
        self.last_hello_ms = self.phy.now_ms();
        Ok(())
    }

    fn service_retry(&mut self, now: u32) -> Result<(), Error<P::Error>> {
        let Some(pending) = &self.pending else {
            return Ok(());
        };
        if now.wrapping_sub(pending.last_send_ms) <= u32::from(self.config.ack_timeout_ms) {
            return Ok(());
        }

        if pending.retries >= self.config.max_retries {
            let msg_id = pending.frame.msg_id;
            warn!("no ACK for message {}, giving up", msg_id);
            self.pending = None;
            self.last_outcome = Some((msg_id, Outcome::Abandoned));
            self.stats.abandoned = self.stats.abandoned.saturating_add(1);
            return Ok(());
        }

        let frame = pending.frame.clone();
        debug!("retransmitting message {}", frame.msg_id);
        self.transmit(&frame)?;
        self.stats.retransmissions = self.stats.retransmissions.saturating_add(1);
        let now = self.phy.now_ms();
        if let Some(pending) = self.pending.as_mut() {
            pending.retries += 1;
            pending.last_send_ms = now;
        }
        Ok(())
    }

    fn service_discovery(&mut self, now: u32) -> Result<(), Error<P::Error>> {
        let interval = self.config.discovery_interval_ms;
        if interval != 0 && now.wrapping_sub(self.last_hello_ms) > interval {
            self.send_hello()?;
        }
        Ok(())
    }

    fn handle_byte(&mut self, byte: u8) -> Result<(), Error<P::Error>> {
        match self.assembler.feed(byte) {
            Ok(Some(frame)) => self.process_frame(frame),
            Ok(None) => Ok(()),
            Err(FrameError::CrcMismatch { expected, found }) => {
                warn!("dropping frame: CRC {} != {}", found, expected);
                self.stats.crc_errors = self.stats.crc_errors.saturating_add(1);
                Ok(())
            }
            Err(e) => {
                warn!("dropping frame: {:?}", e);
                self.stats.framing_errors = self.stats.framing_errors.saturating_add(1);
                Ok(())
            }
        }
    }

    fn process_frame(&mut self, frame: Frame) -> Result<(), Error<P::Error>> {
        self.stats.frames_received = self.stats.frames_received.saturating_add(1);
        trace!("received {:?} frame {}", frame.kind, frame.msg_id);

        let mut duplicate = false;
        match frame.kind {
            MessageType::Hello => {
                if let Some(&peer) = frame.payload.first() {
                    if peer == self.id {
                        warn!("HELLO carries our own id {}", peer);
                    }
                    if self.peer != Some(peer) {
                        debug!("discovered peer {}", peer);
                    }
                    self.peer = Some(peer);
                }
            }
            MessageType::Ack => {
                if self
                    .pending
                    .as_ref()
                    .is_some_and(|p| p.frame.msg_id == frame.msg_id)
                {
                    debug!("message {} acknowledged", frame.msg_id);
                    self.pending = None;
                    self.last_outcome = Some((frame.msg_id, Outcome::Delivered));
                    self.stats.delivered = self.stats.delivered.saturating_add(1);
                }
            }
            MessageType::Data => {
                if self.last_data_id == Some(frame.msg_id) {
                    debug!("duplicate message {} suppressed", frame.msg_id);
                    duplicate = true;
                    self.stats.duplicates = self.stats.duplicates.saturating_add(1);
                } else {
                    self.last_data_id = Some(frame.msg_id);
                }
            }
            MessageType::Unknown(_) => {}
        }

        if frame.kind != MessageType::Ack {
            self.transmit(&Frame::ack(frame.msg_id))?;
        }

        if !duplicate {
            self.handler.on_frame(frame.msg_id, frame.kind, &frame.payload);
        }
        Ok(())
    }
}
