//! Byte-driven frame assembly.
//!
//! Bytes arrive one per [`Link::poll`](crate::link::Link::poll). The
//! [`FrameAssembler`] hunts for the START marker, checks the body length and
//! collects the body into a bounded buffer; once the body is complete it is
//! validated and handed back as a [`Frame`].
//!
//! There is no frame-level timeout. A peer that stalls mid-frame leaves the
//! assembler in [`RxState::ReadBody`] until enough bytes arrive; garbage that
//! completes a stalled body fails the CRC check, and the next START marker
//! resynchronises the stream.

use heapless::Vec;

use crate::consts::{MAX_BODY_LEN, MAX_BODY_LEN_USIZE, MIN_BODY_LEN, START_MARKER};
use crate::frame::{Frame, FrameError};

/// Receive state machine states.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum RxState {
    /// Discarding bytes until the 0xA5 START marker.
    #[default]
    WaitStart,
    /// The next byte is the body length.
    WaitLength,
    /// Collecting `expected_len` body bytes.
    ReadBody,
}

/// Reassembles frames from a byte stream.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    state: RxState,
    expected_len: u8,
    body: Vec<u8, MAX_BODY_LEN_USIZE>,
}

impl FrameAssembler {
    /// Creates an assembler waiting for a START marker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current parse state.
    pub fn state(&self) -> RxState {
        self.state
    }

    /// Number of body bytes collected for the frame in progress.
    pub fn filled(&self) -> usize {
        self.body.len()
    }

    /// Drops any partial frame and waits for the next START marker.
    pub fn reset(&mut self) {
        self.state = RxState::WaitStart;
        self.expected_len = 0;
        self.body.clear();
    }

    /// Feeds one received byte.
    ///
    /// Returns `Ok(Some(frame))` when a body completes with a valid CRC,
    /// `Ok(None)` while more bytes are needed, and `Err` when a frame is
    /// aborted. The assembler is back in [`RxState::WaitStart`] after any
    /// `Some` or `Err`.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Frame>, FrameError> {
        match self.state {
            RxState::WaitStart => {
                if byte == START_MARKER {
                    self.state = RxState::WaitLength;
                }
                Ok(None)
            }
            RxState::WaitLength => {
                if !(MIN_BODY_LEN..=MAX_BODY_LEN).contains(&byte) {
                    self.reset();
                    return Err(FrameError::InvalidLength(byte));
                }
                self.expected_len = byte;
                self.body.clear();
                self.state = RxState::ReadBody;
                Ok(None)
            }
            RxState::ReadBody => {
                if self.body.push(byte).is_err() {
                    self.reset();
                    return Err(FrameError::Overflow);
                }
                if self.body.len() < usize::from(self.expected_len) {
                    return Ok(None);
                }
                let frame = Frame::decode_body(&self.body);
                self.reset();
                frame.map(Some)
            }
        }
    }
}
