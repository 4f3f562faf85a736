//! A bounded queue of received frames.
//!
//! [`Inbox`] decouples frame handling from [`Link::poll`](crate::link::Link::poll):
//! a shared reference to it is a [`FrameHandler`], so the link pushes accepted
//! frames into it and application code drains them at its own pace, even from
//! another interrupt priority. Access is guarded by `critical_section`, so a
//! `static` inbox works on bare metal:
//!
//! ```rust,ignore
//! use butcom::inbox::Inbox;
//!
//! static INBOX: Inbox<8> = Inbox::new();
//!
//! let mut link = Link::new(pin, Pull::Up, clock, 1).with_handler(&INBOX);
//! link.poll()?;
//! while let Some(frame) = INBOX.pop() {
//!     // ...
//! }
//! ```
//!
//! A full inbox drops the newest frame and counts the loss.

use core::cell::{Cell, RefCell};

use critical_section::Mutex;
use heapless::Deque;

use crate::frame::{Frame, MessageType};
use crate::link::FrameHandler;

/// Interrupt-safe FIFO of up to `N` received frames.
#[derive(Debug)]
pub struct Inbox<const N: usize> {
    frames: Mutex<RefCell<Deque<Frame, N>>>,
    dropped: Mutex<Cell<u32>>,
}

impl<const N: usize> Inbox<N> {
    /// Creates an empty inbox.
    pub const fn new() -> Self {
        Self {
            frames: Mutex::new(RefCell::new(Deque::new())),
            dropped: Mutex::new(Cell::new(0)),
        }
    }

    /// Appends a frame, or counts it as dropped if the inbox is full.
    ///
    /// Returns `false` when the frame was dropped.
    pub fn push(&self, frame: Frame) -> bool {
        critical_section::with(|cs| {
            if self.frames.borrow_ref_mut(cs).push_back(frame).is_ok() {
                return true;
            }
            let dropped = self.dropped.borrow(cs);
            dropped.set(dropped.get().saturating_add(1));
            false
        })
    }

    /// Removes the oldest frame.
    pub fn pop(&self) -> Option<Frame> {
        critical_section::with(|cs| self.frames.borrow_ref_mut(cs).pop_front())
    }

    /// Number of queued frames.
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.frames.borrow_ref(cs).len())
    }

    /// Whether no frames are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames lost to a full inbox since creation or the last [`clear`](Inbox::clear).
    pub fn dropped(&self) -> u32 {
        critical_section::with(|cs| self.dropped.borrow(cs).get())
    }

    /// Discards all queued frames and resets the drop counter.
    pub fn clear(&self) {
        critical_section::with(|cs| {
            self.frames.borrow_ref_mut(cs).clear();
            self.dropped.borrow(cs).set(0);
        })
    }
}

impl<const N: usize> Default for Inbox<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FrameHandler for &Inbox<N> {
    fn on_frame(&mut self, msg_id: u8, kind: MessageType, payload: &[u8]) {
        if !self.push(Frame::new(kind, msg_id, payload)) {
            warn!("inbox full, dropping frame {}", msg_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::{OpenDrain, Pull};
    use crate::link::Link;
    use crate::sim::{SimLine, duration, uart_waveform};

    #[test]
    fn test_inbox_is_fifo() {
        let inbox: Inbox<4> = Inbox::new();
        assert!(inbox.is_empty());

        assert!(inbox.push(Frame::data(1, b"a")));
        assert!(inbox.push(Frame::data(2, b"b")));
        assert_eq!(inbox.len(), 2);

        assert_eq!(inbox.pop(), Some(Frame::data(1, b"a")));
        assert_eq!(inbox.pop(), Some(Frame::data(2, b"b")));
        assert_eq!(inbox.pop(), None);
    }

    #[test]
    fn test_inbox_drops_newest_when_full() {
        let inbox: Inbox<2> = Inbox::new();
        let mut handler = &inbox;
        handler.on_frame(1, MessageType::Data, &[1]);
        handler.on_frame(2, MessageType::Data, &[2]);
        handler.on_frame(3, MessageType::Data, &[3]);

        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox.dropped(), 1);
        assert_eq!(inbox.pop().map(|f| f.msg_id), Some(1));
        assert_eq!(inbox.pop().map(|f| f.msg_id), Some(2));
    }

    #[test]
    fn test_inbox_clear() {
        let inbox: Inbox<1> = Inbox::default();
        assert!(inbox.push(Frame::ack(1)));
        assert!(!inbox.push(Frame::ack(2)));

        inbox.clear();
        assert!(inbox.is_empty());
        assert_eq!(inbox.dropped(), 0);
    }

    #[test]
    fn test_static_inbox_as_link_handler() {
        static INBOX: Inbox<4> = Inbox::new();

        let line = SimLine::new();
        let mut link = Link::new(OpenDrain::new(line.clone()), Pull::Up, line.clone(), 2)
            .with_handler(&INBOX);
        link.start(false).unwrap();

        let waveform = uart_waveform(&Frame::data(5, &[0xca, 0xfe]).encode(), 500, 4);
        line.inject(&waveform, 200);
        let end = line.now() + 200 + duration(&waveform, 500);
        while line.now() < end {
            link.poll().unwrap();
        }

        assert_eq!(INBOX.pop(), Some(Frame::data(5, &[0xca, 0xfe])));
        assert!(INBOX.is_empty());
    }
}
