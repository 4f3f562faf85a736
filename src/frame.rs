//! Frame layout, encoding and validation.
//!
//! Every message on the wire is a single frame:
//!
//! ```text
//! byte 0      0xA5          START marker
//! byte 1      body length   2 + payload length + 1, in 3..=19
//! byte 2      type          0 = HELLO, 1 = DATA, 2 = ACK
//! byte 3      message id
//! byte 4..    payload       0..=16 bytes
//! last byte   CRC-8         poly 0x07, seed 0, over body length, type, id, payload
//! ```
//!
//! Frames are built fresh for every transmission, retries and ACKs included,
//! and decoded from the body collected by
//! [`FrameAssembler`](crate::receiver::FrameAssembler).

use heapless::Vec;

use crate::consts::{
    MAX_BODY_LEN, MAX_FRAME_LEN_USIZE, MAX_PAYLOAD_USIZE, MIN_BODY_LEN, START_MARKER,
};
use crate::crc::{crc8, crc8_update};

/// Fixed-capacity payload storage.
pub type Payload = Vec<u8, MAX_PAYLOAD_USIZE>;

/// The kind of message a frame carries.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum MessageType {
    /// Discovery announcement; the payload is the sender's device id.
    Hello,
    /// Application payload.
    Data,
    /// Acknowledgment of the message id it carries; never has a payload.
    Ack,
    /// Any other type byte. Still acknowledged and delivered.
    Unknown(u8),
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Hello,
            1 => Self::Data,
            2 => Self::Ack,
            other => Self::Unknown(other),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::Hello => 0,
            MessageType::Data => 1,
            MessageType::Ack => 2,
            MessageType::Unknown(other) => other,
        }
    }
}

/// Reasons a received frame is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum FrameError {
    /// The body length byte is outside `3..=19`.
    #[error("invalid body length {0}")]
    InvalidLength(u8),
    /// The trailing CRC does not match the frame contents.
    #[error("CRC mismatch: computed {expected:#04x}, received {found:#04x}")]
    CrcMismatch {
        /// CRC computed over the received bytes.
        expected: u8,
        /// CRC carried by the frame.
        found: u8,
    },
    /// More body bytes arrived than the receive buffer holds.
    #[error("frame body overflowed the receive buffer")]
    Overflow,
}

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Frame {
    /// What the frame carries.
    pub kind: MessageType,
    /// Message id, used to pair ACKs with sends and to filter duplicates.
    pub msg_id: u8,
    /// Up to [`MAX_PAYLOAD_USIZE`] bytes.
    pub payload: Payload,
}

impl Frame {
    /// Builds a frame, truncating `payload` to [`MAX_PAYLOAD_USIZE`] bytes.
    pub fn new(kind: MessageType, msg_id: u8, payload: &[u8]) -> Self {
        Self {
            kind,
            msg_id,
            payload: payload.iter().take(MAX_PAYLOAD_USIZE).copied().collect(),
        }
    }

    /// A HELLO announcing `device_id`.
    pub fn hello(msg_id: u8, device_id: u8) -> Self {
        Self::new(MessageType::Hello, msg_id, &[device_id])
    }

    /// A DATA frame.
    pub fn data(msg_id: u8, payload: &[u8]) -> Self {
        Self::new(MessageType::Data, msg_id, payload)
    }

    /// An ACK for `msg_id`.
    pub fn ack(msg_id: u8) -> Self {
        Self::new(MessageType::Ack, msg_id, &[])
    }

    /// Body length as sent on the wire: type + id + payload + CRC.
    pub fn body_len(&self) -> u8 {
        // payload is bounded by MAX_PAYLOAD, so this cannot overflow
        2 + self.payload.len() as u8 + 1
    }

    /// CRC-8 over body length, type, id and payload.
    pub fn crc(&self) -> u8 {
        let mut crc = crc8_update(0, self.body_len());
        crc = crc8_update(crc, self.kind.into());
        crc = crc8_update(crc, self.msg_id);
        self.payload.iter().fold(crc, |crc, &b| crc8_update(crc, b))
    }

    /// Encodes the complete frame, START marker through CRC.
    pub fn encode(&self) -> Vec<u8, MAX_FRAME_LEN_USIZE> {
        let mut buf = Vec::new();
        let _ = buf.push(START_MARKER);
        let _ = buf.push(self.body_len());
        let _ = buf.push(self.kind.into());
        let _ = buf.push(self.msg_id);
        let _ = buf.extend_from_slice(&self.payload);
        let _ = buf.push(self.crc());
        buf
    }

    /// Decodes and validates a frame body: `[type, id, payload.., crc]`.
    ///
    /// The body length is taken from `body.len()`, which must match the length
    /// byte that preceded it on the wire. Bodies longer than 255 bytes report
    /// [`FrameError::InvalidLength`] with 255.
    pub fn decode_body(body: &[u8]) -> Result<Self, FrameError> {
        let len = body.len();
        if len < usize::from(MIN_BODY_LEN) || len > usize::from(MAX_BODY_LEN) {
            return Err(FrameError::InvalidLength(
                u8::try_from(len).unwrap_or(u8::MAX),
            ));
        }
        let (contents, trailer) = body.split_at(len - 1);
        let found = trailer[0];

        let expected = contents
            .iter()
            .fold(crc8_update(0, len as u8), |crc, &b| crc8_update(crc, b));
        if expected != found {
            return Err(FrameError::CrcMismatch { expected, found });
        }

        Ok(Self::new(contents[0].into(), contents[1], &contents[2..]))
    }
}

/// Checks whether `bytes` is exactly one complete frame with a valid CRC.
pub fn is_valid_encoding(bytes: &[u8]) -> bool {
    match bytes {
        [START_MARKER, len, body @ ..] => {
            (MIN_BODY_LEN..=MAX_BODY_LEN).contains(len)
                && usize::from(*len) == body.len()
                // the CRC of a body that ends in its own CRC is zero
                && crc8(&bytes[1..]) == 0
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_frame_layout() {
        let frame = Frame::data(7, &[0x10, 0x20]);
        let encoded = frame.encode();

        assert_eq!(encoded.len(), 7);
        assert_eq!(&encoded[..6], &[0xa5, 0x05, 0x01, 0x07, 0x10, 0x20]);
        assert_eq!(encoded[6], crc8(&[0x05, 0x01, 0x07, 0x10, 0x20]));
    }

    #[test]
    fn test_ack_frame_layout() {
        let encoded = Frame::ack(0x42).encode();
        assert_eq!(&encoded[..4], &[0xa5, 0x03, 0x02, 0x42]);
        assert_eq!(encoded[4], crc8(&[0x03, 0x02, 0x42]));
    }

    #[test]
    fn test_hello_carries_device_id() {
        let frame = Frame::hello(1, 0x2c);
        assert_eq!(frame.kind, MessageType::Hello);
        assert_eq!(&frame.payload[..], &[0x2c]);
        assert_eq!(frame.body_len(), 4);
    }

    #[test]
    fn test_payload_is_truncated() {
        let frame = Frame::data(1, &[0xee; 20]);
        assert_eq!(frame.payload.len(), 16);
        assert_eq!(frame.body_len(), 19);
        assert_eq!(frame.encode().len(), 21);
    }

    #[test]
    fn test_decode_body_round_trip() {
        let frame = Frame::data(200, b"hello");
        let encoded = frame.encode();
        let decoded = Frame::decode_body(&encoded[2..]).unwrap();
        assert_eq!(decoded, frame);
        assert!(is_valid_encoding(&encoded));
    }

    #[test]
    fn test_decode_body_rejects_bad_crc() {
        let mut encoded = Frame::ack(3).encode();
        let last = encoded.len() - 1;
        encoded[last] ^= 0x01;
        assert!(matches!(
            Frame::decode_body(&encoded[2..]),
            Err(FrameError::CrcMismatch { .. })
        ));
        assert!(!is_valid_encoding(&encoded));
    }

    #[test]
    fn test_decode_body_rejects_bad_length() {
        assert_eq!(
            Frame::decode_body(&[0x01, 0x02]),
            Err(FrameError::InvalidLength(2))
        );
        assert_eq!(
            Frame::decode_body(&[0u8; 20]),
            Err(FrameError::InvalidLength(20))
        );
    }

    #[test]
    fn test_decode_body_saturates_oversized_length() {
        assert_eq!(
            Frame::decode_body(&[0u8; 300]),
            Err(FrameError::InvalidLength(u8::MAX))
        );
    }

    #[test]
    fn test_single_bit_errors_are_detected() {
        let frame = Frame::data(0x5a, &[0x00, 0xff, 0x13, 0x37]);
        let encoded = frame.encode();
        // Every bit of type, id, payload and CRC
        for byte in 2..encoded.len() {
            for bit in 0..8 {
                let mut corrupted = encoded.clone();
                corrupted[byte] ^= 1 << bit;
                assert!(
                    matches!(
                        Frame::decode_body(&corrupted[2..]),
                        Err(FrameError::CrcMismatch { .. })
                    ),
                    "flip of byte {byte} bit {bit} went unnoticed"
                );
            }
        }
    }

    #[test]
    fn test_message_type_conversions() {
        assert_eq!(MessageType::from(0), MessageType::Hello);
        assert_eq!(MessageType::from(1), MessageType::Data);
        assert_eq!(MessageType::from(2), MessageType::Ack);
        assert_eq!(MessageType::from(9), MessageType::Unknown(9));
        assert_eq!(u8::from(MessageType::Unknown(9)), 9);
        assert_eq!(u8::from(MessageType::Ack), 2);
    }
}
