//! Frame buffer for accumulating partial reads.
//!
//! A TLS stream hands back arbitrary slices: half a header, a frame and a bit,
//! three frames at once. The buffer keeps whatever has arrived in a single
//! `BytesMut` and cuts it into complete wire frames with a two-state machine:
//! - `AwaitingHeader`: need 10 bytes to learn the body length
//! - `AwaitingBody`: header known, need `10 + length` bytes in total
//!
//! Cut frames are still in wire form; [`FrameCodec`](super::FrameCodec) decodes them.
//!
//! # Example
//!
//! ```
//! use oneme_client::protocol::{Frame, FrameBuffer};
//!
//! let wire = Frame::new(1, &b"hi"[..]).to_bytes().unwrap();
//! let mut buffer = FrameBuffer::new();
//!
//! assert!(buffer.push(&wire[..4]).unwrap().is_empty());
//! let frames = buffer.push(&wire[4..]).unwrap();
//! assert_eq!(frames.len(), 1);
//! ```

use bytes::{Bytes, BytesMut};

use super::frame::DEFAULT_MAX_BODY_SIZE;
use super::wire_format::{Header, HEADER_SIZE};
use crate::error::{OnemeError, Result};

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for a complete header.
    AwaitingHeader,
    /// Header parsed, waiting until the whole frame is buffered.
    AwaitingBody { frame_len: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Largest on-wire body accepted.
    max_body_size: usize,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    ///
    /// Default capacity: 8KB, max body: 16 MiB.
    pub fn new() -> Self {
        Self::with_capacity_and_max_body(8 * 1024, DEFAULT_MAX_BODY_SIZE)
    }

    /// Create a new frame buffer with custom capacity and max body size.
    pub fn with_capacity_and_max_body(capacity: usize, max_body_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            state: State::AwaitingHeader,
            max_body_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Returns complete wire frames (header included), possibly none.
    /// Leftover bytes stay buffered for the next push.
    ///
    /// # Errors
    ///
    /// Returns `BodyTooLarge` if a header declares a body above the limit.
    /// The stream cannot be resynchronized after that.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Try to extract a single frame from the buffer.
    fn try_extract_one(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.state {
                State::AwaitingHeader => {
                    let Some(header) = Header::decode(&self.buffer) else {
                        return Ok(None);
                    };

                    let length = header.length as usize;
                    if length > self.max_body_size {
                        return Err(OnemeError::BodyTooLarge {
                            len: length,
                            max: self.max_body_size,
                        });
                    }

                    let frame_len = HEADER_SIZE + length;
                    if self.buffer.capacity() < frame_len {
                        self.buffer.reserve(frame_len - self.buffer.len());
                    }
                    self.state = State::AwaitingBody { frame_len };
                }

                State::AwaitingBody { frame_len } => {
                    if self.buffer.len() < frame_len {
                        return Ok(None);
                    }

                    let frame = self.buffer.split_to(frame_len).freeze();
                    self.state = State::AwaitingHeader;
                    return Ok(Some(frame));
                }
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::AwaitingHeader => "AwaitingHeader",
            State::AwaitingBody { .. } => "AwaitingBody",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Frame;

    fn wire(opcode: u16, sequence: u16, body: &[u8]) -> Vec<u8> {
        Frame::new(opcode, body.to_vec())
            .with_sequence(sequence)
            .to_bytes()
            .unwrap()
            .to_vec()
    }

    fn decode(frame: &Bytes) -> Frame {
        Frame::from_bytes(frame).unwrap()
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&wire(1, 42, b"hello")).unwrap();

        assert_eq!(frames.len(), 1);
        let frame = decode(&frames[0]);
        assert_eq!(frame.opcode, 1);
        assert_eq!(frame.sequence, 42);
        assert_eq!(frame.body(), b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_two_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();

        let mut combined = wire(1, 1, b"first");
        combined.extend(wire(2, 2, b"second"));

        let frames = buffer.push(&combined).unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(decode(&frames[0]).opcode, 1);
        assert_eq!(decode(&frames[1]).opcode, 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_header_then_body() {
        let mut buffer = FrameBuffer::new();
        let bytes = wire(7, 0, b"split across reads");

        let frames = buffer.push(&bytes[..HEADER_SIZE]).unwrap();
        assert!(frames.is_empty());
        assert_eq!(buffer.state_name(), "AwaitingBody");

        let frames = buffer.push(&bytes[HEADER_SIZE..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(decode(&frames[0]).body(), b"split across reads");
        assert_eq!(buffer.state_name(), "AwaitingHeader");
    }

    #[test]
    fn test_fragmented_header() {
        let mut buffer = FrameBuffer::new();
        let bytes = wire(1, 0, b"test");

        let frames = buffer.push(&bytes[..5]).unwrap();
        assert!(frames.is_empty());
        assert_eq!(buffer.state_name(), "AwaitingHeader");

        let frames = buffer.push(&bytes[5..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_empty_body() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&wire(1, 0, b"")).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), HEADER_SIZE);
        assert!(decode(&frames[0]).body().is_empty());
    }

    #[test]
    fn test_compressed_frames_are_cut_on_wire_length() {
        let mut buffer = FrameBuffer::new();
        let body = vec![0x11u8; 4096];
        let mut bytes = wire(3, 0, &body);
        let first_len = bytes.len();
        bytes.extend(wire(4, 1, b"tail"));

        let frames = buffer.push(&bytes).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), first_len);
        assert_eq!(decode(&frames[0]).body(), &body[..]);
        assert_eq!(decode(&frames[1]).body(), b"tail");
    }

    #[test]
    fn test_max_body_validation() {
        let mut buffer = FrameBuffer::with_capacity_and_max_body(64, 100);
        let header = Header {
            version: 10,
            command: 1,
            sequence: 0,
            opcode: 1,
            flags: 0,
            length: 1000,
        };

        let result = buffer.push(&header.encode());
        assert!(matches!(
            result,
            Err(OnemeError::BodyTooLarge { len: 1000, max: 100 })
        ));
    }

    #[test]
    fn test_mixed_complete_and_partial() {
        let mut buffer = FrameBuffer::new();

        let frame2 = wire(2, 2, b"second");
        let mut data = wire(1, 1, b"first");
        data.extend_from_slice(&frame2[..5]);

        let frames = buffer.push(&data).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(decode(&frames[0]).opcode, 1);
        assert_eq!(buffer.len(), 5);

        let frames = buffer.push(&frame2[5..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(decode(&frames[0]).opcode, 2);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let bytes = wire(1, 42, b"hi");

        let mut all_frames = Vec::new();
        for byte in &bytes {
            all_frames.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all_frames.len(), 1);
        assert_eq!(decode(&all_frames[0]).body(), b"hi");
    }
}
