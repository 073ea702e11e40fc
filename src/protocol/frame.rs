//! Frame struct and the frame codec.
//!
//! [`Frame`] holds the header fields a caller cares about and the plain
//! (decompressed) body. [`FrameCodec`] turns frames into wire bytes and back,
//! compressing bodies of [`COMPRESSION_THRESHOLD`] bytes or more.
//!
//! # Example
//!
//! ```
//! use oneme_client::codec::Value;
//! use oneme_client::protocol::Frame;
//!
//! let frame = Frame::from_value(6, &Value::map([("a", 1)]));
//! let bytes = frame.to_bytes().unwrap();
//! assert_eq!(&bytes[..6], &[0x0A, 0x00, 0x00, 0x00, 0x00, 0x06]);
//!
//! let parsed = Frame::from_bytes(&bytes).unwrap();
//! assert_eq!(parsed.body(), frame.body());
//! ```

use std::borrow::Cow;

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{
    Header, COMMAND_REQUEST, COMPRESSION_THRESHOLD, DEFAULT_PROTOCOL_VERSION, HEADER_SIZE,
    MAX_BODY_LENGTH,
};
use crate::codec::{MsgPackCodec, Value, ValueCodec};
use crate::compress::{BoxedCompressor, DecompressError};
use crate::error::{OnemeError, Result};
use crate::opcode;

/// Default ceiling for a decompressed body (16 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Smallest buffer tried when regrowing an undersized decompression buffer.
const MIN_DECOMPRESS_CAPACITY: usize = 256;

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Protocol version.
    pub version: u8,
    /// Request marker (0) outbound, server-defined inbound.
    pub command: u8,
    /// Per-connection sequence number.
    pub sequence: u16,
    /// Message type.
    pub opcode: u16,
    /// Plain body bytes (an encoded [`Value`]).
    pub body: Bytes,
}

impl Frame {
    /// Create a request frame with default version, command 0 and sequence 0.
    pub fn new(opcode: u16, body: impl Into<Bytes>) -> Self {
        Self {
            version: DEFAULT_PROTOCOL_VERSION,
            command: COMMAND_REQUEST,
            sequence: 0,
            opcode,
            body: body.into(),
        }
    }

    /// Create a request frame whose body is an encoded [`Value`].
    pub fn from_value(opcode: u16, value: &Value) -> Self {
        Self::new(opcode, ValueCodec::encode(value))
    }

    /// Create a request frame from a serde payload (struct-as-map).
    pub fn from_payload<T: serde::Serialize + ?Sized>(opcode: u16, payload: &T) -> Result<Self> {
        Ok(Self::new(opcode, MsgPackCodec::encode(payload)?))
    }

    /// Set the protocol version.
    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// Set the sequence number.
    pub fn with_sequence(mut self, sequence: u16) -> Self {
        self.sequence = sequence;
        self
    }

    /// Set the command byte.
    pub fn with_command(mut self, command: u8) -> Self {
        self.command = command;
        self
    }

    /// Get a reference to the body bytes.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Get the body length.
    #[inline]
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Symbolic name of the opcode.
    #[inline]
    pub fn opcode_name(&self) -> &'static str {
        opcode::name_of(self.opcode)
    }

    /// One-line description for logs.
    pub fn info(&self) -> String {
        format!(
            "cmd={}, seq={}, opcode={}:{}",
            self.command,
            self.sequence,
            self.opcode,
            self.opcode_name()
        )
    }

    /// Decode the body as a map-shaped [`Value`]. An empty body is an empty map.
    pub fn decode_body(&self) -> Result<Value> {
        if self.body.is_empty() {
            return Ok(Value::Map(Vec::new()));
        }
        ValueCodec::decode(&self.body)
    }

    /// Decode the body into a serde type.
    pub fn decode_payload<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        MsgPackCodec::decode(&self.body)
    }

    /// Encode with the default LZ4 frame codec.
    pub fn to_bytes(&self) -> Result<Bytes> {
        FrameCodec::default().encode(self)
    }

    /// Decode with the default LZ4 frame codec.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        FrameCodec::default().decode(bytes)
    }
}

/// Serializes frames to wire bytes and back.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    compressor: BoxedCompressor,
    compression_threshold: usize,
    max_body_size: usize,
}

impl FrameCodec {
    /// Create a codec around a compressor with default limits.
    pub fn new(compressor: BoxedCompressor) -> Self {
        Self {
            compressor,
            compression_threshold: COMPRESSION_THRESHOLD,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Bodies shorter than this are never compressed.
    pub fn with_compression_threshold(mut self, threshold: usize) -> Self {
        self.compression_threshold = threshold;
        self
    }

    /// Ceiling for decompressed bodies.
    pub fn with_max_body_size(mut self, max: usize) -> Self {
        self.max_body_size = max.max(1);
        self
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Encode a frame: `version | command | sequence | opcode | flags<<24 | length | body`.
    ///
    /// # Errors
    ///
    /// Returns `BodyTooLarge` if the on-wire body exceeds the 24-bit length field.
    pub fn encode(&self, frame: &Frame) -> Result<Bytes> {
        let (flags, wire_body) = if frame.body.len() >= self.compression_threshold {
            self.compress(&frame.body)
        } else {
            (0, Cow::Borrowed(&frame.body[..]))
        };

        if wire_body.len() > MAX_BODY_LENGTH {
            return Err(OnemeError::BodyTooLarge {
                len: wire_body.len(),
                max: MAX_BODY_LENGTH,
            });
        }

        let header = Header {
            version: frame.version,
            command: frame.command,
            sequence: frame.sequence,
            opcode: frame.opcode,
            flags,
            length: wire_body.len() as u32,
        };

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + wire_body.len());
        buf.put_slice(&header.encode());
        buf.put_slice(&wire_body);
        Ok(buf.freeze())
    }

    /// Decode one frame from the start of `bytes`. Trailing bytes are ignored.
    ///
    /// # Errors
    ///
    /// - `FrameTooShort` with fewer than 10 bytes
    /// - `IncompleteBody` when the declared body is not all present
    /// - `DecompressionFailed` for a corrupt compressed body
    pub fn decode(&self, bytes: &[u8]) -> Result<Frame> {
        let header = Header::decode(bytes).ok_or(OnemeError::FrameTooShort { len: bytes.len() })?;
        let length = header.length as usize;
        let available = bytes.len() - HEADER_SIZE;
        if available < length {
            return Err(OnemeError::IncompleteBody {
                expected: length,
                available,
            });
        }
        let body = &bytes[HEADER_SIZE..HEADER_SIZE + length];
        self.finish_decode(header, body, || Bytes::copy_from_slice(body))
    }

    /// Decode a complete wire frame without copying an uncompressed body.
    pub fn decode_bytes(&self, wire: Bytes) -> Result<Frame> {
        let header = Header::decode(&wire).ok_or(OnemeError::FrameTooShort { len: wire.len() })?;
        let end = header.frame_len();
        if wire.len() < end {
            return Err(OnemeError::IncompleteBody {
                expected: header.length as usize,
                available: wire.len() - HEADER_SIZE,
            });
        }
        let body = wire.slice(HEADER_SIZE..end);
        self.finish_decode(header, &body, || body.clone())
    }

    fn finish_decode(
        &self,
        header: Header,
        body: &[u8],
        plain: impl FnOnce() -> Bytes,
    ) -> Result<Frame> {
        let body = if header.is_compressed() {
            self.decompress(body, header.flags)?
        } else {
            plain()
        };

        Ok(Frame {
            version: header.version,
            command: header.command,
            sequence: header.sequence,
            opcode: header.opcode,
            body,
        })
    }

    /// Returns the flags byte and the bytes to put on the wire.
    fn compress<'a>(&self, body: &'a [u8]) -> (u8, Cow<'a, [u8]>) {
        match self.compressor.compress(body) {
            Ok(packed) if !packed.is_empty() => {
                let ratio = body.len() / packed.len() + 1;
                let flags = u8::try_from(ratio).unwrap_or_else(|_| {
                    tracing::debug!(ratio, "compression ratio clamped to flags byte");
                    u8::MAX
                });
                (flags, Cow::Owned(packed))
            }
            Ok(_) => (0, Cow::Borrowed(body)),
            Err(e) => {
                tracing::debug!(error = %e, "compression failed, sending body uncompressed");
                (0, Cow::Borrowed(body))
            }
        }
    }

    /// Inflate a body. The flags byte only estimates the ratio, so the first
    /// buffer may be too small; it doubles until `max_body_size`.
    fn decompress(&self, body: &[u8], flags: u8) -> Result<Bytes> {
        let estimate = body.len().saturating_mul(usize::from(flags)).max(body.len());
        let mut capacity = estimate.min(self.max_body_size);

        loop {
            match self.compressor.decompress(body, capacity) {
                Ok(out) => return Ok(Bytes::from(out)),
                Err(DecompressError::OutputTooSmall { .. }) if capacity < self.max_body_size => {
                    let next = capacity
                        .saturating_mul(2)
                        .max(MIN_DECOMPRESS_CAPACITY)
                        .min(self.max_body_size);
                    tracing::warn!(
                        compressed = body.len(),
                        flags,
                        capacity,
                        next,
                        "decompression buffer undersized, growing"
                    );
                    capacity = next;
                }
                Err(DecompressError::OutputTooSmall { .. }) => {
                    return Err(OnemeError::DecompressionFailed(format!(
                        "body inflates past {} bytes",
                        self.max_body_size
                    )))
                }
                Err(e) => return Err(OnemeError::DecompressionFailed(e.to_string())),
            }
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(BoxedCompressor::default())
    }
}
