//! Wire format encoding and decoding.
//!
//! Implements the 10-byte header:
//! ```text
//! ┌─────────┬─────────┬──────────┬──────────┬─────────────────────────┐
//! │ Version │ Command │ Sequence │ Opcode   │ Flags │ Body length     │
//! │ 1 byte  │ 1 byte  │ uint16 BE│ uint16 BE│ 8 bit │ 24 bit (BE word)│
//! └─────────┴─────────┴──────────┴──────────┴─────────────────────────┘
//! ```
//!
//! Flags and body length share one big-endian 32-bit word: flags in the top
//! byte, length in the low three. A non-zero flags byte marks a compressed body
//! and carries the approximate compression ratio.

/// Header size in bytes (fixed, exactly 10).
pub const HEADER_SIZE: usize = 10;

/// Protocol version written by this client.
pub const DEFAULT_PROTOCOL_VERSION: u8 = 10;

/// Command byte of every outbound frame.
pub const COMMAND_REQUEST: u8 = 0;

/// Largest body the 24-bit length field can describe.
pub const MAX_BODY_LENGTH: usize = 0x00FF_FFFF;

/// Bodies at least this long are offered to the compressor.
pub const COMPRESSION_THRESHOLD: usize = 32;

const LENGTH_MASK: u32 = 0x00FF_FFFF;

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Protocol version.
    pub version: u8,
    /// 0 on requests; responses and pushes carry the server's value.
    pub command: u8,
    /// Per-connection sequence number.
    pub sequence: u16,
    /// Message type.
    pub opcode: u16,
    /// 0 = uncompressed, otherwise the compression ratio estimate.
    pub flags: u8,
    /// On-wire body length (24 bits).
    pub length: u32,
}

impl Header {
    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use oneme_client::protocol::Header;
    ///
    /// let header = Header { version: 10, command: 0, sequence: 1, opcode: 6, flags: 0, length: 4 };
    /// let bytes = header.encode();
    /// assert_eq!(bytes, [10, 0, 0, 1, 0, 6, 0, 0, 0, 4]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (10 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0] = self.version;
        buf[1] = self.command;
        buf[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        buf[4..6].copy_from_slice(&self.opcode.to_be_bytes());
        buf[6..10].copy_from_slice(&self.packed_word().to_be_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        let word = u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]);
        Some(Self {
            version: buf[0],
            command: buf[1],
            sequence: u16::from_be_bytes([buf[2], buf[3]]),
            opcode: u16::from_be_bytes([buf[4], buf[5]]),
            flags: (word >> 24) as u8,
            length: word & LENGTH_MASK,
        })
    }

    /// Flags and length packed into one word.
    #[inline]
    pub fn packed_word(&self) -> u32 {
        (u32::from(self.flags) << 24) | (self.length & LENGTH_MASK)
    }

    /// Check if the body is compressed.
    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.flags != 0
    }

    /// Total encoded frame size (header + on-wire body).
    #[inline]
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.length as usize
    }
}
