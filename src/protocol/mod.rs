//! Protocol module - wire format, framing, and frame types.
//!
//! - 10-byte header encoding/decoding
//! - Frame codec with LZ4 body compression
//! - Frame buffer for accumulating partial reads

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{Frame, FrameCodec, DEFAULT_MAX_BODY_SIZE};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    Header, COMMAND_REQUEST, COMPRESSION_THRESHOLD, DEFAULT_PROTOCOL_VERSION, HEADER_SIZE,
    MAX_BODY_LENGTH,
};
