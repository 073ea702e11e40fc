//! Body compression.
//!
//! The frame codec only needs a compress/decompress capability; [`Compressor`]
//! describes it and [`Lz4Compressor`] is the implementation the server speaks
//! (raw LZ4 block format, no size prefix).
//!
//! # Example
//!
//! ```
//! use oneme_client::compress::{Compressor, Lz4Compressor};
//!
//! let lz4 = Lz4Compressor;
//! let data = vec![b'a'; 200];
//! let packed = lz4.compress(&data).unwrap();
//! let unpacked = lz4.decompress(&packed, 200).unwrap();
//! assert_eq!(unpacked, data);
//! ```

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Why a decompression attempt did not produce output.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecompressError {
    /// The destination capacity was too small for the inflated body.
    #[error("output buffer of {capacity} bytes is too small")]
    OutputTooSmall { capacity: usize },

    /// The compressed stream is corrupt.
    #[error("corrupt compressed data: {0}")]
    Corrupt(String),
}

/// Compression capability used by the frame codec.
pub trait Compressor: Send + Sync + 'static {
    /// Algorithm name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Compress `data`. An error or an empty result means "send uncompressed".
    fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>>;

    /// Decompress `data` into at most `capacity` bytes.
    fn decompress(&self, data: &[u8], capacity: usize) -> Result<Vec<u8>, DecompressError>;
}

/// A shared, type-erased compressor.
#[derive(Clone)]
pub struct BoxedCompressor(Arc<dyn Compressor>);

impl BoxedCompressor {
    pub fn new<C: Compressor>(compressor: C) -> Self {
        BoxedCompressor(Arc::new(compressor))
    }

    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    pub fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        self.0.compress(data)
    }

    pub fn decompress(&self, data: &[u8], capacity: usize) -> Result<Vec<u8>, DecompressError> {
        self.0.decompress(data, capacity)
    }
}

impl Default for BoxedCompressor {
    fn default() -> Self {
        BoxedCompressor::new(Lz4Compressor)
    }
}

impl fmt::Debug for BoxedCompressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BoxedCompressor").field(&self.name()).finish()
    }
}

/// LZ4 block compressor via `lz4_flex`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        Ok(lz4_flex::block::compress(data))
    }

    fn decompress(&self, data: &[u8], capacity: usize) -> Result<Vec<u8>, DecompressError> {
        let mut out = vec![0u8; capacity];
        match lz4_flex::block::decompress_into(data, &mut out) {
            Ok(written) => {
                out.truncate(written);
                Ok(out)
            }
            Err(lz4_flex::block::DecompressError::OutputTooSmall { .. }) => {
                Err(DecompressError::OutputTooSmall { capacity })
            }
            Err(e) => Err(DecompressError::Corrupt(e.to_string())),
        }
    }
}
