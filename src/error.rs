//! Error types for oneme-client.

use thiserror::Error;

/// Main error type for all oneme operations.
#[derive(Debug, Error)]
pub enum OnemeError {
    /// DNS resolution, TCP connect, connect timeout or TLS handshake failed.
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        /// `host:port` that was being dialed.
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Fewer than 10 header bytes were supplied.
    #[error("frame too short: {len} bytes, header needs 10")]
    FrameTooShort { len: usize },

    /// The header declares more body bytes than were supplied.
    #[error("incomplete body: need {expected} bytes, have {available}")]
    IncompleteBody { expected: usize, available: usize },

    /// Compressed body is corrupt or inflates past the configured ceiling.
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    /// Body does not fit the 24-bit length field or the configured maximum.
    #[error("body of {len} bytes exceeds maximum {max}")]
    BodyTooLarge { len: usize, max: usize },

    /// Structured value bytes are truncated or tag-inconsistent.
    #[error("malformed value: {0}")]
    MalformedValue(String),

    /// The TLS client configuration could not be built.
    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),

    /// I/O error on the live socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MsgPack serialization error from a typed payload.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error into a typed payload.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Session is not open (never connected, closed, or its writer went away).
    #[error("Connection closed")]
    ConnectionClosed,
}

impl OnemeError {
    /// Whether this error means the transport can no longer be used.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            OnemeError::Io(_) | OnemeError::ConnectFailed { .. } | OnemeError::ConnectionClosed
        )
    }
}

/// Result type alias using OnemeError.
pub type Result<T> = std::result::Result<T, OnemeError>;
