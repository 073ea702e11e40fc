//! # oneme-client
//!
//! Rust client for the oneme binary messaging protocol.
//!
//! Every message is a frame with a fixed 10-byte big-endian header and a
//! MessagePack body, LZ4-compressed once it reaches 32 bytes. Frames travel
//! over a single TLS 1.3 connection.
//!
//! ## Architecture
//!
//! - **Value codec** ([`codec`]): dynamic [`Value`] tree to MessagePack and back
//! - **Frame codec** ([`protocol`]): header packing, body compression, stream framing
//! - **Session** ([`session`]): TLS connect, writer task, receive loop
//!
//! ## Example
//!
//! ```ignore
//! use oneme_client::payloads::{AuthRequest, SessionInit};
//! use oneme_client::Session;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), oneme_client::OnemeError> {
//!     let session = Session::builder()
//!         .handler(|frame: oneme_client::Frame| println!("{}", frame.info()))
//!         .connect()
//!         .await?;
//!
//!     session.send(SessionInit::default().into_frame()?).await?;
//!     session.send(AuthRequest::new("+79111111111").into_frame()?).await?;
//!
//!     session.closed().await;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod compress;
pub mod error;
pub mod opcode;
pub mod payloads;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod writer;

pub use codec::Value;
pub use error::OnemeError;
pub use protocol::Frame;
pub use session::{FrameHandler, Session, SessionBuilder, SessionState};
