//! MsgPack codec for serde-typed payloads using `rmp-serde`.
//!
//! Always uses `to_vec_named`: the server expects every body to be a map, so
//! structs must serialize with their field names rather than positionally.
//!
//! # Example
//!
//! ```
//! use oneme_client::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Ping {
//!     interactive: bool,
//! }
//!
//! let encoded = MsgPackCodec::encode(&Ping { interactive: true }).unwrap();
//! let decoded: Ping = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, Ping { interactive: true });
//! ```

use super::value::{Value, ValueCodec};
use crate::error::Result;

/// MessagePack codec for structured data with a serde model.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes with struct-as-map layout.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Serialize a typed payload and reopen it as a dynamic [`Value`].
    pub fn to_value<T: serde::Serialize + ?Sized>(value: &T) -> Result<Value> {
        ValueCodec::decode_raw(&Self::encode(value)?)
    }
}
