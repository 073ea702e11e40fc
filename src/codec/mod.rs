//! Codec module - structured payload encoding.
//!
//! - [`ValueCodec`] - dynamic [`Value`] trees to and from MessagePack
//! - [`MsgPackCodec`] - serde types via `rmp-serde` (`to_vec_named`, struct-as-map)
//!
//! Both produce the same wire format, so a body built from a typed payload
//! decodes cleanly into a [`Value`] and vice versa.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use oneme_client::codec::{MsgPackCodec, Value, ValueCodec};
//!
//! let body: BTreeMap<_, _> = [("type", "START_AUTH")].into_iter().collect();
//! let bytes = MsgPackCodec::encode(&body).unwrap();
//! let value = ValueCodec::decode(&bytes).unwrap();
//! assert_eq!(value.get("type").and_then(Value::as_str), Some("START_AUTH"));
//! ```

mod msgpack;
mod value;

pub use msgpack::MsgPackCodec;
pub use value::{Value, ValueCodec, MAX_DEPTH, WRAPPED_VALUE_KEY};
