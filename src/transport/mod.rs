//! Transport module - TCP connect and TLS 1.3 upgrade.

mod tls;

pub use tls::{connect_tcp, default_tls_config, handshake, tls13_config, SessionStream};
