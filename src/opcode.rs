//! Opcode names for diagnostics.
//!
//! The codec never validates opcodes; this table only labels the ones the
//! client itself sends so logs read better.

/// Keep-alive.
pub const PING: u16 = 1;
/// First frame of every session: device and client description.
pub const SESSION_INIT: u16 = 6;
/// Starts phone-number authentication.
pub const AUTH_REQUEST: u16 = 17;

const NAMES: &[(u16, &str)] = &[
    (PING, "PING"),
    (SESSION_INIT, "SESSION_INIT"),
    (AUTH_REQUEST, "AUTH_REQUEST"),
];

/// Symbolic name of an opcode, `"UNKNOWN"` if it is not in the table.
pub fn name_of(opcode: u16) -> &'static str {
    NAMES
        .iter()
        .find(|(code, _)| *code == opcode)
        .map_or("UNKNOWN", |(_, name)| name)
}
