//! Textual log record format shared by the gate and the log analyzer.
//!
//! The gate writes one record per request as the log message; the analyzer
//! recovers attacker statistics from those messages. Changing a tag here
//! changes both sides at once.
//!
//! Request fields are percent-encoded when rendered, so a record never holds
//! whitespace, quotes or control characters taken from the request. A client
//! cannot end a record early or forge a second one through its path.

use std::fmt;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

/// Request rejected by the classifier (answered 404).
pub const TAG_BLOCKED: &str = "BLOCKED:";
/// Request rejected by the rate limiter (answered 429).
pub const TAG_RATE_LIMITED: &str = "RATE LIMITED:";
/// Request with a method the handlers do not serve (answered 405).
pub const TAG_METHOD_NOT_ALLOWED: &str = "METHOD NOT ALLOWED:";
/// Request forwarded to the handler.
pub const TAG_ALLOWED: &str = "ALLOWED:";

/// Bytes encoded in record fields. Non-ASCII is always encoded.
const FIELD_ENCODE_SET: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'\\');

/// One gate log record: `<TAG> <ip> - <METHOD> <path>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateRecord<'a> {
    /// One of the `TAG_*` constants.
    pub tag: &'static str,
    /// Client IP as received.
    pub ip: &'a str,
    /// Request method.
    pub method: &'a str,
    /// Raw request path.
    pub path: &'a str,
}

impl fmt::Display for GateRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} - {} {}",
            self.tag,
            utf8_percent_encode(self.ip, FIELD_ENCODE_SET),
            utf8_percent_encode(self.method, FIELD_ENCODE_SET),
            utf8_percent_encode(self.path, FIELD_ENCODE_SET),
        )
    }
}
