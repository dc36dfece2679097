//! Request identifiers.
//!
//! Every dispatched call carries a ULID [`RequestId`]. HTTP callers may
//! supply their own through the `x-request-id` header; a value that does
//! not parse as a ULID is replaced with a fresh one.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Header used to propagate request ids.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct RequestId(Ulid);

impl RequestId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Reuse a caller-supplied id when it parses, otherwise mint one.
    pub fn from_header_or_new(header_value: Option<&str>) -> Self {
        header_value
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or_default()
    }

    /// Milliseconds since the epoch at which the id was minted.
    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for RequestId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid request id '{s}'")))
    }
}
