//! Strongly-typed identifiers used across the ledger.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of an account.
///
/// Unlike most event-sourced systems in this family, account ids are
/// **caller-supplied opaque strings** (e.g. `"JohnDoe"`), not
/// server-generated UUIDs — `create` is the operation that reserves one.
/// Uniqueness is enforced by the id registry (`EventLog::add_id`), not by
/// this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<String> for AccountId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Server-assigned, totally ordered position of an event within a stream.
///
/// Modeled after a Redis stream entry id: a millisecond timestamp paired
/// with a per-millisecond sequence counter, rendered as `"<ms>-<seq>"`.
/// Field declaration order (`millis` before `sequence`) makes the derived
/// `Ord` match the log's own ordering.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StreamId {
    millis: u64,
    sequence: u64,
}

impl StreamId {
    /// The ordering token that precedes every real entry ever assigned by
    /// the log. Used as the starting point for "rehydrate from scratch".
    pub const EPOCH: StreamId = StreamId {
        millis: 0,
        sequence: 0,
    };

    pub fn new(millis: u64, sequence: u64) -> Self {
        Self { millis, sequence }
    }

    pub fn millis(&self) -> u64 {
        self.millis
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_epoch(&self) -> bool {
        *self == Self::EPOCH
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.millis, self.sequence)
    }
}

impl FromStr for StreamId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (millis, sequence) = s
            .split_once('-')
            .ok_or_else(|| DomainError::Backend(format!("malformed stream id: {s}")))?;
        let millis: u64 = millis
            .parse()
            .map_err(|_| DomainError::Backend(format!("malformed stream id: {s}")))?;
        let sequence: u64 = sequence
            .parse()
            .map_err(|_| DomainError::Backend(format!("malformed stream id: {s}")))?;
        Ok(Self { millis, sequence })
    }
}

impl Serialize for StreamId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StreamId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_id_round_trips_through_display_and_parse() {
        let id = StreamId::new(1_700_000_000_000, 3);
        let rendered = id.to_string();
        assert_eq!(rendered, "1700000000000-3");
        assert_eq!(rendered.parse::<StreamId>().unwrap(), id);
    }

    #[test]
    fn stream_id_ordering_matches_arrival_order() {
        let a = StreamId::new(10, 5);
        let b = StreamId::new(10, 6);
        let c = StreamId::new(11, 0);
        assert!(a < b);
        assert!(b < c);
        assert!(StreamId::EPOCH < a);
    }
}
