// crates/responder-core/src/core/time.rs
// ============================================================================
// Module: Responder Time Model
// Description: Canonical UTC timestamps for runs, steps, approvals, and audit.
// Purpose: Provide millisecond-precision RFC 3339 time values with stable wire forms.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! All Responder timestamps are UTC with millisecond precision and serialize
//! as RFC 3339 strings. Sub-millisecond components are truncated at
//! construction so round-trips through persistence are byte-stable. Duration
//! and TTL arithmetic is saturating; time never wraps.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de::Error as DeError;
use time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical UTC timestamp with millisecond precision.
///
/// # Invariants
/// - Always UTC; construction truncates below-millisecond components.
/// - Serializes as an RFC 3339 string with millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    /// Returns the current wall-clock time truncated to milliseconds.
    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(OffsetDateTime::now_utc())
    }

    /// Builds a timestamp from a datetime, truncating to milliseconds.
    #[must_use]
    pub fn from_datetime(value: OffsetDateTime) -> Self {
        let millis = value.unix_timestamp_nanos() / 1_000_000;
        OffsetDateTime::from_unix_timestamp_nanos(millis * 1_000_000).map_or(Self(value), Self)
    }

    /// Builds a timestamp from unix epoch milliseconds.
    #[must_use]
    pub fn from_unix_millis(millis: i64) -> Option<Self> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok().map(Self)
    }

    /// Parses an RFC 3339 timestamp string.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        OffsetDateTime::parse(value, &Rfc3339).ok().map(Self::from_datetime)
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub fn unix_millis(&self) -> i64 {
        i64::try_from(self.0.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
    }

    /// Returns the timestamp shifted forward by whole seconds (saturating).
    #[must_use]
    pub fn plus_seconds(&self, seconds: u64) -> Self {
        let capped = i64::try_from(seconds).unwrap_or(i64::MAX);
        self.0.checked_add(Duration::seconds(capped)).map_or(*self, Self)
    }

    /// Returns the non-negative wall-clock distance to `later` in milliseconds.
    #[must_use]
    pub fn millis_until(&self, later: &Self) -> u64 {
        let delta = later.unix_millis().saturating_sub(self.unix_millis());
        u64::try_from(delta).unwrap_or(0)
    }

    /// Renders the timestamp as an RFC 3339 string with millisecond precision.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.format(&Rfc3339).unwrap_or_else(|_| String::from("1970-01-01T00:00:00.000Z"))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw)
            .ok_or_else(|| DeError::custom(format!("invalid rfc3339 timestamp: {raw}")))
    }
}
