//! Trace identifiers and flags.
//!
//! A position within a distributed trace is the pair of a [`TraceId`] and the
//! id of the currently active span. Both are random, fixed-width values whose
//! wire form is lowercase hex, as in the W3C `traceparent` header.

use std::fmt;
use std::num::ParseIntError;

/// Flags carried alongside a trace context.
///
/// Only the low `sampled` bit is defined; all other bits are cleared on
/// extraction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TraceFlags(u8);

impl TraceFlags {
    /// Flags with the `sampled` bit unset.
    pub const NOT_SAMPLED: TraceFlags = TraceFlags(0x00);

    /// Flags with the `sampled` bit set.
    pub const SAMPLED: TraceFlags = TraceFlags(0x01);

    /// Construct flags from their raw byte.
    pub const fn new(flags: u8) -> Self {
        TraceFlags(flags)
    }

    /// Returns `true` if the `sampled` bit is set.
    pub fn is_sampled(&self) -> bool {
        self.0 & Self::SAMPLED.0 != 0
    }

    /// Returns a copy with all bits other than `sampled` cleared.
    pub fn sampled_only(&self) -> Self {
        TraceFlags(self.0 & Self::SAMPLED.0)
    }

    /// Returns the flags as a `u8`.
    pub fn to_u8(self) -> u8 {
        self.0
    }
}

impl fmt::LowerHex for TraceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// A 16-byte value identifying one trace.
///
/// Valid ids contain at least one non-zero byte.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(u128);

impl TraceId {
    /// The invalid, all-zero trace id.
    pub const INVALID: TraceId = TraceId(0);

    /// Converts a base 16 string to a trace id.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u128::from_str_radix(hex, 16).map(TraceId)
    }

    /// Returns the id as its raw `u128`.
    pub const fn to_u128(self) -> u128 {
        self.0
    }
}

impl From<u128> for TraceId {
    fn from(value: u128) -> Self {
        TraceId(value)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:032x}", self.0))
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:032x}", self.0))
    }
}

/// An 8-byte value identifying one span within a trace.
///
/// Valid ids contain at least one non-zero byte.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(u64);

impl SpanId {
    /// The invalid, all-zero span id.
    pub const INVALID: SpanId = SpanId(0);

    /// Converts a base 16 string to a span id.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u64::from_str_radix(hex, 16).map(SpanId)
    }

    /// Returns the id as its raw `u64`.
    pub const fn to_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for SpanId {
    fn from(value: u64) -> Self {
        SpanId(value)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}
