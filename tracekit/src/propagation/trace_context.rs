//! W3C-style trace context propagation.
//!
//! The whole context travels in one composite header:
//!
//! `traceparent: 00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`
//!
//! with four dash-separated fields: version, trace id, parent span id, and
//! trace flags, all lowercase hex. An absent or malformed header is treated
//! as "no parent"; extraction never raises.

use crate::propagation::{Extractor, Injector};
use crate::trace::TraceContext;
use crate::trace_context::{SpanId, TraceFlags, TraceId};

/// Name of the composite trace context header.
pub const TRACEPARENT_HEADER: &str = "traceparent";

const SUPPORTED_VERSION: u8 = 0;
const MAX_VERSION: u8 = 254;

/// Encodes a [`TraceContext`] into carriers and decodes it back out.
#[derive(Clone, Debug, Default)]
pub struct TraceContextPropagator {
    _private: (),
}

/// `s` is exactly `len` lowercase hex digits.
fn is_lower_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

impl TraceContextPropagator {
    /// Create a new propagator.
    pub fn new() -> Self {
        TraceContextPropagator { _private: () }
    }

    /// Write `context` into the carrier, if it is valid. Invalid contexts
    /// are not propagated.
    pub fn inject(&self, context: &TraceContext, carrier: &mut dyn Injector) {
        if !context.is_valid() {
            return;
        }
        let header_value = format!(
            "{:02x}-{}-{}-{:02x}",
            SUPPORTED_VERSION,
            context.trace_id(),
            context.span_id(),
            context.trace_flags().sampled_only(),
        );
        carrier.set(TRACEPARENT_HEADER, header_value);
    }

    /// Parse a context out of the carrier.
    ///
    /// Returns `None` when the header is absent or malformed in any way:
    /// wrong field count, bad version, uppercase or wrong-length ids,
    /// all-zero ids, or undefined flag bits for version 0.
    pub fn extract(&self, carrier: &dyn Extractor) -> Option<TraceContext> {
        let header_value = carrier.get(TRACEPARENT_HEADER)?.trim();
        match self.parse_traceparent(header_value) {
            Some(context) => Some(context),
            None => {
                tracing::debug!(header = header_value, "rejected malformed traceparent");
                None
            }
        }
    }

    fn parse_traceparent(&self, header_value: &str) -> Option<TraceContext> {
        let parts = header_value.split_terminator('-').collect::<Vec<&str>>();
        if parts.len() < 4 {
            return None;
        }

        if !is_lower_hex(parts[0], 2) {
            return None;
        }
        let version = u8::from_str_radix(parts[0], 16).ok()?;
        if version > MAX_VERSION || (version == 0 && parts.len() != 4) {
            return None;
        }

        if !is_lower_hex(parts[1], 32) || !is_lower_hex(parts[2], 16) {
            return None;
        }
        let trace_id = TraceId::from_hex(parts[1]).ok()?;
        let span_id = SpanId::from_hex(parts[2]).ok()?;

        if !is_lower_hex(parts[3], 2) {
            return None;
        }
        let opts = u8::from_str_radix(parts[3], 16).ok()?;
        if version == 0 && opts > 2 {
            return None;
        }
        // Clear everything but the sampled bit.
        let trace_flags = TraceFlags::new(opts).sampled_only();

        let context = TraceContext::new(trace_id, span_id, trace_flags);
        context.is_valid().then_some(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn propagator() -> TraceContextPropagator {
        TraceContextPropagator::new()
    }

    fn carrier_with(header: &str) -> HashMap<String, String> {
        let mut carrier = HashMap::new();
        carrier.insert(TRACEPARENT_HEADER.to_string(), header.to_string());
        carrier
    }

    fn context(trace_id: u128, span_id: u64, flags: TraceFlags) -> TraceContext {
        TraceContext::new(TraceId::from(trace_id), SpanId::from(span_id), flags)
    }

    #[test]
    fn extract_valid_traceparent() {
        let cases = vec![
            (
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00",
                context(
                    0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736,
                    0xf0_67aa_0ba9_02b7,
                    TraceFlags::NOT_SAMPLED,
                ),
            ),
            (
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
                context(
                    0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736,
                    0xf0_67aa_0ba9_02b7,
                    TraceFlags::SAMPLED,
                ),
            ),
            // Future version with extra fields; unused flag bits are cleared.
            (
                "02-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-09-extra",
                context(
                    0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736,
                    0xf0_67aa_0ba9_02b7,
                    TraceFlags::SAMPLED,
                ),
            ),
        ];

        for (header, expected) in cases {
            assert_eq!(
                propagator().extract(&carrier_with(header)),
                Some(expected),
                "{header}"
            );
        }
    }

    #[test]
    fn extract_rejects_malformed_traceparent() {
        let cases = vec![
            ("", "empty"),
            ("   ", "whitespace only"),
            ("00", "too few fields"),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7", "missing flags"),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-", "empty flags"),
            ("0000-00000000000000000000000000000000-0000000000000000-01", "wrong version length"),
            ("qw-00000000000000000000000000000000-0000000000000000-01", "bogus version"),
            ("ff-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01", "forbidden version"),
            ("00-ab00000000000000000000000000000000-cd00000000000000-01", "trace id too long"),
            ("00-ab0000000000000000000000000000-cd00000000000000-01", "trace id too short"),
            ("00-qw000000000000000000000000000000-cd00000000000000-01", "bogus trace id"),
            ("00-AB000000000000000000000000000000-cd00000000000000-01", "uppercase trace id"),
            ("00-ab000000000000000000000000000000-cd0000000000000000-01", "span id too long"),
            ("00-ab000000000000000000000000000000-CD00000000000000-01", "uppercase span id"),
            ("00-ab000000000000000000000000000000-cd00000000000000-0100", "flags too long"),
            ("00-ab000000000000000000000000000000-cd00000000000000-qw", "bogus flags"),
            ("00-ab000000000000000000000000000000-cd00000000000000-09", "undefined flag bits"),
            ("00-00000000000000000000000000000000-0000000000000000-01", "all-zero ids"),
            ("00--00", "missing ids"),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736--01", "missing span id"),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01-extra", "version 0 with extra field"),
        ];

        for (header, reason) in cases {
            assert_eq!(
                propagator().extract(&carrier_with(header)),
                None,
                "{reason}"
            );
        }
    }

    #[test]
    fn extract_missing_header_is_none() {
        let carrier: HashMap<String, String> = HashMap::new();
        assert_eq!(propagator().extract(&carrier), None);

        let mut other = HashMap::new();
        other.insert("content-type".to_string(), "application/json".to_string());
        assert_eq!(propagator().extract(&other), None);
    }

    #[test]
    fn extract_tolerates_oversized_input() {
        let header = format!("00-{}-{}-01", "a".repeat(1_000_000), "b".repeat(1_000_000));
        assert_eq!(propagator().extract(&carrier_with(&header)), None);
    }

    #[test]
    fn inject_writes_canonical_header() {
        let cx = context(
            0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736,
            0xf0_67aa_0ba9_02b7,
            TraceFlags::SAMPLED,
        );
        let mut carrier = HashMap::new();
        propagator().inject(&cx, &mut carrier);
        assert_eq!(
            Extractor::get(&carrier, TRACEPARENT_HEADER),
            Some("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")
        );
    }

    #[test]
    fn inject_masks_undefined_flag_bits() {
        let cx = context(1, 1, TraceFlags::new(0xff));
        let mut carrier = HashMap::new();
        propagator().inject(&cx, &mut carrier);
        assert_eq!(
            Extractor::get(&carrier, TRACEPARENT_HEADER),
            Some("00-00000000000000000000000000000001-0000000000000001-01")
        );
    }

    #[test]
    fn inject_skips_invalid_context() {
        let cx = context(0, 0, TraceFlags::SAMPLED);
        let mut carrier: HashMap<String, String> = HashMap::new();
        propagator().inject(&cx, &mut carrier);
        assert!(carrier.is_empty());
    }

    #[test]
    fn extract_inject_round_trip() {
        let cx = context(
            0x0af7_6519_16cd_43dd_8448_eb21_1c80_319c,
            0xb7ad_6b71_6920_3331,
            TraceFlags::SAMPLED,
        );
        let mut carrier = HashMap::new();
        propagator().inject(&cx, &mut carrier);
        assert_eq!(propagator().extract(&carrier), Some(cx));
    }
}
