//! Carrier interfaces for moving trace context across service boundaries.
//!
//! A carrier is the wire form of a trace context: a flat string-keyed
//! mapping, typically HTTP headers. [`Injector`] writes into a carrier and
//! [`Extractor`] reads from one; both treat keys case-insensitively. A
//! carrier lives only for the duration of one request/response boundary.

mod trace_context;

pub use trace_context::{TraceContextPropagator, TRACEPARENT_HEADER};

use std::collections::HashMap;

/// Write half of a carrier.
pub trait Injector {
    /// Add a key and value to the underlying data.
    fn set(&mut self, key: &str, value: String);
}

/// Read half of a carrier. Lookups are case-insensitive.
pub trait Extractor {
    /// Get a value for a key from the underlying data.
    fn get(&self, key: &str) -> Option<&str>;

    /// Collect all keys from the underlying data.
    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Keys are stored lowercased so lookups stay case-insensitive.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(|v| v.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        self.keys().map(|k| k.as_str()).collect()
    }
}
