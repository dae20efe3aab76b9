//! Trace-context propagation and metrics accounting for service operations.
//!
//! The recurring instrumentation pattern in a fleet of small services looks
//! the same everywhere: extract a trace context from inbound headers, open
//! a span around the business call, count the attempt, and on the way out
//! record success or failure, observe the duration, and close the span —
//! on every path, exactly once. This crate packages that pattern:
//!
//! * [`trace`] — spans, the [`Tracer`](trace::Tracer) that starts them, and
//!   the [`TraceContext`](trace::TraceContext) that links them across
//!   service boundaries;
//! * [`propagation`] — carrier traits and the W3C-style `traceparent`
//!   encoding;
//! * [`metrics`] — an explicitly constructed [`Registry`](metrics::Registry)
//!   of counters and histograms with a Prometheus exposition snapshot;
//! * [`instrument`] — the [`Operation`](instrument::Operation) wrapper tying
//!   the two together with guaranteed-cleanup accounting.
//!
//! # Example
//!
//! ```
//! use tracekit::instrument::Operation;
//! use tracekit::metrics::Registry;
//! use tracekit::trace::Tracer;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), tracekit::metrics::MetricError> {
//! let registry = Registry::new();
//! let tracer = Tracer::new("customer-service");
//! let create_customer = Operation::new(&registry, "create_customer")?;
//!
//! let result: Result<u64, String> = create_customer
//!     .run(&tracer, None, |_cx| async { Ok(42) })
//!     .await;
//!
//! assert_eq!(result, Ok(42));
//! assert!(registry
//!     .render()
//!     .contains("operation_success_total{operation=\"create_customer\"} 1"));
//! # Ok(())
//! # }
//! ```
//!
//! Instrumentation is a best-effort side channel: nothing in this crate
//! blocks or fails a business response. Extraction failures fall back to a
//! new root trace, and a business error always reaches the caller after
//! the accounting is done.

#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub
)]
#![cfg_attr(test, deny(warnings))]

mod common;
mod trace_context;

pub mod instrument;
pub mod metrics;
pub mod propagation;
pub mod trace;

pub use common::{KeyValue, Value};
