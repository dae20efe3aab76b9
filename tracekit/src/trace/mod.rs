//! Spans, the tracer that starts them, and the context that links them.
//!
//! A [`Span`] records one traced operation: its name, timing, outcome, and
//! any events or errors observed along the way. The [`Tracer`] is the factory
//! for spans; it generates fresh ids for root spans and derives child ids
//! when a parent [`TraceContext`] was extracted from an inbound carrier.

mod in_memory;
mod span;
mod tracer;

pub use in_memory::InMemorySpanSink;
pub use span::{Event, Exception, FinishedSpan, Span, SpanSink};
pub use tracer::{IdGenerator, RandomIdGenerator, Tracer};

pub use crate::trace_context::{SpanId, TraceFlags, TraceId};

use std::borrow::Cow;

/// The outcome recorded on a [`Span`].
///
/// A span left `Unset` at close time is treated as `Ok`.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Status {
    /// Default status, finalized to `Ok` when the span ends.
    #[default]
    Unset,
    /// The operation completed successfully.
    Ok,
    /// The operation failed.
    Error {
        /// Description of the failure.
        description: Cow<'static, str>,
    },
}

impl Status {
    /// Create an error status with the given description.
    pub fn error(description: impl Into<Cow<'static, str>>) -> Self {
        Status::Error {
            description: description.into(),
        }
    }
}

/// The position of an active span within a distributed trace.
///
/// This is the pair that crosses service boundaries: the trace id shared by
/// every span in the request chain, and the id of the span that is active at
/// the point of propagation. It is `Copy` so it can be handed to nested
/// operations without ceremony.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TraceContext {
    trace_id: TraceId,
    span_id: SpanId,
    trace_flags: TraceFlags,
}

impl TraceContext {
    /// Construct a context from its parts.
    pub fn new(trace_id: TraceId, span_id: SpanId, trace_flags: TraceFlags) -> Self {
        TraceContext {
            trace_id,
            span_id,
            trace_flags,
        }
    }

    /// The trace this context belongs to.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The active span at the point this context was captured.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// Flags associated with the trace.
    pub fn trace_flags(&self) -> TraceFlags {
        self.trace_flags
    }

    /// Both ids contain at least one non-zero byte.
    pub fn is_valid(&self) -> bool {
        self.trace_id != TraceId::INVALID && self.span_id != SpanId::INVALID
    }
}
