//! A single operation within a trace.
//!
//! A span's start time is captured on creation. Until [`Span::end`] is
//! called the span is mutable: its status can be set, events added, and
//! errors recorded. `end` is idempotent; the first call fixes the end time
//! and finalizes the status, and everything after it is a silent no-op.
//! Cleanup paths may therefore close a span that an error path has already
//! closed without consequence.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use crate::common::KeyValue;
use crate::trace::{Status, TraceContext};
use crate::trace_context::SpanId;

/// Receives spans as they end.
///
/// The emission half of the tracing contract: storage and shipping are the
/// sink's concern, not this crate's. [`InMemorySpanSink`] is provided for
/// tests and debugging.
///
/// [`InMemorySpanSink`]: crate::trace::InMemorySpanSink
pub trait SpanSink: Send + Sync + fmt::Debug {
    /// Called exactly once per span, when it ends.
    fn on_end(&self, span: FinishedSpan);
}

/// A timestamped annotation on a span. Purely observational.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Event name.
    pub name: Cow<'static, str>,
    /// When the event was recorded.
    pub timestamp: SystemTime,
    /// Attributes describing the event.
    pub attributes: Vec<KeyValue>,
}

/// An error recorded on a span.
#[derive(Clone, Debug, PartialEq)]
pub struct Exception {
    /// The error's display message.
    pub message: String,
    /// When the error was recorded.
    pub timestamp: SystemTime,
}

/// Single operation within a trace.
///
/// Exclusively owned by the operation that created it; spans are never
/// shared across concurrent operations.
#[derive(Debug)]
pub struct Span {
    context: TraceContext,
    parent_span_id: Option<SpanId>,
    scope: Cow<'static, str>,
    name: Cow<'static, str>,
    start_time: SystemTime,
    end_time: Option<SystemTime>,
    status: Status,
    attributes: Vec<KeyValue>,
    events: Vec<Event>,
    exceptions: Vec<Exception>,
    sink: Option<Arc<dyn SpanSink>>,
}

impl Span {
    pub(crate) fn new(
        context: TraceContext,
        parent_span_id: Option<SpanId>,
        scope: Cow<'static, str>,
        name: Cow<'static, str>,
        sink: Option<Arc<dyn SpanSink>>,
    ) -> Self {
        Span {
            context,
            parent_span_id,
            scope,
            name,
            start_time: SystemTime::now(),
            end_time: None,
            status: Status::Unset,
            attributes: Vec::new(),
            events: Vec::new(),
            exceptions: Vec::new(),
            sink,
        }
    }

    /// The trace context of this span, for propagation and child creation.
    pub fn context(&self) -> TraceContext {
        self.context
    }

    /// Id of the parent span, if this span is not a root.
    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.parent_span_id
    }

    /// Operation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current status. Last write wins until the span ends.
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// When the span was started.
    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    /// When the span ended, if it has.
    pub fn end_time(&self) -> Option<SystemTime> {
        self.end_time
    }

    /// Events recorded so far.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Errors recorded so far.
    pub fn exceptions(&self) -> &[Exception] {
        &self.exceptions
    }

    /// Attributes set so far.
    pub fn attributes(&self) -> &[KeyValue] {
        &self.attributes
    }

    /// Returns `true` once [`Span::end`] has run.
    pub fn is_ended(&self) -> bool {
        self.end_time.is_some()
    }

    fn reject_if_ended(&self, operation: &'static str) -> bool {
        if self.is_ended() {
            tracing::debug!(span = %self.name, operation, "span already ended, ignoring");
            return true;
        }
        false
    }

    /// Set the span status. May be called any number of times before the
    /// span ends; the last write wins.
    pub fn set_status(&mut self, status: Status) {
        if self.reject_if_ended("set_status") {
            return;
        }
        self.status = status;
    }

    /// Record a failure on the span: appends the error to the exception
    /// list and sets the status to [`Status::Error`] with the same message,
    /// as one step.
    pub fn record_error(&mut self, err: &dyn fmt::Display) {
        if self.reject_if_ended("record_error") {
            return;
        }
        let message = err.to_string();
        self.exceptions.push(Exception {
            message: message.clone(),
            timestamp: SystemTime::now(),
        });
        self.status = Status::error(message);
    }

    /// Append a timestamped event.
    pub fn add_event(&mut self, name: impl Into<Cow<'static, str>>, attributes: Vec<KeyValue>) {
        if self.reject_if_ended("add_event") {
            return;
        }
        self.events.push(Event {
            name: name.into(),
            timestamp: SystemTime::now(),
            attributes,
        });
    }

    /// Set a single attribute.
    pub fn set_attribute(&mut self, attribute: KeyValue) {
        if self.reject_if_ended("set_attribute") {
            return;
        }
        self.attributes.push(attribute);
    }

    /// End the span.
    ///
    /// The first call fixes the end time, finalizes an `Unset` status to
    /// `Ok`, and delivers the span to the sink if one is configured. Later
    /// calls are no-ops: the end time never changes.
    pub fn end(&mut self) {
        if self.is_ended() {
            return;
        }
        self.end_time = Some(SystemTime::now());
        if self.status == Status::Unset {
            self.status = Status::Ok;
        }
        if let Some(sink) = self.sink.take() {
            sink.on_end(self.to_finished());
        }
    }

    fn to_finished(&self) -> FinishedSpan {
        FinishedSpan {
            context: self.context,
            parent_span_id: self.parent_span_id,
            scope: self.scope.clone(),
            name: self.name.clone(),
            start_time: self.start_time,
            end_time: self.end_time.unwrap_or(self.start_time),
            status: self.status.clone(),
            attributes: self.attributes.clone(),
            events: self.events.clone(),
            exceptions: self.exceptions.clone(),
        }
    }
}

/// Immutable record of an ended span, as delivered to a [`SpanSink`].
#[derive(Clone, Debug)]
pub struct FinishedSpan {
    /// Trace context the span ran under.
    pub context: TraceContext,
    /// Parent span id, `None` for roots.
    pub parent_span_id: Option<SpanId>,
    /// Instrumentation scope of the tracer that started the span.
    pub scope: Cow<'static, str>,
    /// Operation name.
    pub name: Cow<'static, str>,
    /// Span start time.
    pub start_time: SystemTime,
    /// Span end time.
    pub end_time: SystemTime,
    /// Final status. Never `Unset`.
    pub status: Status,
    /// Attributes set on the span.
    pub attributes: Vec<KeyValue>,
    /// Recorded events.
    pub events: Vec<Event>,
    /// Recorded errors.
    pub exceptions: Vec<Exception>,
}
