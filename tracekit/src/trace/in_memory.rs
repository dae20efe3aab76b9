//! An in-memory span sink for tests and debugging.

use std::sync::{Arc, Mutex};

use crate::trace::{FinishedSpan, SpanSink};

/// A [`SpanSink`] that stores finished spans in memory.
///
/// Useful for asserting on span outcomes in tests:
///
/// ```
/// use std::sync::Arc;
/// use tracekit::trace::{InMemorySpanSink, Tracer};
///
/// let sink = Arc::new(InMemorySpanSink::default());
/// let tracer = Tracer::new("test").with_sink(sink.clone());
///
/// let mut span = tracer.start_span("op");
/// span.end();
///
/// assert_eq!(sink.finished_spans().len(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanSink {
    spans: Arc<Mutex<Vec<FinishedSpan>>>,
}

impl InMemorySpanSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All spans finished so far, in end order.
    pub fn finished_spans(&self) -> Vec<FinishedSpan> {
        self.spans
            .lock()
            .map(|spans| spans.clone())
            .unwrap_or_default()
    }

    /// Drop all stored spans.
    pub fn reset(&self) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.clear();
        }
    }
}

impl SpanSink for InMemorySpanSink {
    fn on_end(&self, span: FinishedSpan) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.push(span);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{Status, Tracer};

    #[test]
    fn sink_receives_span_exactly_once() {
        let sink = Arc::new(InMemorySpanSink::new());
        let tracer = Tracer::new("test").with_sink(sink.clone());

        let mut span = tracer.start_span("op");
        span.end();
        span.end();

        let finished = sink.finished_spans();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].name, "op");
        assert_eq!(finished[0].status, Status::Ok);
    }

    #[test]
    fn reset_clears_stored_spans() {
        let sink = Arc::new(InMemorySpanSink::new());
        let tracer = Tracer::new("test").with_sink(sink.clone());
        tracer.start_span("op").end();
        assert_eq!(sink.finished_spans().len(), 1);
        sink.reset();
        assert!(sink.finished_spans().is_empty());
    }
}
