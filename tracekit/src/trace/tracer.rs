//! The span factory.

use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use rand::{rngs, Rng, SeedableRng};

use crate::propagation::{Extractor, Injector, TraceContextPropagator};
use crate::trace::{Span, SpanSink, TraceContext};
use crate::trace_context::{SpanId, TraceFlags, TraceId};

/// Interface for generating span and trace ids.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Generate a new `TraceId`.
    fn new_trace_id(&self) -> TraceId;

    /// Generate a new `SpanId`.
    fn new_span_id(&self) -> SpanId;
}

/// Default [`IdGenerator`], producing random ids from a thread-local rng.
#[derive(Clone, Debug, Default)]
pub struct RandomIdGenerator {
    _private: (),
}

impl IdGenerator for RandomIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        CURRENT_RNG.with(|rng| TraceId::from(rng.borrow_mut().gen::<u128>()))
    }

    fn new_span_id(&self) -> SpanId {
        CURRENT_RNG.with(|rng| SpanId::from(rng.borrow_mut().gen::<u64>()))
    }
}

thread_local! {
    static CURRENT_RNG: RefCell<rngs::SmallRng> = RefCell::new(rngs::SmallRng::from_entropy());
}

/// Starts spans and moves trace contexts in and out of carriers.
///
/// A tracer holds no cross-request mutable state; it is cheap to share by
/// reference between concurrent operations. Construct one per service with
/// the service's instrumentation scope name:
///
/// ```
/// use tracekit::trace::Tracer;
///
/// let tracer = Tracer::new("customer-service");
/// let span = tracer.start_span("create_customer");
/// assert!(span.context().is_valid());
/// ```
pub struct Tracer {
    scope: Cow<'static, str>,
    id_generator: Box<dyn IdGenerator>,
    propagator: TraceContextPropagator,
    sink: Option<Arc<dyn SpanSink>>,
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer").field("scope", &self.scope).finish()
    }
}

impl Tracer {
    /// Create a tracer with random id generation and no span sink.
    pub fn new(scope: impl Into<Cow<'static, str>>) -> Self {
        Tracer {
            scope: scope.into(),
            id_generator: Box::<RandomIdGenerator>::default(),
            propagator: TraceContextPropagator::new(),
            sink: None,
        }
    }

    /// Replace the id generator. Mainly useful for predictable ids in tests.
    pub fn with_id_generator(mut self, id_generator: impl IdGenerator + 'static) -> Self {
        self.id_generator = Box::new(id_generator);
        self
    }

    /// Deliver ended spans to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn SpanSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Instrumentation scope name of this tracer.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Start a root span: a fresh trace id and a fresh span id.
    pub fn start_span(&self, name: impl Into<Cow<'static, str>>) -> Span {
        let context = TraceContext::new(
            self.id_generator.new_trace_id(),
            self.id_generator.new_span_id(),
            TraceFlags::SAMPLED,
        );
        self.build_span(context, None, name.into())
    }

    /// Start a child of `parent`: the trace id and flags are inherited and
    /// the parent's span id becomes the new span's parent id.
    ///
    /// An invalid parent falls back to a root span, so a malformed upstream
    /// context can never fail span creation.
    pub fn start_span_with_parent(
        &self,
        name: impl Into<Cow<'static, str>>,
        parent: &TraceContext,
    ) -> Span {
        if !parent.is_valid() {
            return self.start_span(name);
        }
        let context = TraceContext::new(
            parent.trace_id(),
            self.id_generator.new_span_id(),
            parent.trace_flags(),
        );
        self.build_span(context, Some(parent.span_id()), name.into())
    }

    /// Start a span continuing whatever trace the carrier holds, or a root
    /// span if the carrier has no usable context.
    pub fn start_span_from(
        &self,
        name: impl Into<Cow<'static, str>>,
        carrier: &dyn Extractor,
    ) -> Span {
        match self.extract(carrier) {
            Some(parent) => self.start_span_with_parent(name, &parent),
            None => self.start_span(name),
        }
    }

    /// Write `context` into the carrier under the composite trace header.
    pub fn inject(&self, context: &TraceContext, carrier: &mut dyn Injector) {
        self.propagator.inject(context, carrier);
    }

    /// Parse a trace context out of the carrier. Absent or malformed
    /// headers yield `None`; extraction never fails.
    pub fn extract(&self, carrier: &dyn Extractor) -> Option<TraceContext> {
        self.propagator.extract(carrier)
    }

    fn build_span(
        &self,
        context: TraceContext,
        parent_span_id: Option<SpanId>,
        name: Cow<'static, str>,
    ) -> Span {
        Span::new(
            context,
            parent_span_id,
            self.scope.clone(),
            name,
            self.sink.clone(),
        )
    }
}
