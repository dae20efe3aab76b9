//! The guaranteed start/finish accounting pattern around a unit of
//! business logic.
//!
//! An [`Operation`] wraps a business call with a span and four metric
//! series: attempts, successes, failures, and a duration histogram. The
//! terminal accounting runs through a drop guard, so the span is ended and
//! the duration observed exactly once on every exit path, including early
//! returns, propagated failures, and task cancellation. A cancelled
//! operation is accounted as failed.
//!
//! This layer never retries and never swallows a business error: the
//! `Result` is handed back to the caller unchanged once accounting is done.

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::time::Instant;

use crate::metrics::{
    Counter, Histogram, MetricError, Registry, DEFAULT_DURATION_BUCKETS,
};
use crate::propagation::Extractor;
use crate::trace::{Span, Status, TraceContext, Tracer};

/// A named, instrumented unit of business logic.
///
/// Cloning is cheap; clones share the same metric series.
#[derive(Clone, Debug)]
pub struct Operation {
    name: Cow<'static, str>,
    attempts: Counter,
    successes: Counter,
    failures: Counter,
    duration: Histogram,
}

impl Operation {
    /// Register the operation's metric series in `registry`.
    ///
    /// Fails only on a metric identity conflict, which is fatal at startup
    /// by policy.
    pub fn new(
        registry: &Registry,
        name: impl Into<Cow<'static, str>>,
    ) -> Result<Self, MetricError> {
        let name = name.into();
        let labels: &[(&str, &str)] = &[("operation", name.as_ref())];
        Ok(Operation {
            attempts: registry.counter_with_labels(
                "operation_attempts_total",
                "Total operation attempts",
                labels,
            )?,
            successes: registry.counter_with_labels(
                "operation_success_total",
                "Total successful operations",
                labels,
            )?,
            failures: registry.counter_with_labels(
                "operation_failures_total",
                "Total failed operations",
                labels,
            )?,
            duration: registry.histogram_with_labels(
                "operation_duration_seconds",
                "Operation duration in seconds",
                DEFAULT_DURATION_BUCKETS,
                labels,
            )?,
            name,
        })
    }

    /// Operation name, also used as the span name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attempt counter for this operation.
    pub fn attempts(&self) -> &Counter {
        &self.attempts
    }

    /// Success counter for this operation.
    pub fn successes(&self) -> &Counter {
        &self.successes
    }

    /// Failure counter for this operation.
    pub fn failures(&self) -> &Counter {
        &self.failures
    }

    /// Duration histogram for this operation.
    pub fn duration(&self) -> &Histogram {
        &self.duration
    }

    /// Run the business call under a span, with exactly-once accounting.
    ///
    /// With a `parent` context the span joins that trace; without one it
    /// starts a new root trace. The closure receives the active span's
    /// context for nested child operations and downstream propagation.
    pub async fn run<F, Fut, T, E>(
        &self,
        tracer: &Tracer,
        parent: Option<TraceContext>,
        op: F,
    ) -> Result<T, E>
    where
        F: FnOnce(TraceContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        // Attempts are counted before the span exists: metrics and tracing
        // are independent concerns, and one's absence never suppresses the
        // other.
        self.attempts.inc();
        let span = match parent {
            Some(parent) => tracer.start_span_with_parent(self.name.clone(), &parent),
            None => tracer.start_span(self.name.clone()),
        };
        let context = span.context();
        let mut guard = OperationGuard::new(span, self);

        let result = op(context).await;
        match &result {
            Ok(_) => guard.succeed(),
            Err(err) => guard.fail(err),
        }
        result
    }

    /// Like [`Operation::run`], extracting the parent from an inbound
    /// carrier first. A carrier without a usable context starts a root
    /// trace.
    pub async fn run_from_carrier<F, Fut, T, E>(
        &self,
        tracer: &Tracer,
        carrier: &dyn Extractor,
        op: F,
    ) -> Result<T, E>
    where
        F: FnOnce(TraceContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.run(tracer, tracer.extract(carrier), op).await
    }
}

/// Performs the terminal accounting for one attempt.
///
/// Dropped without an explicit outcome (early return in caller code, task
/// cancellation), it records the attempt as failed. Either way the span is
/// ended and the duration observed exactly once.
struct OperationGuard {
    span: Option<Span>,
    successes: Counter,
    failures: Counter,
    duration: Histogram,
    started: Instant,
    finished: bool,
}

impl OperationGuard {
    fn new(span: Span, operation: &Operation) -> Self {
        OperationGuard {
            span: Some(span),
            successes: operation.successes.clone(),
            failures: operation.failures.clone(),
            duration: operation.duration.clone(),
            started: Instant::now(),
            finished: false,
        }
    }

    fn succeed(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some(span) = self.span.as_mut() {
            span.set_status(Status::Ok);
        }
        self.successes.inc();
        self.close();
    }

    fn fail(&mut self, err: &dyn fmt::Display) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some(span) = self.span.as_mut() {
            span.record_error(err);
        }
        self.failures.inc();
        self.close();
    }

    fn close(&mut self) {
        self.duration.observe(self.started.elapsed().as_secs_f64());
        if let Some(mut span) = self.span.take() {
            span.end();
        }
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some(span) = self.span.as_mut() {
            tracing::debug!(span = span.name(), "operation dropped before completion");
            span.record_error(&"operation aborted before completion");
        }
        self.failures.inc();
        self.close();
    }
}
