//! HTTP carrier adapters for `tracekit`.
//!
//! This crate is the edge between the core propagation types and an HTTP
//! transport: [`HeaderInjector`] / [`HeaderExtractor`] make `http::HeaderMap`
//! a carrier, [`send_with_context`] stamps the active trace context onto an
//! outbound request before handing it to a pluggable [`HttpClient`], and
//! [`metrics_response`] wraps a registry snapshot in a scrape response.
//!
//! The downstream-call adapter's only responsibility is context
//! propagation. A failing downstream call propagates to the caller
//! unchanged; resilience (retries, timeouts) belongs to the client
//! implementation or the caller.

#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub
)]
#![cfg_attr(test, deny(warnings))]

use std::fmt::Debug;

use async_trait::async_trait;

#[doc(no_inline)]
pub use bytes::Bytes;
#[doc(no_inline)]
pub use http::{Request, Response};

use tracekit::metrics::Registry;
use tracekit::propagation::{Extractor, Injector};
use tracekit::trace::{TraceContext, Tracer};

/// Content type of the Prometheus exposition text format.
const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Helper for injecting trace context headers into outbound HTTP requests.
#[derive(Debug)]
pub struct HeaderInjector<'a>(pub &'a mut http::HeaderMap);

impl Injector for HeaderInjector<'_> {
    /// Set a key and value in the `HeaderMap`. Does nothing if the key or
    /// value are not valid header inputs.
    fn set(&mut self, key: &str, value: String) {
        if let Ok(name) = http::header::HeaderName::from_bytes(key.as_bytes()) {
            if let Ok(val) = http::header::HeaderValue::from_str(&value) {
                self.0.insert(name, val);
            } else {
                tracing::debug!(key, "dropping header with invalid value");
            }
        } else {
            tracing::debug!(key, "dropping header with invalid name");
        }
    }
}

/// Helper for extracting trace context headers from inbound HTTP requests.
#[derive(Debug)]
pub struct HeaderExtractor<'a>(pub &'a http::HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    /// Get a value for a key from the `HeaderMap`. Returns `None` for
    /// values that are not valid ASCII.
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    /// Collect all the keys from the `HeaderMap`.
    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|name| name.as_str()).collect()
    }
}

/// Error type returned by [`HttpClient`] implementations.
pub type HttpError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A minimal interface for sending requests over HTTP.
///
/// Implementations choose their own runtime and transport; the adapter
/// only needs a way to hand over a request carrying the injected headers.
#[async_trait]
pub trait HttpClient: Debug + Send + Sync {
    /// Send the request and return the response, or an error if the call
    /// could not be completed.
    async fn send_bytes(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError>;
}

/// Call a downstream service, propagating the active trace context.
///
/// Injects `context` into the request's headers via the tracer, performs
/// the call, and returns the result unchanged — success or failure. The
/// receiving service extracts the same context to continue the trace.
pub async fn send_with_context(
    client: &dyn HttpClient,
    tracer: &Tracer,
    context: &TraceContext,
    mut request: Request<Bytes>,
) -> Result<Response<Bytes>, HttpError> {
    tracer.inject(context, &mut HeaderInjector(request.headers_mut()));
    client.send_bytes(request).await
}

/// Build a scrape response around a registry snapshot.
///
/// The body is the registry's Prometheus exposition text with the matching
/// `text/plain` content type.
pub fn metrics_response(registry: &Registry) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from(registry.render()));
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::header::HeaderValue::from_static(EXPOSITION_CONTENT_TYPE),
    );
    response
}
