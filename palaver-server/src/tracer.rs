use axum::{body::Body, http::Request};
use std::time::Duration;
use tower_http::classify::{ServerErrorsAsFailures, ServerErrorsFailureClass, SharedClassifier};
use tower_http::trace::{
    DefaultOnBodyChunk, DefaultOnEos, DefaultOnResponse, MakeSpan, TraceLayer,
};
use tracing::{Level, Span, error, info};

use crate::middleware::request_context::RequestContext;

// on_request/on_failure are fn pointers so the layer type stays nameable.
type HttpTraceLayer = TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    CorrelatedSpan,
    fn(&Request<Body>, &Span) -> (),
    DefaultOnResponse,
    DefaultOnBodyChunk,
    DefaultOnEos,
    fn(ServerErrorsFailureClass, Duration, &Span) -> (),
>;

/// Span maker that lifts the correlation id out of the request
/// extensions, where the request-id middleware left it.
#[derive(Clone, Default)]
pub(crate) struct CorrelatedSpan;

impl<B> MakeSpan<B> for CorrelatedSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let request_id = request
            .extensions()
            .get::<RequestContext>()
            .map_or("n/a", |ctx| ctx.request_id.as_str());

        tracing::info_span!(
            "request",
            request_id,
            method = %request.method(),
            uri = %request.uri()
        )
    }
}

pub(crate) fn log_request_start(request: &Request<Body>, span: &Span) {
    span.in_scope(|| {
        info!(version = ?request.version(), "request received");
    });
}

pub(crate) fn log_request_failure(class: ServerErrorsFailureClass, latency: Duration, span: &Span) {
    span.in_scope(|| {
        error!(%class, elapsed = ?latency, "request failed");
    });
}

/// Tracing layer whose spans carry the correlation id stamped by the
/// request-id middleware.
pub fn trace_layer() -> HttpTraceLayer {
    TraceLayer::new_for_http()
        .make_span_with(CorrelatedSpan)
        .on_request(log_request_start as fn(&Request<Body>, &Span))
        .on_response(DefaultOnResponse::new().level(Level::INFO))
        .on_failure(log_request_failure as fn(ServerErrorsFailureClass, Duration, &Span))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use tracing::span;
    use tracing_subscriber::util::SubscriberInitExt;

    #[test]
    fn trace_layer_builds() {
        let layer = trace_layer();
        assert!(std::mem::size_of_val(&layer) > 0);
    }

    #[test]
    fn spans_work_with_and_without_the_request_context() {
        let _guard = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .set_default();

        let mut request = Request::builder()
            .method(Method::GET)
            .uri("/api/messages")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(RequestContext {
            request_id: "req-1".to_string(),
        });

        let _span = CorrelatedSpan.make_span(&request);

        let bare = Request::builder()
            .uri("/healthz")
            .body(Body::empty())
            .unwrap();
        let _span = CorrelatedSpan.make_span(&bare);
    }

    #[test]
    fn handlers_log_without_panicking() {
        let _guard = tracing_subscriber::fmt()
            .with_max_level(Level::ERROR)
            .set_default();

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/push/subscribe")
            .body(Body::empty())
            .unwrap();
        let span = span!(Level::INFO, "test_span");
        log_request_start(&request, &span);

        let class = ServerErrorsFailureClass::StatusCode(
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        );
        log_request_failure(class, Duration::from_millis(100), &span);
    }
}
