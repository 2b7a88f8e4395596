//! Per-route HTTP metrics.

use std::time::Instant;

use axum::{body::Body, extract::MatchedPath, http::Request, middleware::Next, response::Response};
use metrics::{counter, histogram};

use crate::handlers::locations::DEGRADED_HEADER;

pub const HTTP_REQUESTS_TOTAL: &str = "locus_http_requests_total";
pub const HTTP_REQUEST_DURATION: &str = "locus_http_request_duration_seconds";
pub const HTTP_DEGRADED_TOTAL: &str = "locus_http_degraded_responses_total";

/// Records request count and latency by route template, plus the
/// responses served from a last known value.
///
/// Requests that match no route share the `unmatched` label so probing
/// cannot grow the label set.
pub async fn http_metrics_middleware(
    matched_path: Option<MatchedPath>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().as_str().to_owned();
    let route = matched_path.map_or_else(|| "unmatched".to_owned(), |p| p.as_str().to_owned());

    let response = next.run(request).await;
    let elapsed = start.elapsed();

    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);
    histogram!(HTTP_REQUEST_DURATION, "method" => method, "route" => route.clone())
        .record(elapsed.as_secs_f64());

    if response.headers().contains_key(&DEGRADED_HEADER) {
        counter!(HTTP_DEGRADED_TOTAL, "route" => route).increment(1);
    }

    response
}

pub fn register_http_metrics() {
    metrics::describe_counter!(HTTP_REQUESTS_TOTAL, "HTTP requests by route and status");
    metrics::describe_histogram!(
        HTTP_REQUEST_DURATION,
        metrics::Unit::Seconds,
        "HTTP request latency"
    );
    metrics::describe_counter!(
        HTTP_DEGRADED_TOTAL,
        "Responses carrying a last known value after a failed refresh"
    );
}
