//! Prometheus metrics for the gallery server.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides a middleware for HTTP RED
//! metrics, and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "gallery_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "gallery_http_request_duration_seconds";

/// Login attempts (counter). Labels: outcome.
pub const LOGIN_ATTEMPTS_TOTAL: &str = "gallery_login_attempts_total";

/// Images successfully uploaded and recorded (counter).
pub const IMAGES_UPLOADED_TOTAL: &str = "gallery_images_uploaded_total";

/// Images deleted (counter).
pub const IMAGES_DELETED_TOTAL: &str = "gallery_images_deleted_total";

// -- Global recorder installation ---------------------------------------------

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent.
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {e}"))?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(LOGIN_ATTEMPTS_TOTAL, "Login attempts by outcome");
    describe_counter!(IMAGES_UPLOADED_TOTAL, "Images uploaded");
    describe_counter!(IMAGES_DELETED_TOTAL, "Images deleted");
}

// -- Metrics middleware -------------------------------------------------------

/// Records HTTP RED metrics for every request except `/metrics` itself.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path, "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Map a request path to its route template so image ids do not become
/// label values.
///
/// Examples:
/// - `/api/images` -> `/api/images`
/// - `/api/images/upload` -> `/api/images/upload`
/// - `/api/images/3f2a...` -> `/api/images/{id}`
/// - `/favicon.ico` -> `/{other}`
fn normalize_path(path: &str) -> &'static str {
    match path {
        "/" => "/",
        "/health" => "/health",
        "/metrics" => "/metrics",
        "/openapi.json" => "/openapi.json",
        "/api/login" => "/api/login",
        "/api/images" => "/api/images",
        "/api/images/upload" => "/api/images/upload",
        _ => match path.strip_prefix("/api/images/") {
            Some(rest) if !rest.is_empty() && !rest.contains('/') => "/api/images/{id}",
            _ => "/{other}",
        },
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not initialized",
        )
            .into_response(),
    }
}

// -- Tests --------------------------------------------------------------------
