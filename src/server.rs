//! Axum router construction.
//!
//! The [`app`] function wires every gallery endpoint to its handler and
//! returns a ready-to-serve [`axum::Router`]. Mutating image routes sit
//! behind the auth and admin gates; login, listing and the operational
//! endpoints are public.

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method, Request},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::auth::{admin_middleware, auth_middleware};
use crate::errors::generate_request_id;
use crate::handlers;
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

/// Extra room for multipart framing and the title field on top of the file
/// size cap.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

// -- OpenAPI document ---------------------------------------------------------

/// OpenAPI documentation for the gallery API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Gallery API",
        version = "0.1.0",
        description = "Image gallery backend"
    ),
    paths(
        health_check,
        handlers::auth::login,
        handlers::images::list_images,
        handlers::images::upload_image,
        handlers::images::update_image,
        handlers::images::delete_image,
    ),
    components(schemas(
        crate::metadata::store::ImageRecord,
        handlers::auth::LoginRequest,
        handlers::auth::LoginResponse,
        handlers::images::UpdateImageRequest,
        handlers::images::MessageResponse,
        handlers::images::UploadForm,
    )),
    modifiers(&BearerSecurity),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Auth", description = "Login"),
        (name = "Images", description = "Gallery image operations"),
    )
)]
struct ApiDoc;

struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

/// Build the axum [`Router`] with all gallery routes.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let upload_limit = usize::try_from(state.staging.max_file_size())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    // Route layers run outermost-last: auth verifies the token, then the
    // admin gate checks the attached identity.
    let admin = Router::new()
        .route("/api/images/upload", post(handlers::images::upload_image))
        .route(
            "/api/images/:id",
            put(handlers::images::update_image).delete(handlers::images::delete_image),
        )
        .route_layer(middleware::from_fn(admin_middleware))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(DefaultBodyLimit::max(upload_limit));

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/openapi.json", get(openapi_json))
        .route("/api/login", post(handlers::auth::login))
        .route("/api/images", get(handlers::images::list_images))
        .merge(admin);

    if state.config.observability.metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    let cors = cors_layer(&state.config.server.cors_origins);

    // ServiceBuilder applies top to bottom: metrics_middleware is outermost
    // so it captures the full request lifecycle. Cors must sit inside
    // TraceLayer since it needs a `Default` response body.
    router.with_state(state).layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn(metrics_middleware))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .layer(middleware::from_fn(request_id_middleware)),
    )
}

/// CORS policy from the configured origins. `*` allows any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

// -- Request id middleware ----------------------------------------------------

/// Adds an `x-request-id` header (16 uppercase hex chars) to every response
/// that does not already carry one.
async fn request_id_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key("x-request-id") {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert("x-request-id", value);
        }
    }

    response
}

// -- Operational endpoints ----------------------------------------------------

/// `GET /health` -- liveness plus the storage mode chosen at startup.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "storage": state.mode.as_str(),
    }))
}

/// `GET /openapi.json` -- the generated OpenAPI document.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
