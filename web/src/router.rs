use crate::controller::{device_flow_controller, health_check_controller};
use crate::params;
use axum::{
    http::{header, HeaderName, HeaderValue},
    routing::{get, post},
    Router,
};
use service::AppState;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_rapidoc::RapiDoc;

/// Correlates a request with its response and log lines.
pub const TRACE_ID_HEADER: &str = "x-trace-id";

// This is the global definition of our OpenAPI document. To be a part
// of the rendered document, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Device Authorization API"
        ),
        paths(
            device_flow_controller::start,
            device_flow_controller::approve,
            device_flow_controller::token,
            health_check_controller::health_check,
        ),
        components(
            schemas(
                params::device_flow::ApproveParams,
                params::device_flow::TokenParams,
            )
        ),
        modifiers(&SecurityAddon),
        tags(
            (name = "device_auth", description = "Device authorization grant for headless clients")
        )
    )]
struct ApiDoc;

struct SecurityAddon;

// Approvals are made by a signed-in browser session that presents the identity
// provider's JWT as a bearer token.
impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            )
        }
    }
}

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(device_flow_routes(app_state))
        .merge(health_routes())
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/rapidoc"))
        // Codes and tokens must never be cached by intermediaries.
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        // An incoming trace id is kept, otherwise a fresh one is generated.
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            TRACE_ID_HEADER,
        )))
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static(TRACE_ID_HEADER),
            MakeRequestUuid,
        ))
}

fn device_flow_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/device/start", post(device_flow_controller::start))
        .route("/device/approve", post(device_flow_controller::approve))
        .route("/device/token", post(device_flow_controller::token))
        .with_state(app_state)
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}
