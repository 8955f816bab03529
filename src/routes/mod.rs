//! Router assembly.

mod auth;
mod common;
mod entity;

pub use auth::{auth_routes, user_routes};
pub use common::common_routes;
pub use entity::entity_routes;

use crate::settings::Settings;
use crate::state::AppState;
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Every route of the API bound to `state`, with tracing, CORS and the body size limit applied.
pub fn app_router(state: AppState) -> Router {
    // CorsLayer needs a `Default` response body, which the limit layer's body is not.
    let layers = ServiceBuilder::new()
        .layer(RequestBodyLimitLayer::new(state.settings.body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.settings));
    Router::new()
        .merge(common_routes())
        .merge(auth_routes())
        .merge(user_routes())
        .nest("/v1", entity_routes())
        .layer(layers)
        .with_state(state)
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_origin_list()
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}
