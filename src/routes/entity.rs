//! Catalog entity routes under `/v1`. The person aggregate is registered explicitly and wins over
//! the generic `/:path_segment` match.

use crate::handlers::{entity, person};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn entity_routes() -> Router<AppState> {
    Router::new()
        .route("/person", get(person::list).post(person::create))
        .route(
            "/person/:id",
            get(person::read).put(person::update).delete(person::delete),
        )
        .route("/:path_segment", get(entity::list).post(entity::create))
        .route(
            "/:path_segment/:id",
            get(entity::read).put(entity::update).delete(entity::delete),
        )
        // Route params at one position share a name; the scoped list reads `:id` as the scope segment.
        .route("/:path_segment/:id/:value", get(entity::list_scoped))
}
