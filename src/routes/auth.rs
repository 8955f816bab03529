//! `/auth` and `/users` routes.

use crate::handlers::{auth, users};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(users::list).post(users::create))
        .route("/users/me", get(users::me))
        .route(
            "/users/:id",
            get(users::read).put(users::update).delete(users::delete),
        )
}
