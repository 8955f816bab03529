//! Shared application state for all routes. Everything here is read-only after startup.

use crate::auth::JwtKeys;
use crate::config::ResolvedModel;
use crate::settings::Settings;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub model: Arc<ResolvedModel>,
    pub settings: Arc<Settings>,
    pub keys: Arc<JwtKeys>,
}

impl AppState {
    pub fn new(pool: PgPool, model: ResolvedModel, settings: Settings) -> Self {
        let keys = JwtKeys::new(settings.jwt_secret.as_bytes(), settings.token_ttl_minutes);
        Self {
            pool,
            model: Arc::new(model),
            settings: Arc::new(settings),
            keys: Arc::new(keys),
        }
    }
}
