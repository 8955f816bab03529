//! Party registry: catalog-driven REST backend for people, organizations, roles and relationships.

pub mod auth;
pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod migration;
pub mod response;
pub mod routes;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{load_embedded, load_from_dir, resolve, FullConfig, ResolvedEntity, ResolvedModel};
pub use error::{AppError, ConfigError};
pub use migration::apply_migrations;
pub use routes::app_router;
pub use service::{CrudService, PersonService, UserStore};
pub use settings::{Settings, SettingsError};
pub use state::AppState;
pub use store::{connect_pool, ensure_database_exists};

/// Installs the fmt subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("party_registry=info,tower_http=info")),
        )
        .init();
}

/// The embedded catalog, or the one in `catalog_dir` when configured.
pub fn load_catalog(settings: &Settings) -> Result<FullConfig, ConfigError> {
    match settings.catalog_dir.as_deref() {
        Some(dir) => {
            tracing::info!(dir, "loading catalog from directory");
            load_from_dir(std::path::Path::new(dir))
        }
        None => load_embedded(),
    }
}

/// Creates the database if needed, applies the catalog, seeds the bootstrap admin and
/// returns the shared state.
pub async fn bootstrap(settings: Settings) -> Result<AppState, AppError> {
    ensure_database_exists(settings.database_url()).await?;
    let pool = connect_pool(&settings).await?;
    let catalog = load_catalog(&settings)?;
    apply_migrations(&pool, &catalog).await?;
    let model = resolve(&catalog)?;
    tracing::info!(entities = model.entities.len(), "catalog resolved");
    if let (Some(email), Some(password)) = (settings.admin_email.as_deref(), settings.admin_password.as_deref()) {
        UserStore::ensure_admin(&pool, &model, email, password).await?;
    }
    Ok(AppState::new(pool, model, settings))
}
