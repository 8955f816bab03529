//! Process settings: defaults, optional `party.toml`, then `PARTY_*` environment variables.
//! Built and validated once at startup; shared read-only afterwards.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum HMAC secret length accepted for HS256 signing.
pub const MIN_SECRET_BYTES: usize = 32;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("settings load: {0}")]
    Load(#[from] config::ConfigError),
    #[error("database url is not set (PARTY_DATABASE_URL or DATABASE_URL)")]
    MissingDatabaseUrl,
    #[error("jwt secret must be at least {MIN_SECRET_BYTES} bytes")]
    WeakSecret,
    #[error("token_ttl_minutes must be between 1 and 1440, got {0}")]
    InvalidTtl(i64),
    #[error("admin_email and admin_password must be set together")]
    IncompleteAdmin,
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
    /// Comma separated list of allowed CORS origins.
    pub cors_origins: String,
    pub max_connections: u32,
    pub body_limit_bytes: usize,
    /// Directory with catalog JSON files; the embedded catalog is used when unset.
    #[serde(default)]
    pub catalog_dir: Option<String>,
    #[serde(default)]
    pub admin_email: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            host: "0.0.0.0".to_string(),
            port: 8080,
            jwt_secret: String::new(),
            token_ttl_minutes: 30,
            cors_origins: "http://localhost:5173".to_string(),
            max_connections: 5,
            body_limit_bytes: 1024 * 1024,
            catalog_dir: None,
            admin_email: None,
            admin_password: None,
        }
    }
}

impl Settings {
    /// Load from defaults, `party.toml` (optional) and `PARTY_*` env vars (a `.env` file is read
    /// first), then validate.
    pub fn load() -> Result<Self, SettingsError> {
        dotenvy::dotenv().ok();
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?)
            .add_source(config::File::with_name("party").required(false))
            .add_source(config::Environment::with_prefix("PARTY"));
        let mut settings: Settings = builder.build()?.try_deserialize()?;
        if settings.database_url.is_none() {
            settings.database_url = std::env::var("DATABASE_URL").ok();
        }
        settings.validate()
    }

    pub fn validate(self) -> Result<Self, SettingsError> {
        match self.database_url.as_deref() {
            Some(url) if !url.trim().is_empty() => {}
            _ => return Err(SettingsError::MissingDatabaseUrl),
        }
        if self.jwt_secret.len() < MIN_SECRET_BYTES {
            return Err(SettingsError::WeakSecret);
        }
        if !(1..=1440).contains(&self.token_ttl_minutes) {
            return Err(SettingsError::InvalidTtl(self.token_ttl_minutes));
        }
        if self.admin_email.is_some() != self.admin_password.is_some() {
            return Err(SettingsError::IncompleteAdmin);
        }
        if self.max_connections == 0 {
            return Err(SettingsError::Invalid("max_connections must be positive".into()));
        }
        Ok(self)
    }

    pub fn database_url(&self) -> &str {
        self.database_url.as_deref().unwrap_or_default()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}
