//! Admin tool configuration.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use bracket_engine::EngineConfig;
use bracket_engine::db::DatabaseConfig;

/// Complete admin configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Progression retry policy
    pub engine: EngineConfig,
    /// Keep all state in memory instead of PostgreSQL
    pub in_memory: bool,
    /// Apply the bracket schema before running a command
    pub apply_schema: bool,
    /// Bracket size used by `generate` when none is given
    pub default_bracket_size: u32,
}

impl AdminConfig {
    /// Load configuration from environment variables
    ///
    /// Pool settings come from [`DatabaseConfig::from_env`].
    ///
    /// # Arguments
    ///
    /// * `database_url_override` - Optional database URL override (from CLI args)
    /// * `in_memory` - Use the in-memory store (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if `ADMIN_STORE` names an unknown store
    pub fn from_env(
        database_url_override: Option<String>,
        in_memory: bool,
    ) -> Result<Self, ConfigError> {
        let mut database = DatabaseConfig::from_env();
        if let Some(database_url) = database_url_override {
            database.database_url = database_url;
        }

        let in_memory = match std::env::var("ADMIN_STORE") {
            Ok(store) => match store.to_lowercase().as_str() {
                "memory" => true,
                "postgres" => in_memory,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "ADMIN_STORE".to_string(),
                        reason: format!("Unknown store '{store}', expected memory or postgres"),
                    });
                }
            },
            Err(_) => in_memory,
        };

        Ok(AdminConfig {
            database,
            engine: EngineConfig::from_env(),
            in_memory,
            apply_schema: parse_env_or("ADMIN_APPLY_SCHEMA", true),
            default_bracket_size: parse_env_or("DEFAULT_BRACKET_SIZE", 8),
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !bracket_engine::bracket::SUPPORTED_BRACKET_SIZES.contains(&self.default_bracket_size) {
            return Err(ConfigError::Invalid {
                var: "DEFAULT_BRACKET_SIZE".to_string(),
                reason: "Must be one of 4, 8, 16 or 32".to_string(),
            });
        }

        if self.in_memory {
            return Ok(());
        }

        if self.database.database_url.is_empty() {
            return Err(ConfigError::MissingRequired {
                var: "DATABASE_URL".to_string(),
                hint: "Pass --db-url or use --memory".to_string(),
            });
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid {
                var: "DB_MIN_CONNECTIONS".to_string(),
                reason: format!(
                    "Cannot exceed max connections ({})",
                    self.database.max_connections
                ),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
