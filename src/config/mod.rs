use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Environment variable that overrides `auth.jwt_secret`
pub const JWT_SECRET_ENV: &str = "JWT_SECRET_KEY";
/// Environment variable that overrides `database.url`
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
/// Upper bound for `auth.token_ttl_minutes` (one year)
pub const MAX_TOKEN_TTL_MINUTES: i64 = 525_600;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub devices: DeviceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx connection URL, e.g. `sqlite:devbox.db?mode=rwc`
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite:devbox.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret. A random one is generated at startup when unset,
    /// which invalidates all issued tokens on restart.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    /// Lifetime of an access token in minutes (default: 60)
    #[serde(default = "default_token_ttl_minutes")]
    pub token_ttl_minutes: i64,
    /// Username of the admin account seeded at startup
    #[serde(default = "default_admin_username")]
    pub admin_username: String,
    /// Email of the admin account seeded at startup
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    /// Password of the seeded admin. Seeding is skipped when unset.
    #[serde(default)]
    pub admin_password: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_minutes: default_token_ttl_minutes(),
            admin_username: default_admin_username(),
            admin_email: default_admin_email(),
            admin_password: None,
        }
    }
}

fn default_token_ttl_minutes() -> i64 {
    60
}

fn default_admin_username() -> String {
    "admin".to_string()
}

fn default_admin_email() -> String {
    "admin@example.com".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub tag_match: TagMatch,
}

/// How batch authorization matches requested tags against a device's tags.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TagMatch {
    /// Case-insensitive substring search in the comma-joined tag string.
    /// `dp` also matches a device tagged `DP2`.
    #[default]
    Substring,
    /// Whole-tag comparison against the split tag list, ignoring ASCII case.
    Exact,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).with_context(|| "Failed to parse configuration file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let ttl = self.auth.token_ttl_minutes;
        if !(1..=MAX_TOKEN_TTL_MINUTES).contains(&ttl) {
            bail!(
                "auth.token_ttl_minutes must be between 1 and {}, got {}",
                MAX_TOKEN_TTL_MINUTES,
                ttl
            );
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Some(secret) = std::env::var(JWT_SECRET_ENV).ok().filter(|s| !s.is_empty()) {
            self.auth.jwt_secret = Some(secret);
        }
        if let Some(url) = std::env::var(DATABASE_URL_ENV).ok().filter(|s| !s.is_empty()) {
            self.database.url = url;
        }
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.auth.token_ttl_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.auth.token_ttl_minutes, 60);
        assert_eq!(config.auth.admin_username, "admin");
        assert!(config.auth.jwt_secret.is_none());
        assert!(config.auth.admin_password.is_none());
        assert_eq!(config.devices.tag_match, TagMatch::Substring);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
            [server]
            port = 8081

            [auth]
            jwt_secret = "s3cret"
            token_ttl_minutes = 15

            [devices]
            tag_match = "exact"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.jwt_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.token_ttl(), chrono::Duration::minutes(15));
        assert_eq!(config.devices.tag_match, TagMatch::Exact);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_token_ttl_must_be_in_range() {
        for ttl in ["0", "-5", "99999999999"] {
            let err = Config::parse(&format!("[auth]\ntoken_ttl_minutes = {ttl}")).unwrap_err();
            assert!(err.to_string().contains("token_ttl_minutes"), "{err}");
        }

        let year = Config::parse("[auth]\ntoken_ttl_minutes = 525600").unwrap();
        assert_eq!(year.token_ttl(), chrono::Duration::days(365));
    }

    #[test]
    fn test_invalid_tag_match_is_rejected() {
        assert!(Config::parse("[devices]\ntag_match = \"fuzzy\"").is_err());
    }
}
