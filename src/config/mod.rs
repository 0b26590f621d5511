#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

use crate::domain::ports::ConfigProvider;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use toml_config::TomlOverrides;

pub const DEFAULT_API_URL: &str = "https://www.eventbriteapi.com/v3";
pub const DEFAULT_PG_PORT: u16 = 5432;
pub const DEFAULT_MATERIALIZED_VIEWS: [&str; 3] = ["event_aggregates", "members_view", "participants"];

#[derive(Clone)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub schema: String,
    pub max_connections: u32,
    pub materialized_views: Vec<String>,
}

#[derive(Clone)]
pub struct EventbriteSettings {
    pub api_url: String,
    pub token: String,
    pub org_id: String,
}

#[derive(Debug, Clone)]
pub struct LoaderSettings {
    pub throttle_seconds: u64,
    pub rate_limit_backoff_seconds: u64,
    pub load_orders: bool,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            throttle_seconds: 60,
            rate_limit_backoff_seconds: 3600,
            load_orders: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub eventbrite: EventbriteSettings,
    pub loader: LoaderSettings,
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("schema", &self.schema)
            .field("max_connections", &self.max_connections)
            .field("materialized_views", &self.materialized_views)
            .finish()
    }
}

impl fmt::Debug for EventbriteSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventbriteSettings")
            .field("api_url", &self.api_url)
            .field("token", &"***")
            .field("org_id", &self.org_id)
            .finish()
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).ok_or_else(|| EtlError::MissingConfigError {
        field: name.to_string(),
    })
}

impl Settings {
    /// Reads the `PG_*` and `EVENTBRITE_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("PG_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| EtlError::InvalidConfigValueError {
                    field: "PG_PORT".to_string(),
                    value: raw.clone(),
                    reason: e.to_string(),
                })?,
            None => DEFAULT_PG_PORT,
        };

        let database = DatabaseSettings {
            host: required(&lookup, "PG_HOST")?,
            port,
            database: required(&lookup, "PG_DATABASE")?,
            user: required(&lookup, "PG_USER")?,
            password: required(&lookup, "PG_PASS")?,
            schema: required(&lookup, "PG_SCHEMA")?,
            max_connections: 5,
            materialized_views: DEFAULT_MATERIALIZED_VIEWS
                .iter()
                .map(|v| v.to_string())
                .collect(),
        };

        let eventbrite = EventbriteSettings {
            api_url: lookup("EVENTBRITE_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            token: required(&lookup, "EVENTBRITE_OAUTH")?,
            org_id: required(&lookup, "EVENTBRITE_ORG")?,
        };

        Ok(Self {
            database,
            eventbrite,
            loader: LoaderSettings::default(),
        })
    }

    /// Layers values from a TOML file over the environment settings.
    pub fn apply_overrides(&mut self, overrides: &TomlOverrides) {
        if let Some(db) = &overrides.database {
            if let Some(port) = db.port {
                self.database.port = port;
            }
            if let Some(max) = db.max_connections {
                self.database.max_connections = max;
            }
        }
        if let Some(eb) = &overrides.eventbrite {
            if let Some(url) = &eb.api_url {
                self.eventbrite.api_url = url.clone();
            }
        }
        if let Some(loader) = &overrides.loader {
            if let Some(secs) = loader.throttle_seconds {
                self.loader.throttle_seconds = secs;
            }
            if let Some(secs) = loader.rate_limit_backoff_seconds {
                self.loader.rate_limit_backoff_seconds = secs;
            }
            if let Some(orders) = loader.load_orders {
                self.loader.load_orders = orders;
            }
            if let Some(views) = &loader.materialized_views {
                self.database.materialized_views = views.clone();
            }
        }
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("PG_HOST", &self.database.host)?;
        validation::validate_non_empty_string("PG_DATABASE", &self.database.database)?;
        validation::validate_non_empty_string("PG_USER", &self.database.user)?;
        validation::validate_identifier("PG_SCHEMA", &self.database.schema)?;
        validation::validate_positive_number(
            "database.max_connections",
            self.database.max_connections as usize,
            1,
        )?;
        for view in &self.database.materialized_views {
            validation::validate_identifier("loader.materialized_views", view)?;
        }

        validation::validate_url("EVENTBRITE_API_URL", &self.eventbrite.api_url)?;
        validation::validate_non_empty_string("EVENTBRITE_OAUTH", &self.eventbrite.token)?;
        validation::validate_non_empty_string("EVENTBRITE_ORG", &self.eventbrite.org_id)?;
        Ok(())
    }
}

impl ConfigProvider for Settings {
    fn api_url(&self) -> &str {
        &self.eventbrite.api_url
    }

    fn org_id(&self) -> &str {
        &self.eventbrite.org_id
    }

    fn schema(&self) -> &str {
        &self.database.schema
    }

    fn materialized_views(&self) -> &[String] {
        &self.database.materialized_views
    }

    fn throttle(&self) -> Duration {
        Duration::from_secs(self.loader.throttle_seconds)
    }

    fn rate_limit_backoff(&self) -> Duration {
        Duration::from_secs(self.loader.rate_limit_backoff_seconds)
    }

    fn load_orders(&self) -> bool {
        self.loader.load_orders
    }
}

/// Loads a `.env` file into the process environment. Variables already set
/// are left alone. Without an explicit path, a missing `.env` is fine.
pub fn load_dotenv(path: Option<&Path>) -> Result<Option<PathBuf>> {
    match path {
        Some(path) => {
            dotenvy::from_path(path).map_err(|e| EtlError::ConfigError {
                message: format!("Failed to load env file {}: {}", path.display(), e),
            })?;
            Ok(Some(path.to_path_buf()))
        }
        None => match dotenvy::dotenv() {
            Ok(found) => Ok(Some(found)),
            Err(e) if e.not_found() => Ok(None),
            Err(e) => Err(EtlError::ConfigError {
                message: format!("Failed to load .env: {}", e),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("PG_SCHEMA", "reporting"),
            ("PG_DATABASE", "community"),
            ("PG_HOST", "db.internal"),
            ("PG_USER", "loader"),
            ("PG_PASS", "hunter2"),
            ("EVENTBRITE_OAUTH", "secret-token"),
            ("EVENTBRITE_ORG", "1234567"),
        ])
    }

    fn settings_from(env: &HashMap<&'static str, &'static str>) -> Result<Settings> {
        Settings::from_lookup(|name| env.get(name).map(|v| v.to_string()))
    }

    #[test]
    fn test_reads_required_variables_and_defaults() {
        let settings = settings_from(&sample_env()).unwrap();

        assert_eq!(settings.database.schema, "reporting");
        assert_eq!(settings.database.port, 5432);
        assert_eq!(settings.eventbrite.api_url, DEFAULT_API_URL);
        assert_eq!(settings.eventbrite.org_id, "1234567");
        assert_eq!(
            settings.database.materialized_views,
            vec!["event_aggregates", "members_view", "participants"]
        );
        assert_eq!(settings.throttle(), Duration::from_secs(60));
        assert_eq!(settings.rate_limit_backoff(), Duration::from_secs(3600));
        assert!(!settings.load_orders());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_missing_variable_is_named() {
        let mut env = sample_env();
        env.remove("EVENTBRITE_ORG");

        match settings_from(&env) {
            Err(EtlError::MissingConfigError { field }) => assert_eq!(field, "EVENTBRITE_ORG"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let mut env = sample_env();
        env.insert("PG_PORT", "not-a-port");

        assert!(matches!(
            settings_from(&env),
            Err(EtlError::InvalidConfigValueError { .. })
        ));
    }

    #[test]
    fn test_schema_must_be_identifier() {
        let mut env = sample_env();
        env.insert("PG_SCHEMA", "reporting; drop schema public");

        let settings = settings_from(&env).unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_debug_output_hides_secrets() {
        let settings = settings_from(&sample_env()).unwrap();
        let rendered = format!("{:?}", settings);

        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("db.internal"));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut settings = settings_from(&sample_env()).unwrap();
        let overrides = TomlOverrides::from_toml_str(
            r#"
[database]
port = 6543

[loader]
throttle_seconds = 0
load_orders = true
materialized_views = ["event_aggregates"]
"#,
        )
        .unwrap();

        settings.apply_overrides(&overrides);

        assert_eq!(settings.database.port, 6543);
        assert_eq!(settings.throttle(), Duration::ZERO);
        assert!(settings.load_orders());
        assert_eq!(settings.materialized_views(), ["event_aggregates".to_string()]);
        assert_eq!(settings.eventbrite.api_url, DEFAULT_API_URL);
    }
}
