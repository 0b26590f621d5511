use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Optional tuning file layered over the environment settings. Credentials
/// stay in the environment; reference them with `${VAR}` if needed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlOverrides {
    pub database: Option<DatabaseOverrides>,
    pub eventbrite: Option<EventbriteOverrides>,
    pub loader: Option<LoaderOverrides>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseOverrides {
    pub port: Option<u16>,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventbriteOverrides {
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoaderOverrides {
    pub throttle_seconds: Option<u64>,
    pub rate_limit_backoff_seconds: Option<u64>,
    pub load_orders: Option<bool>,
    pub materialized_views: Option<Vec<String>>,
}

impl TomlOverrides {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Self::from_toml_str_with(content, |name| std::env::var(name).ok())
    }

    /// Parses `content` after replacing every `${VAR}` through `lookup`.
    pub fn from_toml_str_with<F>(content: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let processed = substitute_env_vars(content, lookup)?;

        toml::from_str(&processed).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }
}

fn substitute_env_vars<F>(content: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").map_err(|e| EtlError::ConfigError {
        message: e.to_string(),
    })?;

    let mut missing = Vec::new();
    let result = re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        lookup(var_name).unwrap_or_else(|| {
            missing.push(var_name.to_string());
            String::new()
        })
    });

    if let Some(field) = missing.into_iter().next() {
        return Err(EtlError::MissingConfigError { field });
    }
    Ok(result.into_owned())
}

impl Validate for TomlOverrides {
    fn validate(&self) -> Result<()> {
        if let Some(url) = self.eventbrite.as_ref().and_then(|e| e.api_url.as_deref()) {
            validation::validate_url("eventbrite.api_url", url)?;
        }
        if let Some(max) = self.database.as_ref().and_then(|d| d.max_connections) {
            validation::validate_positive_number("database.max_connections", max as usize, 1)?;
        }
        if let Some(views) = self.loader.as_ref().and_then(|l| l.materialized_views.as_ref()) {
            for view in views {
                validation::validate_identifier("loader.materialized_views", view)?;
            }
        }
        Ok(())
    }
}
