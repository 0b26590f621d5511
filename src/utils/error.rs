use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("API returned status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

pub type Result<T> = std::result::Result<T, EtlError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Database,
    Configuration,
    Data,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::ApiError(_) | EtlError::HttpStatus { .. } => ErrorCategory::Network,
            EtlError::DatabaseError(_) => ErrorCategory::Database,
            EtlError::ConfigError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            EtlError::SerializationError(_)
            | EtlError::ProcessingError { .. }
            | EtlError::ValidationError { .. } => ErrorCategory::Data,
            EtlError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Database | ErrorCategory::Data => ErrorSeverity::High,
            ErrorCategory::Configuration | ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// Whether the Eventbrite call that produced this error may succeed if
    /// repeated after the rate limit window resets.
    pub fn is_retryable(&self) -> bool {
        match self {
            EtlError::HttpStatus { .. } => true,
            EtlError::ApiError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            EtlError::HttpStatus { status: 401, .. } | EtlError::HttpStatus { status: 403, .. } => {
                "Check that EVENTBRITE_OAUTH is a valid token for EVENTBRITE_ORG".to_string()
            }
            EtlError::HttpStatus { status: 429, .. } => {
                "Eventbrite rate limit hit; wait for the window to reset and rerun".to_string()
            }
            EtlError::HttpStatus { .. } | EtlError::ApiError(_) => {
                "Check network connectivity and the Eventbrite API status, then rerun".to_string()
            }
            EtlError::DatabaseError(_) => {
                "Check PG_HOST, PG_DATABASE, PG_USER and PG_PASS and that the schema tables exist"
                    .to_string()
            }
            EtlError::MissingConfigError { field } => {
                format!("Set {} in the environment or in your .env file", field)
            }
            EtlError::InvalidConfigValueError { field, .. }
            | EtlError::ConfigValidationError { field, .. } => {
                format!("Fix the value of {}", field)
            }
            EtlError::ConfigError { .. } => "Review the configuration file".to_string(),
            EtlError::IoError(_) => "Check file paths and permissions".to_string(),
            EtlError::SerializationError(_) | EtlError::ProcessingError { .. } => {
                "The API returned an unexpected payload; rerun with --verbose for details"
                    .to_string()
            }
            EtlError::ValidationError { .. } => {
                "Check that the target table has columns matching the loaded data".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Network => format!("Could not talk to Eventbrite: {}", self),
            ErrorCategory::Database => format!("Database operation failed: {}", self),
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
            ErrorCategory::Data => format!("Could not process data: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_errors_are_retryable_network_errors() {
        let err = EtlError::HttpStatus {
            status: 429,
            url: "https://www.eventbriteapi.com/v3/events/1".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Network);
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert!(err.is_retryable());
        assert!(err.recovery_suggestion().contains("rate limit"));
    }

    #[test]
    fn test_config_errors_are_critical() {
        let err = EtlError::MissingConfigError {
            field: "PG_HOST".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(!err.is_retryable());
        assert!(err.recovery_suggestion().contains("PG_HOST"));
        assert!(err.user_friendly_message().starts_with("Invalid configuration"));
    }

    #[test]
    fn test_validation_errors_are_not_retryable() {
        let err = EtlError::ValidationError {
            message: "no columns".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Data);
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert!(!err.is_retryable());
    }
}
