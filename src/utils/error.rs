use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Rate limited by {url} after {attempts} attempts")]
    RateLimited { url: String, attempts: u32 },

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration field '{field}' is invalid: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Storage error: {message}")]
    StorageError { message: String },

    #[error("Background run failed: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    RateLimit,
    Parse,
    Configuration,
    Persistence,
    Data,
    Runtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn config(message: impl Into<String>) -> Self {
        EtlError::ConfigError {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        EtlError::ParseError {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        EtlError::ValidationError {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        EtlError::StorageError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::Http(_) | EtlError::HttpStatus { .. } => ErrorCategory::Network,
            EtlError::RateLimited { .. } => ErrorCategory::RateLimit,
            EtlError::ParseError { .. } | EtlError::SerializationError(_) => ErrorCategory::Parse,
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. } => ErrorCategory::Configuration,
            EtlError::IoError(_) | EtlError::StorageError { .. } | EtlError::CsvError(_) => {
                ErrorCategory::Persistence
            }
            EtlError::ValidationError { .. } => ErrorCategory::Data,
            EtlError::JoinError(_) => ErrorCategory::Runtime,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Data | ErrorCategory::Parse => ErrorSeverity::Low,
            ErrorCategory::Network | ErrorCategory::RateLimit => ErrorSeverity::Medium,
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::Persistence | ErrorCategory::Runtime => ErrorSeverity::Critical,
        }
    }

    /// Transient failures that a later run may not hit again.
    pub fn is_transient(&self) -> bool {
        match self {
            EtlError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            EtlError::HttpStatus { status, .. } => *status >= 500,
            EtlError::RateLimited { .. } => true,
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self.category() {
            ErrorCategory::Network => {
                "Check network connectivity and that the listing site / places API is reachable"
                    .to_string()
            }
            ErrorCategory::RateLimit => {
                "Increase http.request_delay_ms or http.backoff_base_ms and run again".to_string()
            }
            ErrorCategory::Parse => {
                "The remote markup or payload changed; review source.strategies selectors"
                    .to_string()
            }
            ErrorCategory::Configuration => {
                "Review the TOML configuration file and required environment variables"
                    .to_string()
            }
            ErrorCategory::Persistence => {
                "Check that storage.path is writable and not corrupted".to_string()
            }
            ErrorCategory::Data => "Inspect the offending record in the debug log".to_string(),
            ErrorCategory::Runtime => "Re-run the pipeline; the background task aborted".to_string(),
        }
    }

    /// Human-readable summary without internal detail such as response bodies.
    pub fn user_friendly_message(&self) -> String {
        match self {
            EtlError::Http(e) if e.is_timeout() => "A remote service timed out".to_string(),
            EtlError::Http(_) => "A remote service could not be reached".to_string(),
            EtlError::HttpStatus { status, .. } => {
                format!("A remote service answered with status {}", status)
            }
            EtlError::RateLimited { .. } => "A remote service is rate limiting requests".to_string(),
            EtlError::ConfigError { message } => format!("Configuration problem: {}", message),
            EtlError::ConfigValidationError { field, .. }
            | EtlError::InvalidConfigValueError { field, .. }
            | EtlError::MissingConfigError { field } => {
                format!("Configuration problem in '{}'", field)
            }
            EtlError::IoError(_) | EtlError::StorageError { .. } | EtlError::CsvError(_) => {
                "The place store could not be read or written".to_string()
            }
            EtlError::ParseError { .. } | EtlError::SerializationError(_) => {
                "Remote data could not be parsed".to_string()
            }
            EtlError::ValidationError { message } => format!("Invalid data: {}", message),
            EtlError::JoinError(_) => "The pipeline run was interrupted".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_high_severity() {
        let err = EtlError::MissingConfigError {
            field: "enrichment.api_key".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert_eq!(
            err.user_friendly_message(),
            "Configuration problem in 'enrichment.api_key'"
        );
    }

    #[test]
    fn test_status_errors_classify_transience() {
        let server_error = EtlError::HttpStatus {
            status: 503,
            url: "https://example.com".to_string(),
        };
        let not_found = EtlError::HttpStatus {
            status: 404,
            url: "https://example.com".to_string(),
        };
        assert!(server_error.is_transient());
        assert!(!not_found.is_transient());
        assert_eq!(server_error.category(), ErrorCategory::Network);
    }

    #[test]
    fn test_friendly_message_hides_urls() {
        let err = EtlError::RateLimited {
            url: "https://places.example.com/secret?key=abc".to_string(),
            attempts: 4,
        };
        assert!(!err.user_friendly_message().contains("key=abc"));
    }
}
