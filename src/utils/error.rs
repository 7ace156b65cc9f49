use thiserror::Error;

/// 單一 GraphQL 錯誤（來自回應中的 `errors` 陣列）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphQlError {
    pub message: String,
    pub code: Option<String>,
}

impl std::fmt::Display for GraphQlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("GraphQL request returned errors: {}", join_errors(.errors))]
    GraphQlError { errors: Vec<GraphQlError> },

    #[error("API responded with status {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Authentication failed: {message}")]
    AuthError { message: String },

    #[error("Email is missing")]
    MissingEmail,

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Document rendering failed: {message}")]
    DocumentError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

fn join_errors(errors: &[GraphQlError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Remote,
    Authentication,
    Configuration,
    Data,
    Storage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SyncError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SyncError::HttpError(_) => ErrorCategory::Network,
            SyncError::GraphQlError { .. } | SyncError::ApiError { .. } => ErrorCategory::Remote,
            SyncError::AuthError { .. } => ErrorCategory::Authentication,
            SyncError::IoError(_) => ErrorCategory::Storage,
            SyncError::ConfigError { .. }
            | SyncError::ConfigValidationError { .. }
            | SyncError::InvalidConfigValueError { .. }
            | SyncError::MissingConfigError { .. } => ErrorCategory::Configuration,
            SyncError::SerializationError(_)
            | SyncError::MissingEmail
            | SyncError::NotFound { .. }
            | SyncError::DocumentError { .. }
            | SyncError::ProcessingError { .. } => ErrorCategory::Data,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network | ErrorCategory::Remote => ErrorSeverity::Medium,
            ErrorCategory::Data => match self {
                SyncError::MissingEmail | SyncError::NotFound { .. } => ErrorSeverity::Low,
                _ => ErrorSeverity::High,
            },
            ErrorCategory::Storage => ErrorSeverity::High,
            ErrorCategory::Authentication | ErrorCategory::Configuration => ErrorSeverity::Critical,
        }
    }

    /// 暫時性錯誤（可以稍後重試）
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::HttpError(e) => e.is_timeout() || e.is_connect(),
            SyncError::ApiError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// GraphQL 錯誤中是否包含指定的錯誤代碼或訊息片段
    pub fn has_graphql_error(&self, needle: &str) -> bool {
        match self {
            SyncError::GraphQlError { errors } => errors.iter().any(|e| {
                e.message.contains(needle) || e.code.as_deref().is_some_and(|c| c.contains(needle))
            }),
            _ => false,
        }
    }

    /// 依嚴重程度決定程序結束碼
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => "Check network connectivity and retry the run",
            ErrorCategory::Remote => "Inspect the remote API response; rate limits usually clear after a short wait",
            ErrorCategory::Authentication => "Verify the API key or refresh the OAuth credentials",
            ErrorCategory::Configuration => "Fix the configuration file or the referenced environment variables",
            ErrorCategory::Data => "Inspect the offending record; it was skipped",
            ErrorCategory::Storage => "Check that the state and download directories are writable",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            SyncError::AuthError { .. } => "Could not authenticate against the remote service".to_string(),
            SyncError::MissingEmail => "The record has no email address".to_string(),
            SyncError::ConfigError { .. }
            | SyncError::ConfigValidationError { .. }
            | SyncError::InvalidConfigValueError { .. }
            | SyncError::MissingConfigError { .. } => format!("Invalid configuration: {}", self),
            _ => self.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graphql_error_display_joins_messages() {
        let err = SyncError::GraphQlError {
            errors: vec![
                GraphQlError {
                    message: "Complexity budget exhausted".to_string(),
                    code: Some("ComplexityException".to_string()),
                },
                GraphQlError {
                    message: "second".to_string(),
                    code: None,
                },
            ],
        };

        assert_eq!(
            err.to_string(),
            "GraphQL request returned errors: Complexity budget exhausted (ComplexityException); second"
        );
        assert!(err.has_graphql_error("ComplexityException"));
        assert!(!err.has_graphql_error("ColumnValueException"));
    }

    #[test]
    fn test_severity_by_category() {
        assert_eq!(SyncError::MissingEmail.severity(), ErrorSeverity::Low);
        assert_eq!(
            SyncError::ConfigError { message: "x".into() }.severity(),
            ErrorSeverity::Critical
        );
        assert_eq!(
            SyncError::ApiError { status: 502, body: String::new() }.severity(),
            ErrorSeverity::Medium
        );
    }

    #[test]
    fn test_transient_api_errors() {
        assert!(SyncError::ApiError { status: 429, body: String::new() }.is_transient());
        assert!(SyncError::ApiError { status: 503, body: String::new() }.is_transient());
        assert!(!SyncError::ApiError { status: 400, body: String::new() }.is_transient());
        assert!(!SyncError::MissingEmail.is_transient());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(SyncError::MissingEmail.exit_code(), 0);
        assert_eq!(SyncError::DocumentError { message: "x".into() }.exit_code(), 1);
        assert_eq!(SyncError::ApiError { status: 500, body: String::new() }.exit_code(), 2);
        assert_eq!(SyncError::MissingConfigError { field: "zoho".into() }.exit_code(), 3);
    }
}
