use thiserror::Error;

/// 刷新交換失敗的原因，可複製給每個等待中的請求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshFailure {
    pub status: Option<u16>,
    pub message: String,
}

impl RefreshFailure {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RefreshFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "status {}: {}", status, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unauthorized request to {path}")]
    Unauthorized { path: String },

    #[error("Request to {path} failed with status {status}: {body}")]
    Status {
        status: u16,
        path: String,
        body: String,
    },

    #[error("Session refresh failed: {0}")]
    RefreshFailed(RefreshFailure),

    #[error("Session refresh was abandoned before it settled")]
    RefreshAbandoned,

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Authentication,
    Server,
    Data,
    Configuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ApiError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ApiError::Transport(_) => ErrorCategory::Network,
            ApiError::Unauthorized { .. }
            | ApiError::RefreshFailed(_)
            | ApiError::RefreshAbandoned => ErrorCategory::Authentication,
            ApiError::Status { .. } => ErrorCategory::Server,
            ApiError::Serialization(_) | ApiError::ValidationError { .. } => ErrorCategory::Data,
            ApiError::Io(_)
            | ApiError::ConfigError { .. }
            | ApiError::MissingConfigError { .. }
            | ApiError::InvalidConfigValueError { .. }
            | ApiError::ConfigValidationError { .. } => ErrorCategory::Configuration,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ApiError::ValidationError { .. } => ErrorSeverity::Low,
            ApiError::Transport(_) | ApiError::RefreshAbandoned => ErrorSeverity::Medium,
            ApiError::Status { status, .. } if *status >= 500 => ErrorSeverity::Medium,
            ApiError::Status { .. }
            | ApiError::Serialization(_)
            | ApiError::Unauthorized { .. }
            | ApiError::RefreshFailed(_) => ErrorSeverity::High,
            ApiError::Io(_)
            | ApiError::ConfigError { .. }
            | ApiError::MissingConfigError { .. }
            | ApiError::InvalidConfigValueError { .. }
            | ApiError::ConfigValidationError { .. } => ErrorSeverity::Critical,
        }
    }

    /// 401 回應（未經恢復）
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Status { status, .. } => Some(*status),
            ApiError::RefreshFailed(failure) => failure.status,
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => "Check that the API server is reachable and API_BASE_URL is correct",
            ErrorCategory::Authentication => "Sign in again; the session could not be renewed",
            ErrorCategory::Server => "Inspect the response body and retry once the server recovers",
            ErrorCategory::Data => "Check the request payload and identifiers",
            ErrorCategory::Configuration => "Review the configuration file and environment variables",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            ApiError::Transport(_) => "Could not reach the API server".to_string(),
            ApiError::Unauthorized { path } => format!("Not authorized to access {}", path),
            ApiError::RefreshFailed(_) | ApiError::RefreshAbandoned => {
                "Your session has expired".to_string()
            }
            ApiError::Status { status, path, .. } => {
                format!("The server rejected {} with status {}", path, status)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_failure_display() {
        let failure = RefreshFailure::new(Some(401), "refresh token revoked");
        assert_eq!(failure.to_string(), "status 401: refresh token revoked");

        let failure = RefreshFailure::new(None, "timed out");
        assert_eq!(failure.to_string(), "timed out");
    }

    #[test]
    fn test_error_classification() {
        let unauthorized = ApiError::Unauthorized {
            path: "/farms".to_string(),
        };
        assert!(unauthorized.is_unauthorized());
        assert_eq!(unauthorized.status(), Some(401));
        assert_eq!(unauthorized.category(), ErrorCategory::Authentication);

        let server = ApiError::Status {
            status: 503,
            path: "/flocks".to_string(),
            body: String::new(),
        };
        assert!(!server.is_unauthorized());
        assert_eq!(server.severity(), ErrorSeverity::Medium);

        let missing = ApiError::MissingConfigError {
            field: "api.base_url".to_string(),
        };
        assert_eq!(missing.severity(), ErrorSeverity::Critical);
    }
}
