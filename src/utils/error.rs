use axum::http::StatusCode;
use thiserror::Error;
use url::Url;

/// 被政策封鎖的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    Country(String),
    Isp(String),
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::Country(code) => write!(f, "country {}", code),
            BlockReason::Isp(name) => write!(f, "ISP {}", name),
        }
    }
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Malformed request data at line {line}: {reason}")]
    MalformedInput { line: u64, reason: String },

    #[error("Request blocked by {0} policy")]
    PolicyBlocked(BlockReason),

    #[error("Reputation lookup failed: {reason}")]
    ReputationLookupFailed {
        lookup_uri: Option<Url>,
        reason: String,
    },

    #[error("Internal failure: {message}")]
    InternalFailure { message: String },

    #[error("Audit store error: {message}")]
    AuditStoreError { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

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

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Policy,
    Upstream,
    Storage,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl GatewayError {
    /// 對外回應的 HTTP 狀態碼
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MalformedInput { .. } => StatusCode::BAD_REQUEST,
            GatewayError::PolicyBlocked(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::MalformedInput { .. } => "MALFORMED_INPUT",
            GatewayError::PolicyBlocked(BlockReason::Country(_)) => "BLOCKED_COUNTRY",
            GatewayError::PolicyBlocked(BlockReason::Isp(_)) => "BLOCKED_ISP",
            GatewayError::ReputationLookupFailed { .. } => "REPUTATION_LOOKUP_FAILED",
            _ => "INTERNAL_ERROR",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            GatewayError::MalformedInput { .. } => ErrorCategory::Input,
            GatewayError::PolicyBlocked(_) => ErrorCategory::Policy,
            GatewayError::ReputationLookupFailed { .. } => ErrorCategory::Upstream,
            GatewayError::AuditStoreError { .. } => ErrorCategory::Storage,
            GatewayError::ConfigError { .. }
            | GatewayError::ConfigValidationError { .. }
            | GatewayError::InvalidConfigValueError { .. }
            | GatewayError::MissingConfigError { .. } => ErrorCategory::Configuration,
            GatewayError::InternalFailure { .. }
            | GatewayError::IoError(_)
            | GatewayError::SerializationError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Input | ErrorCategory::Policy => ErrorSeverity::Low,
            ErrorCategory::Upstream => ErrorSeverity::Medium,
            ErrorCategory::Storage | ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Input => {
                "Fix the malformed rows, or disable data validation to drop them"
            }
            ErrorCategory::Policy => "The caller is blocked by the configured country/ISP lists",
            ErrorCategory::Upstream => "Check that the geolocation endpoint is reachable",
            ErrorCategory::Storage => "Check that the audit store is writable",
            ErrorCategory::Configuration => "Review the configuration file and try again",
            ErrorCategory::System => "Check the server logs for details",
        }
    }

    /// 給呼叫端看的訊息，不洩漏內部細節
    pub fn user_friendly_message(&self) -> String {
        match self {
            GatewayError::MalformedInput { .. } => {
                "Malformed request data - disable data validation flag and try again!".to_string()
            }
            GatewayError::PolicyBlocked(BlockReason::Country(_)) => {
                "Blocking request based on country.".to_string()
            }
            GatewayError::PolicyBlocked(BlockReason::Isp(_)) => {
                "Blocking request based on ISP.".to_string()
            }
            GatewayError::ReputationLookupFailed { .. } => {
                "Unable to validate the request origin.".to_string()
            }
            GatewayError::ConfigError { .. }
            | GatewayError::ConfigValidationError { .. }
            | GatewayError::InvalidConfigValueError { .. }
            | GatewayError::MissingConfigError { .. } => self.to_string(),
            _ => "Internal server error.".to_string(),
        }
    }
}
