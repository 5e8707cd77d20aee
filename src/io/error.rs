//! Backend failure types and their operator-facing classification

use thiserror::Error;

/// Fallback text when a failure carries no usable message
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to save manual entry. Please try again.";

/// Every way a backend call can fail
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// No response (connection refused, DNS, reset)
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    /// Non-2xx response; `message` is the body's `error` or `message` field if any
    #[error("http {status}: {}", message.as_deref().unwrap_or("no message"))]
    Status { status: u16, message: Option<String> },

    /// 2xx response whose envelope says `success: false`
    #[error("rejected ({status}): {}", message.as_deref().unwrap_or("no message"))]
    Rejected { status: u16, message: Option<String> },

    #[error("decode error: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } | Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-provided text, if the failure carried any
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Status { message, .. } | Self::Rejected { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    Validation,
    Unauthorized,
    Forbidden,
    NotFound,
    ServerError,
    Generic,
}

impl FailureCategory {
    pub fn from_status(status: Option<u16>) -> Self {
        match status {
            Some(400) => Self::Validation,
            Some(401) => Self::Unauthorized,
            Some(403) => Self::Forbidden,
            Some(404) => Self::NotFound,
            Some(500) => Self::ServerError,
            _ => Self::Generic,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Validation => "Validation Error!",
            Self::Unauthorized => "Unauthorized!",
            Self::Forbidden => "Forbidden!",
            Self::NotFound => "Not Found!",
            Self::ServerError => "Server Error!",
            Self::Generic => "Error!",
        }
    }

    /// Fixed message; `None` means the server's own text is shown
    fn fixed_message(self) -> Option<&'static str> {
        match self {
            Self::Unauthorized => Some("You are not authorized to perform this action."),
            Self::Forbidden => Some("Access denied. You do not have permission."),
            Self::NotFound => Some("The requested resource was not found."),
            Self::ServerError => Some("Internal server error. Please try again later."),
            Self::Validation | Self::Generic => None,
        }
    }
}

/// What an operator sees when a foreground submission fails
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{title} {message}")]
pub struct OperatorError {
    pub category: FailureCategory,
    pub title: &'static str,
    pub message: String,
}

impl From<&ApiError> for OperatorError {
    fn from(e: &ApiError) -> Self {
        let category = FailureCategory::from_status(e.status());
        let message = match (category.fixed_message(), category) {
            (Some(fixed), _) => fixed.to_string(),
            (None, FailureCategory::Validation) => {
                e.server_message().unwrap_or("Invalid data provided.").to_string()
            }
            (None, _) => match e {
                ApiError::Status { message: Some(m), .. }
                | ApiError::Rejected { message: Some(m), .. } => m.clone(),
                ApiError::Status { message: None, .. } | ApiError::Rejected { message: None, .. } => {
                    GENERIC_FAILURE_MESSAGE.to_string()
                }
                other => other.to_string(),
            },
        };
        Self { category, title: category.title(), message }
    }
}

impl From<ApiError> for OperatorError {
    fn from(e: ApiError) -> Self {
        Self::from(&e)
    }
}
