use std::fmt::Display;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    PathEscape,
    NotFound,
    FormatError,
    UpstreamError,
    StreamAbort,
    InvalidRequest,
    Io,
}

impl ErrorType {
    pub fn title(&self) -> &'static str {
        match self {
            Self::PathEscape => "Path Escape",
            Self::NotFound => "Not Found",
            Self::FormatError => "Format Error",
            Self::UpstreamError => "Upstream Error",
            Self::StreamAbort => "Stream Abort",
            Self::InvalidRequest => "Invalid Request",
            Self::Io => "I/O Error",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::PathEscape => 403,
            Self::NotFound => 404,
            Self::FormatError => 400,
            Self::UpstreamError => 500,
            Self::StreamAbort => 502,
            Self::InvalidRequest => 400,
            Self::Io => 500,
        }
    }
}

/// Body of every non-streaming error response: `{"detail": "..."}`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorDetail {
    pub detail: String,
}

impl ErrorDetail {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Failures raised inside the tools, the agent loop and the streaming bridge.
///
/// The `Display` text of the tool-facing variants is exactly what the tool
/// registry hands back to the reasoning loop, so keep it user readable.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Access denied: Unsafe file path.")]
    PathEscape { path: String },
    #[error("File not found: {name}")]
    NotFound { name: String },
    #[error("{message}")]
    Format { message: String },
    #[error("{message}")]
    Upstream { message: String },
    #[error("{message}")]
    StreamAbort { message: String },
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl BridgeError {
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Display) -> Self {
        Self::Upstream {
            message: message.to_string(),
        }
    }

    pub fn stream_abort(message: impl Display) -> Self {
        Self::StreamAbort {
            message: message.to_string(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::PathEscape { .. } => ErrorType::PathEscape,
            Self::NotFound { .. } => ErrorType::NotFound,
            Self::Format { .. } => ErrorType::FormatError,
            Self::Upstream { .. } => ErrorType::UpstreamError,
            Self::StreamAbort { .. } => ErrorType::StreamAbort,
            Self::InvalidRequest { .. } => ErrorType::InvalidRequest,
            Self::Io { .. } => ErrorType::Io,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.error_type().status_code()
    }

    pub fn to_error_detail(&self) -> ErrorDetail {
        ErrorDetail::new(self.to_string())
    }
}
