//! Error handling for the SCADA bridge
//!
//! One error enum for the whole service. Transport, protocol and data failures
//! are separate variants so callers can branch on what went wrong instead of
//! parsing messages.

use axum::http::StatusCode;
use thiserror::Error;

/// SCADA bridge error type
#[derive(Error, Debug, Clone)]
pub enum ScadaError {
    /// Malformed frame header (bad magic, truncated header or body)
    #[error("Framing error: {message} (received {} bytes: {received:02X?})", .received.len())]
    Framing {
        message: String,
        /// Bytes actually read before the violation was detected
        received: Vec<u8>,
    },

    /// Declared frame length is negative or above the maximum
    #[error("Frame size error: declared body length {0} is outside 0..={}", crate::printsrv::codec::MAX_BODY_LEN)]
    FrameSize(i32),

    /// PrintSrv answered with the literal failure marker instead of JSON
    #[error("PrintSrv returned failure response: {body}")]
    FailResponse { body: String },

    /// Socket-level I/O errors
    #[error("IO error: {0}")]
    Io(String),

    /// Connection establishment and pool errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Response parsing and mapping errors
    #[error("Data error: {0}")]
    Data(String),

    /// Invalid argument or domain invariant violation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Both executor attempts failed; the first failure is kept as context
    #[error("{operation} failed after 2 attempts: {error} (first attempt: {first})")]
    RetryExhausted {
        operation: String,
        #[source]
        error: Box<ScadaError>,
        first: Box<ScadaError>,
    },

    /// The health policy is in recovery mode and the probe interval has not elapsed
    #[error("PrintSrv connection is recovering, request skipped")]
    Recovering,

    /// Pending write buffer is full and the unit has no queued command yet
    #[error("Pending write buffer is full ({size}/{capacity})")]
    BufferOverflow { size: usize, capacity: usize },

    /// No snapshot has been published yet
    #[error("No PrintSrv snapshot available yet")]
    NotReady,

    /// A backoff sleep was interrupted by shutdown
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

}

/// Result type alias for the SCADA bridge
pub type Result<T> = std::result::Result<T, ScadaError>;

impl ScadaError {
    pub fn framing(message: impl Into<String>, received: &[u8]) -> Self {
        Self::Framing {
            message: message.into(),
            received: received.to_vec(),
        }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Last underlying failure, looking through retry wrappers
    pub fn root(&self) -> &ScadaError {
        match self {
            Self::RetryExhausted { error, .. } => error.root(),
            other => other,
        }
    }

    /// Failure from the first executor attempt, if this is a retry wrapper
    pub fn first_attempt(&self) -> Option<&ScadaError> {
        match self {
            Self::RetryExhausted { first, .. } => Some(first),
            _ => None,
        }
    }

    /// Whether the connection that produced this error must be discarded
    ///
    /// After a framing or transport failure the stream position is unknown,
    /// so the socket cannot be reused.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self.root(),
            Self::Framing { .. }
                | Self::FrameSize(_)
                | Self::FailResponse { .. }
                | Self::Io(_)
                | Self::Connection(_)
                | Self::Data(_)
        )
    }

    /// Expected degraded-mode signal that should be logged quietly
    pub fn is_expected_degradation(&self) -> bool {
        matches!(self.root(), Self::Recovering | Self::Interrupted(_))
    }

    /// Stable error code for API consumers
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Framing { .. } => "SCADASRV_FRAMING_ERROR",
            Self::FrameSize(_) => "SCADASRV_FRAME_SIZE_ERROR",
            Self::FailResponse { .. } => "SCADASRV_FAIL_RESPONSE",
            Self::Io(_) => "SCADASRV_IO_ERROR",
            Self::Connection(_) => "SCADASRV_CONNECTION_ERROR",
            Self::Data(_) => "SCADASRV_DATA_ERROR",
            Self::Validation(_) => "SCADASRV_VALIDATION_ERROR",
            Self::RetryExhausted { .. } => "SCADASRV_RETRY_EXHAUSTED",
            Self::Recovering => "SCADASRV_RECOVERING",
            Self::BufferOverflow { .. } => "SCADASRV_BUFFER_OVERFLOW",
            Self::NotReady => "SCADASRV_NOT_READY",
            Self::Interrupted(_) => "SCADASRV_INTERRUPTED",
            Self::Config(_) => "SCADASRV_CONFIG_ERROR",
        }
    }

    /// HTTP status used when this error crosses the API boundary
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::BufferOverflow { .. } | Self::NotReady | Self::Recovering => {
                StatusCode::SERVICE_UNAVAILABLE
            },
            Self::Framing { .. }
            | Self::FrameSize(_)
            | Self::FailResponse { .. }
            | Self::Io(_)
            | Self::Connection(_)
            | Self::RetryExhausted { .. } => StatusCode::BAD_GATEWAY,
            Self::Data(_) | Self::Interrupted(_) | Self::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }
}

// ============================================================================
// From implementations for external error types
// ============================================================================

impl From<std::io::Error> for ScadaError {
    fn from(err: std::io::Error) -> Self {
        ScadaError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ScadaError {
    fn from(err: serde_json::Error) -> Self {
        ScadaError::Data(err.to_string())
    }
}

impl From<figment::Error> for ScadaError {
    fn from(err: figment::Error) -> Self {
        ScadaError::Config(err.to_string())
    }
}

// ============================================================================
// API Adaptation: ScadaError → AppError conversion
// ============================================================================

impl From<ScadaError> for common::AppError {
    fn from(err: ScadaError) -> Self {
        common::AppError::new(err.http_status(), err.to_string())
            .with_details(format!("error_code: {}", err.error_code()))
    }
}
