//! Error types for the streaming pipe and chunked writer.

use thiserror::Error;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// E004: Configuration missing or invalid
    E004InvalidConfig,
    /// E101: Sink or part could not be opened
    E101SinkInit,
    /// E102: Write to a sink or part failed
    E102SinkWrite,
    /// E103: Closing a sink or part failed
    E103SinkClose,
    /// E104: Source read failed
    E104Source,
    /// E105: Operation on a sink that was already destroyed or failed
    E105Terminated,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E004InvalidConfig => "E004",
            Self::E101SinkInit => "E101",
            Self::E102SinkWrite => "E102",
            Self::E103SinkClose => "E103",
            Self::E104Source => "E104",
            Self::E105Terminated => "E105",
        }
    }
}

/// Errors raised while streaming a source into its sinks.
///
/// Every variant is fatal to the operation that produced it. The type is
/// `Clone` so a failure recorded by a background sink can be reported on
/// every subsequent call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipeError {
    /// Invalid configuration provided
    #[error("[{code}] Invalid configuration: {message}")]
    InvalidConfig { code: &'static str, message: String },

    /// A sink (or one of its parts) could not be opened
    #[error("[{code}] Failed to open '{target}': {reason}")]
    SinkInit {
        code: &'static str,
        target: String,
        reason: String,
    },

    /// Writing to a sink failed
    #[error("[{code}] Failed to write to '{target}': {reason}")]
    SinkWrite {
        code: &'static str,
        target: String,
        reason: String,
    },

    /// Closing a sink failed, during part rotation or finalize
    #[error("[{code}] Failed to close '{target}': {reason}")]
    SinkClose {
        code: &'static str,
        target: String,
        reason: String,
    },

    /// The source failed while producing data
    #[error("[{code}] Source failed: {reason}")]
    Source { code: &'static str, reason: String },

    /// The sink was destroyed or already failed
    #[error("[{code}] Sink '{target}' is terminated: {reason}")]
    Terminated {
        code: &'static str,
        target: String,
        reason: String,
    },
}

impl PipeError {
    /// Create an invalid config error with error code
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            code: ErrorCode::E004InvalidConfig.as_str(),
            message: message.into(),
        }
    }

    pub fn sink_init(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::SinkInit {
            code: ErrorCode::E101SinkInit.as_str(),
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn sink_write(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::SinkWrite {
            code: ErrorCode::E102SinkWrite.as_str(),
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn sink_close(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::SinkClose {
            code: ErrorCode::E103SinkClose.as_str(),
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn source(reason: impl ToString) -> Self {
        Self::Source {
            code: ErrorCode::E104Source.as_str(),
            reason: reason.to_string(),
        }
    }

    pub fn terminated(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::Terminated {
            code: ErrorCode::E105Terminated.as_str(),
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    /// The stable error code of this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { code, .. }
            | Self::SinkInit { code, .. }
            | Self::SinkWrite { code, .. }
            | Self::SinkClose { code, .. }
            | Self::Source { code, .. }
            | Self::Terminated { code, .. } => code,
        }
    }
}

/// Result type alias for PipeError
pub type Result<T> = std::result::Result<T, PipeError>;
