//! Error types for the container-compose crate.
//!
//! Every failure in the pipeline and the orchestrator collapses into a
//! single [`Error`] enum so callers can match on the failure kind without
//! caring which subsystem produced it.

use thiserror::Error;

/// Result type for container-compose operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for all container-compose operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input: bad YAML, bad interpolation, invalid port or volume
    /// spec, dependency or extends cycle, unsupported driver
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of what was malformed
        message: String,
    },

    /// A referenced resource does not exist
    #[error("not found: {message}")]
    NotFound {
        /// Description of the missing resource
        message: String,
    },

    /// A dependency wait or health wait exceeded its deadline
    #[error("timed out after {timeout_seconds}s waiting for {operation}")]
    Timeout {
        /// What was being waited on
        operation: String,
        /// The deadline that was exceeded, in seconds
        timeout_seconds: u64,
    },

    /// A build process or runtime operation failed unexpectedly
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure
        message: String,
    },

    /// Resource creation collided with an existing resource
    #[error("already exists: {message}")]
    AlreadyExists {
        /// Description of the colliding resource
        message: String,
    },

    /// The operation was interrupted by a signal
    #[error("operation was interrupted")]
    Interrupted,

    /// IO error occurred during operation
    #[error("io error: {message}")]
    Io {
        /// Error message describing the IO failure
        message: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// YAML decoding error
    #[error("yaml error: {message}")]
    Yaml {
        /// Error message describing the YAML failure
        message: String,
        /// The underlying YAML error
        #[source]
        source: serde_yaml::Error,
    },

    /// JSON serialization error
    #[error("json error: {message}")]
    Json {
        /// Error message describing the JSON failure
        message: String,
        /// The underlying JSON error
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Create a new invalid-argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a new not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout(operation: impl Into<String>, timeout_seconds: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_seconds,
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a new already-exists error
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::AlreadyExists {
            message: message.into(),
        }
    }

    /// Get the error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "invalid-argument",
            Self::NotFound { .. } => "not-found",
            Self::Timeout { .. } => "timeout",
            Self::Internal { .. } => "internal",
            Self::AlreadyExists { .. } => "already-exists",
            Self::Interrupted => "interrupted",
            Self::Io { .. } => "io",
            Self::Yaml { .. } | Self::Json { .. } => "decode",
        }
    }

    /// Whether this error means a referenced resource was missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
            source: err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            Error::invalid_argument("test").category(),
            "invalid-argument"
        );
        assert_eq!(Error::not_found("test").category(), "not-found");
        assert_eq!(Error::timeout("start", 120).category(), "timeout");
        assert_eq!(Error::internal("test").category(), "internal");
        assert_eq!(Error::already_exists("test").category(), "already-exists");
        assert_eq!(Error::Interrupted.category(), "interrupted");
    }

    #[test]
    fn test_error_messages() {
        let err = Error::timeout("dependency db to start", 120);
        assert_eq!(
            err.to_string(),
            "timed out after 120s waiting for dependency db to start"
        );

        let err = Error::not_found("service web has no container");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "not found: service web has no container");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        match err {
            Error::Io { message, .. } => assert!(message.contains("file not found")),
            _ => panic!("wrong error type"),
        }
    }

    #[test]
    fn test_from_yaml_error() {
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>("{unterminated").unwrap_err();
        let err: Error = yaml_err.into();
        assert_eq!(err.category(), "decode");
    }
}
