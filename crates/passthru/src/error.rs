//! Session errors

use passthru_core::{ApiVersion, ErrorCode, FilterError, UnknownStatus, ValidationError};
use thiserror::Error;

use crate::procedure::{Procedure, VersionReq};

/// Result alias for session operations
pub type PassThruResult<T> = Result<T, PassThruError>;

/// Every failure a session operation can surface
///
/// Each variant carries the name of the operation that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PassThruError {
    /// Native call returned a failure status
    #[error("{operation} failed: {} ({code}): {}", .code.category(), .code.description())]
    Native {
        operation: &'static str,
        code: ErrorCode,
    },

    /// Procedure is not exported by the loaded library
    #[error("{operation}: {procedure} is not supported by {library}")]
    NotSupported {
        operation: &'static str,
        procedure: Procedure,
        library: String,
    },

    /// Operation called before a successful open
    #[error("PassThru device must be opened before calling {operation}")]
    NotOpen { operation: &'static str },

    /// Negotiated API version does not satisfy the operation
    #[error("{operation} requires API version {required} (using {actual})")]
    VersionMismatch {
        operation: &'static str,
        required: VersionReq,
        actual: ApiVersion,
    },

    /// Caller-supplied value rejected before the native call
    #[error("{operation}: {source}")]
    Validation {
        operation: &'static str,
        #[source]
        source: ValidationError,
    },

    /// Filter kind or encoding not implemented
    #[error("{operation}: {source}")]
    Filter {
        operation: &'static str,
        #[source]
        source: FilterError,
    },

    /// Native call returned a code outside the status table
    #[error("{operation}: {source}")]
    UnknownStatus {
        operation: &'static str,
        #[source]
        source: UnknownStatus,
    },
}

impl PassThruError {
    /// Name of the operation that failed
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Native { operation, .. }
            | Self::NotSupported { operation, .. }
            | Self::NotOpen { operation }
            | Self::VersionMismatch { operation, .. }
            | Self::Validation { operation, .. }
            | Self::Filter { operation, .. }
            | Self::UnknownStatus { operation, .. } => operation,
        }
    }

    /// Native status, for errors reported by the library
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Native { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Local failure raised before any native call
    pub fn is_local(&self) -> bool {
        !matches!(self, Self::Native { .. } | Self::UnknownStatus { .. })
    }

    pub(crate) fn validation(operation: &'static str, source: ValidationError) -> Self {
        Self::Validation { operation, source }
    }

    pub(crate) fn filter(operation: &'static str, source: FilterError) -> Self {
        match source {
            FilterError::Invalid(source) => Self::Validation { operation, source },
            other => Self::Filter {
                operation,
                source: other,
            },
        }
    }
}

/// Map a raw native status to `Ok` or the matching error
pub fn check(operation: &'static str, rc: u32) -> PassThruResult<()> {
    match ErrorCode::try_from(rc) {
        Ok(ErrorCode::NoError) => Ok(()),
        Ok(code) => Err(PassThruError::Native { operation, code }),
        Err(source) => Err(PassThruError::UnknownStatus { operation, source }),
    }
}

/// Errors loading a session configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_maps_codes() {
        assert!(check("read", 0).is_ok());

        let err = check("read", 0x09).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Timeout));
        assert_eq!(err.operation(), "read");
        assert!(!err.is_local());
    }

    #[test]
    fn test_unknown_code_is_an_error() {
        let err = check("connect", 0x9999).unwrap_err();
        assert_eq!(
            err,
            PassThruError::UnknownStatus {
                operation: "connect",
                source: UnknownStatus(0x9999)
            }
        );
    }

    #[test]
    fn test_messages_name_operation_and_description() {
        let msg = check("open", 0x22).unwrap_err().to_string();
        assert!(msg.starts_with("open failed"), "{msg}");
        assert!(msg.contains("ERR_OPEN_FAILED"), "{msg}");
        assert!(msg.contains("could not be opened"), "{msg}");

        let msg = PassThruError::NotOpen { operation: "close" }.to_string();
        assert_eq!(msg, "PassThru device must be opened before calling close");
    }
}
