//! Error types and error code constants for testlens.
//!
//! This module provides a unified error type (`LensError`) that bridges
//! domain-specific errors from different subsystems (file discovery, parsing,
//! coverage readers) into a common format suitable for JSON output.
//!
//! ## Error Code Mapping
//!
//! - `2`: Invalid arguments (bad input from caller)
//! - `3`: Resolution errors (file, directory or symbol not found)
//! - `4`: Input errors (unreadable file, syntax error, unsupported format)
//! - `10`: Internal errors (bugs, unexpected state)
//!
//! Every variant also carries a stable string identifier (`LensError::kind`)
//! that appears as the `kind` field of error responses.

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::files::FileError;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Error codes for JSON output.
///
/// These codes map to CLI exit codes and appear in JSON error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments from caller (bad input, malformed request).
    InvalidArguments = 2,
    /// Resolution errors (symbol, file or directory not found).
    ResolutionError = 3,
    /// The input exists but cannot be analyzed (syntax, encoding, format).
    InputError = 4,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for engine output.
///
/// All subsystem errors are converted to this type before being rendered as
/// JSON. Each variant keeps enough context to produce a helpful message and an
/// optional `details` object.
#[derive(Debug, Error)]
pub enum LensError {
    /// Invalid arguments from caller.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        message: String,
        details: Option<serde_json::Value>,
    },

    /// File or directory does not exist.
    #[error("not found: {path}")]
    NotFound { path: String },

    /// Path exists but is not a Python source file.
    #[error("not a Python source file: {path}")]
    NotSourceFile { path: String },

    /// Source failed to parse.
    #[error("syntax error in {path} at line {line}, column {col}: {message}")]
    SyntaxError {
        path: String,
        message: String,
        line: u32,
        col: u32,
    },

    /// IO or decoding failure while reading a file.
    #[error("cannot read {path}: {message}")]
    ReadError { path: String, message: String },

    /// The file system refused access.
    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    /// A named function or class is absent from the module.
    #[error("{kind} '{name}' not found in {path}")]
    SymbolNotFound {
        kind: String,
        name: String,
        path: String,
    },

    /// Path exists but cannot be used as a directory.
    #[error("invalid directory {path}: {reason}")]
    InvalidDirectory { path: String, reason: String },

    /// Input format is recognized but not supported.
    #[error("unsupported format for {path}: {reason}")]
    UnsupportedFormat { path: String, reason: String },

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    Internal { message: String },
}

/// Result alias used across the engine.
pub type LensResult<T> = Result<T, LensError>;

// ============================================================================
// Error Code Mapping
// ============================================================================

impl From<&LensError> for OutputErrorCode {
    fn from(err: &LensError) -> Self {
        match err {
            LensError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            LensError::NotFound { .. } => OutputErrorCode::ResolutionError,
            LensError::SymbolNotFound { .. } => OutputErrorCode::ResolutionError,
            LensError::InvalidDirectory { .. } => OutputErrorCode::ResolutionError,
            LensError::NotSourceFile { .. } => OutputErrorCode::InputError,
            LensError::SyntaxError { .. } => OutputErrorCode::InputError,
            LensError::ReadError { .. } => OutputErrorCode::InputError,
            LensError::PermissionDenied { .. } => OutputErrorCode::InputError,
            LensError::UnsupportedFormat { .. } => OutputErrorCode::InputError,
            LensError::Internal { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<LensError> for OutputErrorCode {
    fn from(err: LensError) -> Self {
        OutputErrorCode::from(&err)
    }
}

// ============================================================================
// Bridge: FileError -> LensError
// ============================================================================

impl From<FileError> for LensError {
    fn from(err: FileError) -> Self {
        match err {
            FileError::NotFound { path } => LensError::NotFound { path },
            FileError::NotAFile { path } => LensError::InvalidArguments {
                message: format!("{} is a directory, expected a file", path),
                details: Some(serde_json::json!({ "path": path })),
            },
            FileError::NotADirectory { path } => LensError::InvalidDirectory {
                path,
                reason: "not a directory".to_string(),
            },
            FileError::NotSourceFile { path } => LensError::NotSourceFile { path },
            FileError::PermissionDenied { path } => LensError::PermissionDenied { path },
            FileError::Undecodable { path } => LensError::ReadError {
                path,
                message: "content is not decodable as text".to_string(),
            },
            FileError::Io { path, source } => LensError::ReadError {
                path,
                message: source.to_string(),
            },
        }
    }
}

// ============================================================================
// Bridge: ConfigError -> LensError
// ============================================================================

impl From<ConfigError> for LensError {
    fn from(err: ConfigError) -> Self {
        LensError::InvalidArguments {
            message: err.to_string(),
            details: None,
        }
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl LensError {
    /// Create an invalid arguments error.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        LensError::InvalidArguments {
            message: message.into(),
            details: None,
        }
    }

    /// Create an invalid arguments error with JSON details.
    pub fn invalid_args_with_details(
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        LensError::InvalidArguments {
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        LensError::NotFound { path: path.into() }
    }

    /// Create a symbol not found error. `kind` is `function` or `class`.
    pub fn symbol_not_found(
        kind: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        LensError::SymbolNotFound {
            kind: kind.into(),
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn unsupported_format(path: impl Into<String>, reason: impl Into<String>) -> Self {
        LensError::UnsupportedFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        LensError::Internal {
            message: message.into(),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> OutputErrorCode {
        OutputErrorCode::from(self)
    }

    /// Stable taxonomy identifier for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            LensError::InvalidArguments { .. } => "invalid_arguments",
            LensError::NotFound { .. } => "not_found",
            LensError::NotSourceFile { .. } => "not_source_file",
            LensError::SyntaxError { .. } => "syntax_error",
            LensError::ReadError { .. } => "read_error",
            LensError::PermissionDenied { .. } => "permission_denied",
            LensError::SymbolNotFound { .. } => "symbol_not_found",
            LensError::InvalidDirectory { .. } => "invalid_directory",
            LensError::UnsupportedFormat { .. } => "unsupported_format",
            LensError::Internal { .. } => "internal",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
