//! JSON rendering of operation results.
//!
//! A successful operation renders as its serialized value. A failure renders
//! as an object whose `error` field holds the human-readable message:
//!
//! ```json
//! {"error": "not found: pkg/missing.py", "kind": "not_found", "code": 3}
//! ```

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::error::{LensError, OutputErrorCode};

/// Error object returned in place of a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable message.
    pub error: String,
    /// Taxonomy identifier (`not_found`, `syntax_error`, ...).
    pub kind: String,
    /// Numeric error code.
    pub code: u8,
    /// Error-specific structured data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    /// Create from a LensError.
    pub fn from_error(err: &LensError) -> Self {
        let details = match err {
            LensError::InvalidArguments { details, .. } => details.clone(),
            LensError::NotFound { path }
            | LensError::NotSourceFile { path }
            | LensError::PermissionDenied { path } => Some(serde_json::json!({ "path": path })),
            LensError::SyntaxError {
                path, line, col, ..
            } => Some(serde_json::json!({ "path": path, "line": line, "col": col })),
            LensError::SymbolNotFound { kind, name, path } => Some(serde_json::json!({
                "symbol_kind": kind,
                "name": name,
                "path": path,
            })),
            _ => None,
        };
        ErrorResponse {
            error: err.to_string(),
            kind: err.kind().to_string(),
            code: OutputErrorCode::from(err).code(),
            details,
        }
    }
}

/// Render any operation result as a JSON value.
pub fn render_result<T: Serialize>(result: Result<T, LensError>) -> serde_json::Value {
    match result {
        Ok(value) => match serde_json::to_value(value) {
            Ok(json) => json,
            Err(err) => error_value(&LensError::internal(format!(
                "failed to serialize result: {}",
                err
            ))),
        },
        Err(err) => error_value(&err),
    }
}

/// Render an error as a JSON value.
pub fn error_value(err: &LensError) -> serde_json::Value {
    serde_json::to_value(ErrorResponse::from_error(err))
        .unwrap_or_else(|_| serde_json::json!({ "error": err.to_string() }))
}

/// Whether a rendered value is an error response.
pub fn is_error_value(value: &serde_json::Value) -> bool {
    value.get("error").is_some_and(|e| e.is_string())
}

/// Write a value as pretty JSON followed by a newline.
pub fn emit_json<W: Write>(writer: &mut W, value: &serde_json::Value) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *writer, value)?;
    writeln!(writer)
}
