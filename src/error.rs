//! Application error type.
//!
//! Exit codes:
//! - `2`: missing/unreadable input, bad configuration, malformed container
//! - `3`: not enough data to perform the requested analysis
//! - `4`: numerical or rendering failure

use std::path::Path;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    /// Input error tied to a file path (exit code 2).
    pub fn file(path: &Path, action: &str, err: impl std::fmt::Display) -> Self {
        Self::new(2, format!("Failed to {action} '{}': {err}", path.display()))
    }

    /// A required field is absent from a container (exit code 2).
    pub fn missing_field(path: &Path, field: &str) -> Self {
        Self::new(
            2,
            format!("Missing required field `{field}` in '{}'.", path.display()),
        )
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
