//! Error types for ringfs
//!
//! Every failure a caller can observe is an [`IoError`]: the native status
//! code an operation completed with, plus the engine's description of it.
//! There is no finer taxonomy; "not found" and "permission denied" differ
//! only in their status and message.

use thiserror::Error;

/// Result type for ringfs operations
pub type Result<T> = std::result::Result<T, IoError>;

/// A failed filesystem operation
///
/// Built only by [`ErrorMapper::from_status`], so the message always comes
/// from the engine that produced the status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct IoError {
    /// Native status code (negative errno for the bundled engines)
    status: i32,
    /// Human-readable description of `status`
    message: String,
}

impl IoError {
    /// Native status code the operation failed with
    #[must_use]
    pub const fn status(&self) -> i32 {
        self.status
    }

    /// Description of the status, as rendered by the engine
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Converts native failure statuses into [`IoError`]s
///
/// Stateless apart from the engine's error-to-string function, which is
/// captured when the filesystem is constructed.
#[derive(Clone, Copy)]
pub struct ErrorMapper {
    /// The engine's error-description facility
    strerror: fn(i32) -> String,
}

impl ErrorMapper {
    /// Create a mapper around an engine's error-description function
    #[must_use]
    pub const fn new(strerror: fn(i32) -> String) -> Self {
        Self { strerror }
    }

    /// Build the error for a native status
    ///
    /// Never fails. Any integer is accepted; the engine decides how to
    /// describe codes it does not know.
    #[must_use]
    pub fn from_status(&self, status: i32) -> IoError {
        IoError {
            status,
            message: (self.strerror)(status),
        }
    }
}

impl std::fmt::Debug for ErrorMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorMapper").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_uses_engine_message() {
        let mapper = ErrorMapper::new(ringfs_uring::status::strerror);
        let error = mapper.from_status(-libc::ENOENT);

        assert_eq!(error.status(), -libc::ENOENT);
        assert_eq!(error.message(), "No such file or directory");
        assert_eq!(error.to_string(), "No such file or directory");
    }

    #[test]
    fn test_from_status_is_total() {
        let mapper = ErrorMapper::new(|code| format!("code {code}"));

        for code in [i32::MIN, -1, 0, 1, i32::MAX] {
            assert_eq!(mapper.from_status(code).message(), format!("code {code}"));
        }
    }
}
