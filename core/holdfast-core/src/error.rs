//! Error types for holdfast-core operations.
//! Keep HoldfastFfiError minimal and stable to avoid breaking FFI clients.

use std::path::PathBuf;

// ═══════════════════════════════════════════════════════════════════════════════
// FFI-Compatible Error (for Swift/Kotlin/Python)
// ═══════════════════════════════════════════════════════════════════════════════

/// FFI-safe error type for use across language boundaries.
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum HoldfastFfiError {
    #[error("{message}")]
    General { message: String },
}

impl From<&str> for HoldfastFfiError {
    fn from(message: &str) -> Self {
        HoldfastFfiError::General {
            message: message.to_string(),
        }
    }
}

impl From<HoldfastError> for HoldfastFfiError {
    fn from(err: HoldfastError) -> Self {
        HoldfastFfiError::General {
            message: err.to_string(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Internal Error (for Rust-only use)
// ═══════════════════════════════════════════════════════════════════════════════

/// All errors that can occur in holdfast-core operations.
///
/// None of these are fatal to the hosting process. Each component catches
/// them at its boundary, logs, and falls back to stale or default data.
#[derive(Debug, thiserror::Error)]
pub enum HoldfastError {
    // ─────────────────────────────────────────────────────────────────────
    // Shared State Store
    // ─────────────────────────────────────────────────────────────────────
    #[error("Shared store unreachable for app groups {groups:?}: {reason}")]
    StoreUnreachable { groups: Vec<String>, reason: String },

    #[error("Invalid store key: {0}")]
    InvalidKey(String),

    #[error("Timed out after {waited_ms}ms waiting for store lock at {path}")]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    // ─────────────────────────────────────────────────────────────────────
    // Usage collection
    // ─────────────────────────────────────────────────────────────────────
    #[error("Monitored activities could not be enumerated: {0}")]
    EnumerationFailed(String),

    #[error("Usage report stream failed: {0}")]
    ReportStream(String),

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl HoldfastError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        HoldfastError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        HoldfastError::Json {
            context: context.into(),
            source,
        }
    }
}

/// Convenience type alias for Results using HoldfastError.
pub type Result<T> = std::result::Result<T, HoldfastError>;
