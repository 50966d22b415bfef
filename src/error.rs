//! Error types for durakv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for durakv operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Transaction Log Errors
    // -------------------------------------------------------------------------
    /// A write of event `sequence` failed (after one retry). Fatal.
    #[error("log write failed at sequence {sequence}: {source}")]
    LogWrite {
        sequence: u64,
        #[source]
        source: std::io::Error,
    },

    /// Records up to `sequence` are written but fsync failed, so they may
    /// not survive a power loss. Fatal.
    #[error("log sync failed after sequence {sequence}: {source}")]
    LogSync {
        sequence: u64,
        #[source]
        source: std::io::Error,
    },

    /// A record could not be decoded during replay. Fatal.
    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    /// The pipeline hit a write failure earlier and no longer persists events.
    #[error("transaction logger has failed; events are no longer durable")]
    LoggerFailed,

    #[error("transaction logger is closed")]
    LoggerClosed,

    #[error("invalid logger state: {0}")]
    InvalidState(String),

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    KeyNotFound,

    #[error("Key must not be empty")]
    EmptyKey,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KvError {
    /// True for errors after which the process can no longer guarantee durability.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            KvError::Io(_)
                | KvError::LogWrite { .. }
                | KvError::LogSync { .. }
                | KvError::MalformedRecord { .. }
                | KvError::LoggerFailed
        )
    }
}
