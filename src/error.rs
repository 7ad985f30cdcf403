//! # Error Types
//!
//! This module defines error types used throughout the espejo library.
//!
//! Fetch-level outcomes (too large, bad format, cannot read) are not errors
//! in this sense; they are ordinary results delivered to waiters and live in
//! [`crate::fetch`].

use thiserror::Error;

/// Main error type for espejo operations
#[derive(Debug, Error)]
pub enum EspejoError {
    /// Server-level errors (bind, listen, shutdown)
    #[error("Server error: {0}")]
    Server(String),

    /// Invalid configuration (bad referer pattern, bad option value)
    #[error("Config error: {0}")]
    Config(String),

    /// Image processing error
    #[error("Image error: {0}")]
    Image(String),

    /// Resize pool error (workers gone, channel closed)
    #[error("Resize pool error: {0}")]
    Pool(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
