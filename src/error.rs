//! # Error Types
//!
//! This module provides the error types used throughout the tsio library.
//! It defines a central error type `TsioError` that encapsulates all
//! failures that can occur while assembling and writing transport streams.
//!
//! ## Example Usage
//!
//! ```rust
//! use tsio::error::{Result, TsioError};
//!
//! fn check_access_unit(data: &[u8]) -> Result<()> {
//!     if data.is_empty() {
//!         return Err(TsioError::InvalidData("empty access unit".to_string()));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Primary error type for the tsio library
#[derive(Error, Debug)]
pub enum TsioError {
    /// I/O errors that occur while writing segments or playlists
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors related to codec configuration records
    #[error("codec error: {0}")]
    Codec(String),

    /// Errors that occur while parsing binary structures
    #[error("parser error: {0}")]
    Parser(String),

    /// Errors for invalid or malformed input data
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// A specialized Result type for tsio operations.
pub type Result<T> = std::result::Result<T, TsioError>;
