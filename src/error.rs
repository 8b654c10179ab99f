//! Error types for timelapse-dl
//!
//! This module provides the error taxonomy for the library:
//! - Domain-specific error types (Resolution, Download)
//! - Process exit-code mapping for CLI integration
//! - Conversions from the transport layers (HTTP, WebSocket, I/O)

use std::time::Duration;
use thiserror::Error;

/// Result type alias for timelapse-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for timelapse-dl
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration or request error with context about which input is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the issue
        message: String,
        /// The configuration key or option that caused the error (e.g., "target")
        key: Option<String>,
    },

    /// Listing resolution failed (page unreachable or no usable entries)
    #[error("resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// WebSocket connection unreachable or dropped
    #[error("connection error: {0}")]
    Connection(#[from] tokio_tungstenite::tungstenite::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The completion watch reached its deadline with neither signal
    #[error("timed out after {waited:?} waiting for {target}")]
    TimedOut {
        /// How long the watch ran before giving up
        waited: Duration,
        /// The artifact path that never became available
        target: String,
    },

    /// Download-related error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),
}

/// Listing resolution errors
///
/// Both variants are fatal and surfaced immediately; resolution is never retried.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The listing page could not be fetched (network failure, timeout, or non-2xx)
    #[error("failed to fetch listing {url}: {reason}")]
    FetchFailed {
        /// The listing page URL that was requested
        url: String,
        /// The underlying failure description
        reason: String,
    },

    /// The listing page contained no rows with a usable link and modification ordinal
    #[error("no usable entries on listing page {url}")]
    NoEntries {
        /// The listing page URL that was parsed
        url: String,
    },
}

/// Download errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// All download attempts failed; carries the last underlying cause
    #[error("download failed for {url} after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// The artifact URL that could not be downloaded
        url: String,
        /// Total attempts made (initial try plus retries)
        attempts: u32,
        /// The error from the final attempt
        #[source]
        source: Box<Error>,
    },
}

/// Trait for mapping errors to process exit codes
///
/// The library has no CLI of its own, but callers that do need to distinguish
/// "timed out waiting" from "download failed" from misuse when reporting to a
/// shell. This centralizes that mapping.
pub trait ToExitCode {
    /// Get the process exit code for this error
    fn exit_code(&self) -> i32;
}

impl ToExitCode for Error {
    fn exit_code(&self) -> i32 {
        match self {
            // 2 - misuse (missing/invalid input) and exhausted downloads
            Error::Config { .. } => 2,
            Error::Download(_) => 2,

            // 1 - everything the remote side failed to deliver
            Error::Resolution(_) => 1,
            Error::TimedOut { .. } => 1,
            Error::Connection(_) => 1,
            Error::Network(_) => 1,
            Error::Io(_) => 1,
            Error::Serialization(_) => 1,
        }
    }
}
