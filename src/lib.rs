//! # timelapse-dl
//!
//! Client library for exporting and downloading timelapse videos from
//! Centauri-series 3D printers.
//!
//! The printer renders timelapses on demand: a command on its WebSocket
//! control channel starts the export, and the finished MP4 appears on its
//! HTTP file server some time later. This crate sends the trigger, then
//! races the printer's push confirmation against active existence polling to
//! detect completion as early as either signal allows, and finally streams
//! the artifact to disk with bounded retries.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Two completion signals** - Push and poll race; whichever lands first
//!   wins, and a dead control connection never stalls the wait
//! - **Event-driven** - Consumers subscribe to progress events, no polling
//!   of library state required
//!
//! ## Quick Start
//!
//! ```no_run
//! use timelapse_dl::{Config, ExportOptions, Target, TimelapseExporter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let exporter = TimelapseExporter::new(Config::new("192.168.1.50"));
//!
//!     // Subscribe to progress events
//!     let mut events = exporter.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Export the most recent timelapse and save it here
//!     let outcome = exporter
//!         .export(ExportOptions {
//!             target: Target::Latest,
//!             ..ExportOptions::default()
//!         })
//!         .await?;
//!     println!("{:?}", outcome);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Persistent WebSocket connection to the printer
mod connection;
/// Artifact download with bounded retries
mod download;
/// Error types
pub mod error;
/// Export orchestration
pub mod exporter;
/// Listing-page resolution
pub mod listing;
/// Wire protocol for the control channel
mod protocol;
/// Deadline-bounded racing of cooperative tasks
pub mod race;
/// Retry logic with capped exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Completion detection for a running export
mod watcher;

// Re-export commonly used types
pub use config::{Config, PollConfig, RetryConfig};
pub use error::{DownloadError, Error, ResolutionError, Result, ToExitCode};
pub use exporter::TimelapseExporter;
pub use listing::{ListingEntry, resolve_latest};
pub use race::first_within;
pub use types::{
    CompletionState, Event, ExportOptions, ExportRequest, Outcome, Target, WatchOutcome,
};
