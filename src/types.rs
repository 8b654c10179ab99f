//! Core types and events for timelapse-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// One export job, created per invocation
///
/// Identifies a single export of one artifact. The request id is an opaque
/// unique token sent with the trigger message; the printer echoes a
/// `RequestID` on its confirmations, but matching is done by artifact path
/// alone (see `watcher`), so the id here is purely for correlation in logs.
#[derive(Clone, Debug)]
pub struct ExportRequest {
    /// Absolute artifact path on the printer, e.g. `/local/aic_tlp/A.mp4`
    pub target: String,
    /// Unique hex token identifying this request
    pub request_id: String,
    /// When the request was created
    pub issued_at: DateTime<Utc>,
}

impl ExportRequest {
    /// Create a request for the given artifact path
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            request_id: uuid::Uuid::new_v4().simple().to_string(),
            issued_at: Utc::now(),
        }
    }
}

/// Which artifact to export
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// Export the most recently modified entry on the listing page
    Latest,
    /// Export a named artifact
    ///
    /// An absolute path (leading `/`) is used as-is; a bare name as shown by
    /// the printer UI is joined onto the configured listing path.
    Path(String),
}

/// A fully-validated export invocation
///
/// This is the caller-facing seam: a CLI (or any other frontend) validates
/// its inputs and hands the library one of these.
#[derive(Clone, Debug)]
pub struct ExportOptions {
    /// Which artifact to export
    pub target: Target,
    /// Probe the artifact URL once more after a push-only confirmation
    pub check: bool,
    /// Overall deadline for the completion watch
    pub timeout: Duration,
    /// Directory the artifact is saved into
    pub out_dir: PathBuf,
    /// Report the download URL without downloading
    pub url_only: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            target: Target::Latest,
            check: false,
            timeout: Duration::from_secs(180),
            out_dir: PathBuf::from("."),
            url_only: false,
        }
    }
}

/// State of one completion watch
///
/// Transitions only move forward; `ConfirmedByPush`, `ConfirmedByPoll` and
/// `TimedOut` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionState {
    /// Neither signal observed yet
    Pending,
    /// The printer pushed a confirmation for the requested path
    ConfirmedByPush,
    /// An existence probe found the artifact downloadable
    ConfirmedByPoll,
    /// The deadline elapsed with neither signal
    TimedOut,
}

/// Result of one completion watch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatchOutcome {
    /// Terminal state the watch reached
    pub state: CompletionState,
    /// Whether an HTTP probe has confirmed the artifact is downloadable
    ///
    /// True when the poll path won, or when the optional post-hoc probe after
    /// a push confirmation succeeded. Annotation only; never changes `state`.
    pub http_verified: bool,
}

/// Successful outcome of an export invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The artifact is downloadable at `url`; nothing was written locally
    UrlReady {
        /// Download URL on the printer's file server
        url: String,
    },
    /// The artifact was downloaded
    Saved {
        /// Local path of the saved file
        path: PathBuf,
        /// Download URL it was fetched from
        url: String,
    },
}

/// Progress events emitted during an export
///
/// Best-effort broadcast; consumers subscribe via
/// [`TimelapseExporter::subscribe`](crate::TimelapseExporter::subscribe).
/// Dropped receivers never block the export.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// The export trigger was sent to the printer
    ExportRequested {
        /// Requested artifact path
        path: String,
        /// Request token included in the trigger
        request_id: String,
    },

    /// The printer pushed a confirmation for the requested path
    ConfirmedByPush {
        /// Confirmed artifact path
        path: String,
    },

    /// An existence probe found the artifact downloadable
    ConfirmedByPoll {
        /// Confirmed artifact path
        path: String,
    },

    /// The artifact is ready for download
    ArtifactReady {
        /// Download URL on the printer's file server
        url: String,
    },

    /// A download attempt started
    DownloadStarted {
        /// Download URL being fetched
        url: String,
    },

    /// A previous download attempt failed; another one is starting
    DownloadRetried {
        /// Download URL being fetched
        url: String,
        /// The attempt number now starting (1-based)
        attempt: u32,
    },

    /// The artifact was written to disk
    Saved {
        /// Local path of the saved file
        path: PathBuf,
    },

    /// The completion watch reached its deadline
    WatchTimedOut {
        /// Requested artifact path
        path: String,
    },
}
