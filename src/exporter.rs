//! Export orchestration
//!
//! [`TimelapseExporter`] is the caller-facing seam: it sequences listing
//! resolution, the export trigger, the completion watch, and the download,
//! and maps every outcome to a typed result. A CLI wrapping this crate only
//! validates its arguments, calls [`TimelapseExporter::export`], and renders
//! the [`Outcome`](crate::Outcome) or [`Error`](crate::Error) it gets back.

use crate::config::Config;
use crate::connection::PrinterConnection;
use crate::download::download_artifact;
use crate::error::{Error, Result};
use crate::listing;
use crate::protocol::export_command;
use crate::types::{CompletionState, Event, ExportOptions, ExportRequest, Outcome, Target};
use crate::watcher::CompletionWatcher;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Triggers timelapse exports on one printer and retrieves the results
///
/// Cheap to clone; the HTTP client and event channel are shared.
#[derive(Clone)]
pub struct TimelapseExporter {
    config: Arc<Config>,
    client: reqwest::Client,
    event_tx: broadcast::Sender<Event>,
}

impl TimelapseExporter {
    /// Create an exporter for the printer described by `config`
    #[must_use]
    pub fn new(config: Config) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            config: Arc::new(config),
            client: reqwest::Client::new(),
            event_tx,
        }
    }

    /// Subscribe to progress events
    ///
    /// Delivery is best effort; a lagging or dropped receiver never affects
    /// the export.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The configuration this exporter was built with
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one export: trigger, watch for completion, and retrieve
    ///
    /// Returns [`Outcome::UrlReady`] in url-only mode, otherwise
    /// [`Outcome::Saved`] with the local file path. Fails with
    /// [`Error::TimedOut`] when neither completion signal arrives within
    /// `options.timeout` (no download is attempted), and with
    /// [`Error::Download`] when the artifact could not be retrieved after
    /// the configured retry budget.
    pub async fn export(&self, options: ExportOptions) -> Result<Outcome> {
        if self.config.host.is_empty() {
            return Err(Error::Config {
                message: "printer host is empty".to_string(),
                key: Some("host".to_string()),
            });
        }

        let target = self.resolve_target(&options.target).await?;
        let artifact_url = self.config.http_url(&target);

        let conn = PrinterConnection::connect(&self.config.ws_url()).await?;
        let writer = conn.writer.clone();

        // The trigger send completes before either watcher starts observing.
        let request = ExportRequest::new(&target);
        let watch = match writer.send_json(&export_command(&request)).await {
            Ok(()) => {
                tracing::info!(path = %target, request_id = %request.request_id, "export requested");
                self.event_tx
                    .send(Event::ExportRequested {
                        path: target.clone(),
                        request_id: request.request_id.clone(),
                    })
                    .ok();

                let watcher = CompletionWatcher::new(&self.config, &self.client, &self.event_tx);
                Ok(watcher
                    .wait(
                        conn,
                        &target,
                        &artifact_url,
                        options.timeout,
                        options.check,
                    )
                    .await)
            }
            Err(e) => Err(e),
        };

        // Closed on every exit path, success or failure.
        writer.close().await;
        let watch = watch?;

        if watch.state == CompletionState::TimedOut {
            return Err(Error::TimedOut {
                waited: options.timeout,
                target,
            });
        }

        tracing::info!(url = %artifact_url, state = ?watch.state, "timelapse ready");
        self.event_tx
            .send(Event::ArtifactReady {
                url: artifact_url.clone(),
            })
            .ok();
        if options.check && !watch.http_verified {
            tracing::warn!(
                url = %artifact_url,
                "printer reported the export ready but the artifact is not downloadable yet"
            );
        }

        if options.url_only {
            return Ok(Outcome::UrlReady { url: artifact_url });
        }

        let file_name = Path::new(&target)
            .file_name()
            .ok_or_else(|| Error::Config {
                message: format!("target path {target} has no file name"),
                key: Some("target".to_string()),
            })?;
        tokio::fs::create_dir_all(&options.out_dir).await?;
        let dest = options.out_dir.join(file_name);

        download_artifact(
            &self.client,
            &self.config,
            &artifact_url,
            &dest,
            &self.event_tx,
        )
        .await?;

        tracing::info!(path = %dest.display(), "timelapse saved");
        self.event_tx.send(Event::Saved { path: dest.clone() }).ok();

        Ok(Outcome::Saved {
            path: dest,
            url: artifact_url,
        })
    }

    /// Turn the caller's target into an absolute artifact path
    async fn resolve_target(&self, target: &Target) -> Result<String> {
        match target {
            Target::Latest => listing::resolve_latest(&self.client, &self.config).await,
            Target::Path(p) if p.is_empty() => Err(Error::Config {
                message: "target path is empty".to_string(),
                key: Some("target".to_string()),
            }),
            Target::Path(p) if p.starts_with('/') => Ok(p.clone()),
            Target::Path(p) => {
                // A bare name as shown by the printer UI lives under the
                // listing path.
                if self.config.listing_path.ends_with('/') {
                    Ok(format!("{}{}", self.config.listing_path, p))
                } else {
                    Ok(format!("{}/{}", self.config.listing_path, p))
                }
            }
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn absolute_explicit_target_is_used_as_is() {
        let exporter = TimelapseExporter::new(Config::new("printer.local"));
        let target = exporter
            .resolve_target(&Target::Path("/local/aic_tlp/NAME.mp4".to_string()))
            .await
            .unwrap();
        assert_eq!(target, "/local/aic_tlp/NAME.mp4");
    }

    #[tokio::test]
    async fn bare_explicit_target_joins_the_listing_path() {
        let exporter = TimelapseExporter::new(Config::new("printer.local"));
        let target = exporter
            .resolve_target(&Target::Path("NAME.mp4".to_string()))
            .await
            .unwrap();
        assert_eq!(target, "/local/aic_tlp/NAME.mp4");
    }

    #[tokio::test]
    async fn bare_target_joins_cleanly_without_a_trailing_slash() {
        let config = Config {
            listing_path: "/local/aic_tlp".to_string(),
            ..Config::new("printer.local")
        };
        let exporter = TimelapseExporter::new(config);
        let target = exporter
            .resolve_target(&Target::Path("NAME.mp4".to_string()))
            .await
            .unwrap();
        assert_eq!(target, "/local/aic_tlp/NAME.mp4");
    }

    #[tokio::test]
    async fn empty_explicit_target_is_misuse() {
        let exporter = TimelapseExporter::new(Config::new("printer.local"));
        let err = exporter
            .resolve_target(&Target::Path(String::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn empty_host_is_misuse() {
        let exporter = TimelapseExporter::new(Config::default());
        let err = exporter.export(ExportOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
