//! Artifact download
//!
//! Streams the finished artifact to disk in chunks, with bounded retries
//! around the whole attempt. Attempts are all-or-nothing: a failed attempt
//! leaves a truncated file that the next attempt recreates from scratch —
//! there is no partial resume.

use crate::config::Config;
use crate::error::{DownloadError, Error, Result};
use crate::retry::retry_with_backoff;
use crate::types::Event;
use futures::StreamExt;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;

/// Download the artifact at `url` to `dest`, overwriting any existing file
///
/// Retries per the configured budget with capped multiplicative backoff;
/// after the final attempt fails, the returned [`DownloadError`] carries the
/// last underlying cause.
pub(crate) async fn download_artifact(
    client: &reqwest::Client,
    config: &Config,
    url: &str,
    dest: &Path,
    event_tx: &broadcast::Sender<Event>,
) -> Result<()> {
    let attempt = AtomicU32::new(0);

    let result = retry_with_backoff(&config.retry, || {
        let n = attempt.fetch_add(1, Ordering::SeqCst) + 1;
        if n == 1 {
            event_tx
                .send(Event::DownloadStarted {
                    url: url.to_string(),
                })
                .ok();
        } else {
            event_tx
                .send(Event::DownloadRetried {
                    url: url.to_string(),
                    attempt: n,
                })
                .ok();
        }
        tracing::debug!(url = %url, dest = %dest.display(), attempt = n, "downloading artifact");
        fetch_to_file(client, url, dest, config.download_timeout)
    })
    .await;

    result.map_err(|e| {
        Error::Download(DownloadError::RetriesExhausted {
            url: url.to_string(),
            attempts: attempt.load(Ordering::SeqCst),
            source: Box::new(e),
        })
    })
}

/// One download attempt: stream the response body into a freshly created file
async fn fetch_to_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    timeout: Duration,
) -> Result<()> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?;

    let mut stream = response.bytes_stream();
    let mut file = File::create(dest).await?;
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;

    Ok(())
}
