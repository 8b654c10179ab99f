//! Completion detection for a running export
//!
//! Two independent signal sources race to decide that the artifact is ready:
//! the printer's push confirmation on the control connection, and active
//! existence polling of the artifact URL. A keepalive task pings the control
//! connection for the lifetime of the watch so the printer does not close it
//! as idle. Whichever signal lands first wins; the loser is cancelled and
//! joined. Neither signal before the deadline means the watch timed out —
//! the only failure outcome, and the caller's to handle.

use crate::config::{Config, PollConfig};
use crate::connection::{ConnectionWriter, MessageReader, PrinterConnection, Received};
use crate::protocol::{KEEPALIVE_TEXT, decode_export_notice};
use crate::race::first_within;
use crate::types::{CompletionState, Event, WatchOutcome};
use futures::FutureExt;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;

/// Slack added to the keepalive interval for each bounded receive, so a
/// healthy connection that simply has no traffic never reads as dead.
const RECV_GRACE: Duration = Duration::from_secs(10);

/// Timeout for the optional post-hoc existence probe
const VERIFY_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Watches one export until it completes or the deadline elapses
pub(crate) struct CompletionWatcher<'a> {
    config: &'a Config,
    client: &'a reqwest::Client,
    event_tx: &'a broadcast::Sender<Event>,
}

impl<'a> CompletionWatcher<'a> {
    pub(crate) fn new(
        config: &'a Config,
        client: &'a reqwest::Client,
        event_tx: &'a broadcast::Sender<Event>,
    ) -> Self {
        Self {
            config,
            client,
            event_tx,
        }
    }

    /// Wait for the artifact to become available
    ///
    /// Consumes the connection's read half; the export trigger must already
    /// have been sent. With `check` set and a push-only confirmation, one
    /// extra probe annotates the outcome without changing its state.
    pub(crate) async fn wait(
        &self,
        conn: PrinterConnection,
        target: &str,
        artifact_url: &str,
        deadline: Duration,
        check: bool,
    ) -> WatchOutcome {
        let keepalive_task = tokio::spawn(keepalive(conn.writer.clone(), self.config.ping_interval));

        let push = watch_push(
            conn.reader,
            target.to_string(),
            self.config.ping_interval + RECV_GRACE,
            self.event_tx.clone(),
        )
        .boxed();
        let poll = watch_poll(
            self.client.clone(),
            artifact_url.to_string(),
            target.to_string(),
            self.config.poll.clone(),
            self.event_tx.clone(),
        )
        .boxed();

        let winner = first_within(deadline, vec![push, poll]).await;

        // The watch owns the keepalive; nothing may outlive the wait.
        keepalive_task.abort();
        let _ = keepalive_task.await;

        match winner {
            Some(state) => {
                let mut http_verified = state == CompletionState::ConfirmedByPoll;
                if check && !http_verified {
                    http_verified =
                        probe_exists(self.client, artifact_url, VERIFY_PROBE_TIMEOUT).await;
                }
                WatchOutcome {
                    state,
                    http_verified,
                }
            }
            None => {
                tracing::warn!(path = %target, deadline = ?deadline, "export watch timed out");
                self.event_tx
                    .send(Event::WatchTimedOut {
                        path: target.to_string(),
                    })
                    .ok();
                WatchOutcome {
                    state: CompletionState::TimedOut,
                    http_verified: false,
                }
            }
        }
    }
}

/// Push contender: match confirmations on the control connection
///
/// Withdraws (returns `None`) when the connection dies; the poll contender
/// keeps racing.
async fn watch_push(
    mut reader: MessageReader,
    target: String,
    bound: Duration,
    event_tx: broadcast::Sender<Event>,
) -> Option<CompletionState> {
    loop {
        match reader.recv_bounded(bound).await {
            Received::Idle | Received::Frame => continue,
            Received::Gone => {
                tracing::debug!("control connection gone; push watcher withdrawing");
                return None;
            }
            Received::Text(text) => {
                let Some(notice) = decode_export_notice(&text) else {
                    continue;
                };
                if notice.path == target {
                    tracing::debug!(path = %notice.path, "push confirmation received");
                    event_tx
                        .send(Event::ConfirmedByPush {
                            path: notice.path,
                        })
                        .ok();
                    return Some(CompletionState::ConfirmedByPush);
                }
                tracing::debug!(
                    path = %notice.path,
                    wanted = %target,
                    "confirmation for a different artifact, still waiting"
                );
            }
        }
    }
}

/// Poll contender: probe the artifact URL with multiplicative backoff
///
/// Runs until it confirms or the race deadline cancels it.
async fn watch_poll(
    client: reqwest::Client,
    url: String,
    target: String,
    poll: PollConfig,
    event_tx: broadcast::Sender<Event>,
) -> Option<CompletionState> {
    let mut delay = poll.initial_delay;
    loop {
        if probe_exists(&client, &url, poll.probe_timeout).await {
            tracing::debug!(url = %url, "existence probe confirmed the artifact");
            event_tx.send(Event::ConfirmedByPoll { path: target }).ok();
            return Some(CompletionState::ConfirmedByPoll);
        }
        sleep(delay).await;
        delay = Duration::from_secs_f64(delay.as_secs_f64() * poll.multiplier).min(poll.max_delay);
    }
}

/// One existence probe: any 2xx is "exists", everything else (timeouts
/// included) is "not yet"
pub(crate) async fn probe_exists(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    match client.get(url).timeout(timeout).send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}

/// Ping the control connection on a fixed interval
///
/// Send failure silently ends the task; the watch outcome is unaffected.
async fn keepalive(writer: ConnectionWriter, interval: Duration) {
    loop {
        sleep(interval).await;
        if writer.send_text(KEEPALIVE_TEXT).await.is_err() {
            return;
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn probe_treats_2xx_as_exists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/local/aic_tlp/A.mp4"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/local/aic_tlp/A.mp4", server.uri());
        assert!(probe_exists(&client, &url, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn probe_treats_404_as_not_yet() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/local/aic_tlp/A.mp4"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/local/aic_tlp/A.mp4", server.uri());
        assert!(!probe_exists(&client, &url, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn probe_treats_timeout_as_not_yet() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow.mp4"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/slow.mp4", server.uri());
        assert!(!probe_exists(&client, &url, Duration::from_millis(100)).await);
    }

    #[tokio::test]
    async fn poll_watcher_confirms_once_the_artifact_appears() {
        let server = MockServer::start().await;
        // First two probes miss, the third finds the artifact.
        Mock::given(method("GET"))
            .and(path("/local/aic_tlp/A.mp4"))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/local/aic_tlp/A.mp4"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/local/aic_tlp/A.mp4", server.uri());
        let poll = PollConfig {
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(50),
            multiplier: 1.5,
            probe_timeout: Duration::from_secs(1),
        };
        let (event_tx, mut event_rx) = broadcast::channel(16);

        let state = watch_poll(
            client,
            url,
            "/local/aic_tlp/A.mp4".to_string(),
            poll,
            event_tx,
        )
        .await;

        assert_eq!(state, Some(CompletionState::ConfirmedByPoll));
        assert!(matches!(
            event_rx.try_recv(),
            Ok(Event::ConfirmedByPoll { path }) if path == "/local/aic_tlp/A.mp4"
        ));
    }
}
