//! End-to-end export flow against a mock printer.
//!
//! The mock printer is two halves, matching the real device: a WebSocket
//! control endpoint (a local accept loop that answers export triggers) and
//! an HTTP file server (wiremock) hosting the listing page and artifacts.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tempfile::TempDir;
use timelapse_dl::{
    Config, Error, Event, ExportOptions, Outcome, PollConfig, Target, TimelapseExporter,
    ToExitCode,
};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// How the mock control endpoint answers an export trigger
#[derive(Clone, Copy)]
enum ControlBehavior {
    /// Confirm the triggered path
    Confirm,
    /// Confirm a different path, then stay silent
    ConfirmWrongPath,
    /// Accept the trigger and stay silent
    Silent,
}

/// Start a control endpoint on an ephemeral port
///
/// Accepts one connection, reads frames forever (ignoring pings), and
/// responds to the export trigger per `behavior`. The connection stays open
/// so the push watcher can keep listening.
async fn spawn_control_endpoint(behavior: ControlBehavior) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = accept_async(stream).await else {
            return;
        };

        while let Some(Ok(message)) = ws.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            if text == "ping" {
                continue;
            }
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
                continue;
            };
            if value["Data"]["Cmd"] != 323 {
                continue;
            }

            let confirmed_path = match behavior {
                ControlBehavior::Silent => continue,
                ControlBehavior::Confirm => value["Data"]["Data"]["Url"][0]
                    .as_str()
                    .unwrap()
                    .to_string(),
                ControlBehavior::ConfirmWrongPath => "/local/aic_tlp/OTHER.mp4".to_string(),
            };
            let reply = serde_json::json!({
                "Id": "",
                "Data": {
                    "Cmd": 323,
                    "Data": {"Url": [confirmed_path]},
                    "RequestID": "deadbeefdeadbeefdeadbeefdeadbeef"
                }
            });
            ws.send(Message::Text(reply.to_string())).await.ok();
        }
    });

    port
}

/// Config pointing both halves of the exporter at the mocks
fn mock_config(http: &MockServer, ws_port: u16) -> Config {
    let uri = http.uri();
    let addr = uri.strip_prefix("http://").unwrap();
    let (host, http_port) = addr.split_once(':').unwrap();
    Config {
        ws_port,
        http_port: http_port.parse().unwrap(),
        poll: PollConfig {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(100),
            multiplier: 1.5,
            probe_timeout: Duration::from_secs(1),
        },
        ..Config::new(host)
    }
}

fn listing_page() -> String {
    r#"<html><table>
<tr><td><a href="/local/aic_tlp/A/">A/</a></td><td name="100">yesterday</td></tr>
<tr><td><a href="/local/aic_tlp/B/">B/</a></td><td name="200">today</td></tr>
</table></html>"#
        .to_string()
}

fn drain(events: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

#[tokio::test]
async fn latest_export_resolves_downloads_and_saves_the_newest_artifact() {
    let http = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/local/aic_tlp/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page()))
        .mount(&http)
        .await;
    Mock::given(method("GET"))
        .and(path("/local/aic_tlp/B.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"timelapse-video".to_vec()))
        .mount(&http)
        .await;

    let ws_port = spawn_control_endpoint(ControlBehavior::Confirm).await;
    let out_dir = TempDir::new().unwrap();

    let exporter = TimelapseExporter::new(mock_config(&http, ws_port));
    let mut events = exporter.subscribe();

    let outcome = exporter
        .export(ExportOptions {
            target: Target::Latest,
            timeout: Duration::from_secs(10),
            out_dir: out_dir.path().to_path_buf(),
            ..ExportOptions::default()
        })
        .await
        .unwrap();

    let saved_path = out_dir.path().join("B.mp4");
    match outcome {
        Outcome::Saved { path, url } => {
            assert_eq!(path, saved_path);
            assert!(url.ends_with("/local/aic_tlp/B.mp4"), "url: {url}");
        }
        other => panic!("expected Saved, got {other:?}"),
    }
    assert_eq!(std::fs::read(&saved_path).unwrap(), b"timelapse-video");

    let drained = drain(&mut events);
    assert!(
        drained
            .iter()
            .any(|e| matches!(e, Event::ExportRequested { path, .. } if path == "/local/aic_tlp/B.mp4")),
        "events: {drained:?}"
    );
    assert!(
        drained.iter().any(|e| matches!(e, Event::Saved { .. })),
        "events: {drained:?}"
    );
}

#[tokio::test]
async fn push_confirmation_alone_is_enough_in_url_only_mode() {
    // The artifact is never downloadable over HTTP (every probe 404s), so
    // only the push signal can finish the watch.
    let http = MockServer::start().await;
    let ws_port = spawn_control_endpoint(ControlBehavior::Confirm).await;

    let exporter = TimelapseExporter::new(mock_config(&http, ws_port));
    let mut events = exporter.subscribe();

    let outcome = exporter
        .export(ExportOptions {
            target: Target::Path("NAME.mp4".to_string()),
            timeout: Duration::from_secs(10),
            url_only: true,
            ..ExportOptions::default()
        })
        .await
        .unwrap();

    match outcome {
        Outcome::UrlReady { url } => {
            assert!(url.ends_with("/local/aic_tlp/NAME.mp4"), "url: {url}");
        }
        other => panic!("expected UrlReady, got {other:?}"),
    }

    let drained = drain(&mut events);
    assert!(
        drained
            .iter()
            .any(|e| matches!(e, Event::ConfirmedByPush { path } if path == "/local/aic_tlp/NAME.mp4")),
        "events: {drained:?}"
    );
    assert!(
        !drained
            .iter()
            .any(|e| matches!(e, Event::DownloadStarted { .. })),
        "url-only mode must not download, events: {drained:?}"
    );
}

#[tokio::test]
async fn deadline_with_no_signals_times_out_and_writes_nothing() {
    let http = MockServer::start().await;
    let ws_port = spawn_control_endpoint(ControlBehavior::Silent).await;
    let out_dir = TempDir::new().unwrap();

    let exporter = TimelapseExporter::new(mock_config(&http, ws_port));

    let err = exporter
        .export(ExportOptions {
            target: Target::Path("/local/aic_tlp/NAME.mp4".to_string()),
            timeout: Duration::from_millis(800),
            out_dir: out_dir.path().to_path_buf(),
            ..ExportOptions::default()
        })
        .await
        .unwrap_err();

    match &err {
        Error::TimedOut { waited, target } => {
            assert_eq!(*waited, Duration::from_millis(800));
            assert_eq!(target, "/local/aic_tlp/NAME.mp4");
        }
        other => panic!("expected TimedOut, got {other:?}"),
    }
    assert_eq!(err.exit_code(), 1);

    assert!(
        std::fs::read_dir(out_dir.path()).unwrap().next().is_none(),
        "timeout must not leave files behind"
    );
}

#[tokio::test]
async fn confirmation_for_a_different_path_never_completes_the_watch() {
    let http = MockServer::start().await;
    let ws_port = spawn_control_endpoint(ControlBehavior::ConfirmWrongPath).await;

    let exporter = TimelapseExporter::new(mock_config(&http, ws_port));
    let mut events = exporter.subscribe();

    let err = exporter
        .export(ExportOptions {
            target: Target::Path("/local/aic_tlp/NAME.mp4".to_string()),
            timeout: Duration::from_millis(800),
            url_only: true,
            ..ExportOptions::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::TimedOut { .. }), "got {err:?}");

    let drained = drain(&mut events);
    assert!(
        !drained
            .iter()
            .any(|e| matches!(e, Event::ConfirmedByPush { .. })),
        "a foreign confirmation must not count, events: {drained:?}"
    );
}

#[tokio::test]
async fn poll_confirmation_rescues_a_silent_control_connection() {
    // The control endpoint confirms nothing; the artifact appears over HTTP
    // after a couple of probes, so the poll watcher finishes the export.
    let http = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/local/aic_tlp/NAME.mp4"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(2)
        .mount(&http)
        .await;
    Mock::given(method("GET"))
        .and(path("/local/aic_tlp/NAME.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"late".to_vec()))
        .mount(&http)
        .await;

    let ws_port = spawn_control_endpoint(ControlBehavior::Silent).await;
    let out_dir = TempDir::new().unwrap();

    let exporter = TimelapseExporter::new(mock_config(&http, ws_port));
    let mut events = exporter.subscribe();

    let outcome = exporter
        .export(ExportOptions {
            target: Target::Path("NAME.mp4".to_string()),
            timeout: Duration::from_secs(10),
            out_dir: out_dir.path().to_path_buf(),
            ..ExportOptions::default()
        })
        .await
        .unwrap();

    assert!(matches!(outcome, Outcome::Saved { .. }));
    assert_eq!(
        std::fs::read(out_dir.path().join("NAME.mp4")).unwrap(),
        b"late"
    );

    let drained = drain(&mut events);
    assert!(
        drained
            .iter()
            .any(|e| matches!(e, Event::ConfirmedByPoll { .. })),
        "events: {drained:?}"
    );
}
