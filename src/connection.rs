//! Persistent WebSocket connection to the printer
//!
//! The stream is split on connect: the write half lives behind a shared
//! handle (the trigger send, the keepalive task, and the final close all
//! write through it, serialized by a mutex), while the read half is owned by
//! exactly one consumer — the push watcher.

use crate::error::Result;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Cloneable handle to the connection's write half
#[derive(Clone)]
pub(crate) struct ConnectionWriter {
    sink: Arc<Mutex<SplitSink<WsStream, Message>>>,
}

impl ConnectionWriter {
    /// Send a text frame
    pub(crate) async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Serialize a value to JSON and send it as one text frame
    pub(crate) async fn send_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.send_text(json).await
    }

    /// Send a close frame, best effort
    pub(crate) async fn close(&self) {
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(Message::Close(None)).await {
            tracing::debug!(error = %e, "close frame not delivered");
        }
    }
}

/// What a bounded receive produced
#[derive(Debug)]
pub(crate) enum Received {
    /// A text frame arrived
    Text(String),
    /// A non-text frame arrived (ping/pong/binary); nothing to decode
    Frame,
    /// No traffic within the bound
    Idle,
    /// Stream closed or transport error; no further frames will arrive
    Gone,
}

/// Owned read half of the connection
pub(crate) struct MessageReader {
    stream: SplitStream<WsStream>,
}

impl MessageReader {
    /// Receive the next frame, waiting at most `bound`
    ///
    /// The bound distinguishes "no traffic yet" (`Idle`) from a dead
    /// connection (`Gone`); callers typically pick a bound slightly larger
    /// than the keepalive interval so a healthy-but-quiet connection never
    /// reads as dead.
    pub(crate) async fn recv_bounded(&mut self, bound: Duration) -> Received {
        match tokio::time::timeout(bound, self.stream.next()).await {
            Err(_) => Received::Idle,
            Ok(None) => Received::Gone,
            Ok(Some(Err(e))) => {
                tracing::debug!(error = %e, "control connection receive failed");
                Received::Gone
            }
            Ok(Some(Ok(Message::Text(text)))) => Received::Text(text),
            Ok(Some(Ok(Message::Close(_)))) => Received::Gone,
            Ok(Some(Ok(_))) => Received::Frame,
        }
    }
}

/// An open control connection, split into its two halves
pub(crate) struct PrinterConnection {
    /// Shared write half
    pub(crate) writer: ConnectionWriter,
    /// Exclusive read half
    pub(crate) reader: MessageReader,
}

impl PrinterConnection {
    /// Open the control connection
    pub(crate) async fn connect(url: &str) -> Result<Self> {
        tracing::debug!(url = %url, "connecting to printer control endpoint");
        let (stream, _) = connect_async(url).await?;
        let (sink, stream) = stream.split();
        Ok(Self {
            writer: ConnectionWriter {
                sink: Arc::new(Mutex::new(sink)),
            },
            reader: MessageReader { stream },
        })
    }
}
