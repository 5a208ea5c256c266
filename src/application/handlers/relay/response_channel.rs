//! Outbound event-stream channel.
//!
//! Frames tokens as `data:` events and hands them to the transport through a
//! bounded queue. The queue bound is the backpressure point: a slow client
//! fills it and stalls the writer instead of growing memory.
//!
//! The transport owns the [`FrameStream`] half. Dropping it (client gone) is
//! the only cancellation signal the relay observes.

use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Response headers that put the transport into event-stream mode.
const EVENT_STREAM_HEADERS: [(&str, &str); 3] = [
    ("content-type", "text/event-stream"),
    ("cache-control", "no-cache"),
    ("connection", "keep-alive"),
];

/// Channel sizing and write bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Frames queued before writes start waiting on the client.
    pub buffer: usize,
    /// Longest a single write may wait for queue space.
    pub write_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            buffer: 32,
            write_timeout: Duration::from_secs(30),
        }
    }
}

/// Errors from writing to the channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Write attempted after `close()`.
    #[error("channel closed")]
    Closed,

    /// The transport dropped its end.
    #[error("client disconnected")]
    Disconnected,

    /// The client did not drain the queue in time.
    #[error("write timed out after {timeout_ms}ms")]
    WriteTimeout { timeout_ms: u64 },
}

impl ChannelError {
    /// True when the error means the client is gone rather than a fault.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ChannelError::Disconnected | ChannelError::WriteTimeout { .. })
    }
}

/// Writer half: frames events and enforces close semantics.
#[derive(Debug)]
pub struct ResponseChannel {
    sender: Option<mpsc::Sender<String>>,
    write_timeout: Duration,
}

/// Reader half, handed to the transport as the response body.
#[derive(Debug)]
pub struct FrameStream {
    receiver: mpsc::Receiver<String>,
}

impl ResponseChannel {
    /// Opens a channel and returns both halves.
    pub fn open(config: &ChannelConfig) -> (Self, FrameStream) {
        let (sender, receiver) = mpsc::channel(config.buffer.max(1));
        (
            Self {
                sender: Some(sender),
                write_timeout: config.write_timeout,
            },
            FrameStream { receiver },
        )
    }

    /// Headers the transport must send before the first frame.
    pub fn headers() -> &'static [(&'static str, &'static str)] {
        &EVENT_STREAM_HEADERS
    }

    /// Writes one token as a `data:` event.
    pub async fn write_token(&mut self, token: &str) -> Result<(), ChannelError> {
        self.send(event_frame(token)).await
    }

    /// Writes a serialized error payload as a `data:` event.
    pub async fn write_error(&mut self, payload_json: &str) -> Result<(), ChannelError> {
        self.send(event_frame(payload_json)).await
    }

    /// Ends the stream. Idempotent.
    pub fn close(&mut self) {
        self.sender = None;
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_none()
    }

    /// Resolves once the transport has dropped its end.
    ///
    /// Never resolves after `close()`: a closed channel has nothing left to cancel.
    pub async fn disconnected(&self) {
        match &self.sender {
            Some(sender) => sender.closed().await,
            None => futures::future::pending::<()>().await,
        }
    }

    async fn send(&mut self, frame: String) -> Result<(), ChannelError> {
        let sender = self.sender.as_ref().ok_or(ChannelError::Closed)?;
        match tokio::time::timeout(self.write_timeout, sender.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ChannelError::Disconnected),
            Err(_) => Err(ChannelError::WriteTimeout {
                timeout_ms: self.write_timeout.as_millis() as u64,
            }),
        }
    }
}

impl Stream for FrameStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Formats one event: every line gets its own `data:` field, then a blank line.
///
/// A client joining the data lines with `\n` gets the original text back
/// (with `\r\n` and lone `\r` normalized to `\n`).
pub fn event_frame(data: &str) -> String {
    let normalized = data.replace("\r\n", "\n");
    let mut frame = String::with_capacity(normalized.len() + 8);
    for line in normalized.split(['\n', '\r']) {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    frame
}
