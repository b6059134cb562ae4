//! The downstream half of a relay: a push channel rendered as server-sent
//! events.

use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::warn;

/// Final payload of a successful (or degraded) relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoneEnvelope {
    pub message_id: Option<String>,
    pub conversation_id: Option<String>,
    pub answer: String,
    /// Epoch milliseconds at the moment the envelope was built.
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownstreamEvent {
    Chunk(String),
    Done(DoneEnvelope),
    Error(String),
}

impl DownstreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DownstreamEvent::Chunk(_) => "chunk",
            DownstreamEvent::Done(_) => "done",
            DownstreamEvent::Error(_) => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DownstreamEvent::Chunk(_))
    }

    pub fn into_sse(self) -> Event {
        let name = self.name();
        let data = match self {
            DownstreamEvent::Chunk(text) | DownstreamEvent::Error(text) => text,
            DownstreamEvent::Done(envelope) => serde_json::to_string(&envelope).unwrap_or_default(),
        };
        // `Event::data` breaks lines on `\r` and `\n` separately, so a CRLF
        // pair would otherwise turn into an extra empty `data:` line.
        Event::default().event(name).data(data.replace("\r\n", "\n"))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("downstream channel is closed")]
pub struct ChannelClosed;

/// Sending side. Completion drops the sender, which ends the SSE body.
#[derive(Debug)]
pub struct Emitter {
    tx: Option<mpsc::UnboundedSender<DownstreamEvent>>,
}

impl Emitter {
    pub fn send(&self, event: DownstreamEvent) -> Result<(), ChannelClosed> {
        match &self.tx {
            Some(tx) => tx.send(event).map_err(|_| ChannelClosed),
            None => Err(ChannelClosed),
        }
    }

    pub fn complete(&mut self) {
        self.tx = None;
    }

    pub fn complete_with_error(&mut self, cause: &str) {
        if self.tx.is_some() {
            warn!("Completing downstream channel with error: {cause}");
        }
        self.tx = None;
    }
}

/// Receiving side, handed back to the HTTP layer.
#[derive(Debug)]
pub struct EventChannel {
    rx: mpsc::UnboundedReceiver<DownstreamEvent>,
}

impl EventChannel {
    /// Closes the channel from the client side; later sends fail.
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// Drains everything buffered so far without waiting.
    pub fn drain(&mut self) -> Vec<DownstreamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn into_stream(self) -> impl Stream<Item = DownstreamEvent> + Send + 'static {
        UnboundedReceiverStream::new(self.rx)
    }

    pub fn into_sse(self) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static> {
        let events = self.into_stream().map(|event| Ok::<_, Infallible>(event.into_sse()));
        Sse::new(events).keep_alive(KeepAlive::default())
    }
}

impl IntoResponse for EventChannel {
    fn into_response(self) -> Response {
        self.into_sse().into_response()
    }
}

pub fn channel() -> (Emitter, EventChannel) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Emitter { tx: Some(tx) }, EventChannel { rx })
}
