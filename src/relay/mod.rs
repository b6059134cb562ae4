//! Bridges a Dify streaming chat call onto a server-sent-events channel.

pub mod channel;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::agent::types::{ChatMessage, ResponseMode};
use crate::agent::{ChatflowApi, EventStream};
use crate::errors::AppError;
pub use channel::{DoneEnvelope, DownstreamEvent, EventChannel};
pub use session::RelaySession;

#[derive(Debug, Clone, Copy)]
pub struct RelaySettings {
    /// Bounded wait for a terminal upstream event.
    pub wait_budget: Duration,
    /// Lifetime of the downstream channel, measured from its creation.
    pub channel_timeout: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self { wait_budget: Duration::from_secs(180), channel_timeout: Duration::from_secs(300) }
    }
}

#[derive(Clone)]
pub struct StreamingRelay {
    client: Arc<dyn ChatflowApi>,
    settings: RelaySettings,
}

impl StreamingRelay {
    pub fn new(client: Arc<dyn ChatflowApi>, settings: RelaySettings) -> Self {
        Self { client, settings }
    }

    /// Opens one upstream streaming call and relays it until a terminal event
    /// arrives or the wait budget runs out. Everything is buffered in the
    /// returned channel, which is already completed when this returns `Ok`.
    pub async fn relay(
        &self,
        query: &str,
        user_id: &str,
        conversation_id: Option<&str>,
    ) -> Result<EventChannel, AppError> {
        let (emitter, channel) = channel::channel();
        let session = Arc::new(RelaySession::new(conversation_id.map(str::to_string), emitter));

        let _channel_timer = AbortOnDrop(tokio::spawn({
            let session = Arc::clone(&session);
            let timeout = self.settings.channel_timeout;
            async move {
                tokio::time::sleep(timeout).await;
                session.on_channel_timeout().await;
            }
        }));

        info!(user_id, ?conversation_id, "Sending streaming message: {query}");
        let message = ChatMessage::new(query, user_id, ResponseMode::Streaming)
            .with_conversation_id(conversation_id);

        let events = match self.client.send_chat_message_stream(message).await {
            Ok(events) => events,
            Err(e) => {
                error!(user_id, "Failed to open streaming message: {e}");
                session.complete_with_error(&e.to_string()).await;
                return Err(e);
            }
        };

        // Dropping the guard on any exit path aborts the pump and with it the
        // upstream connection.
        let _upstream = AbortOnDrop(tokio::spawn(pump(Arc::clone(&session), events)));

        let completed = session.wait(self.settings.wait_budget).await;

        if let Some(message) = session.error().await {
            session.complete_with_error(&message).await;
            return Err(AppError::StreamFailed { message });
        }

        if !completed {
            let snapshot = session.snapshot().await;
            error!(collected = %snapshot.answer, "Streaming response timed out");
        }
        if session.finish_degraded().await {
            warn!(user_id, "Relay finished without a message end, sent collected answer");
        }

        Ok(channel)
    }
}

/// Feeds upstream events into the session, then wakes the waiter in case the
/// stream ended without a terminal event.
async fn pump(session: Arc<RelaySession>, mut events: EventStream) {
    while let Some(event) = events.next().await {
        session.handle(event).await;
    }
    session.signal();
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
