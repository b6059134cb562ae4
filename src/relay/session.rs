use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::channel::{DoneEnvelope, DownstreamEvent, Emitter};
use crate::agent::events::UpstreamEvent;

/// State of one streaming request.
///
/// Every field lives behind a single mutex, so the terminal transition
/// (message end, error, channel timeout or wait expiry) has exactly one
/// winner: the closed check and the terminal send happen under one lock.
pub struct RelaySession {
    initial_conversation_id: Option<String>,
    state: Mutex<SessionState>,
    completion: watch::Sender<bool>,
}

struct SessionState {
    answer: String,
    conversation_id: Option<String>,
    message_id: Option<String>,
    error: Option<String>,
    finished: bool,
    closed: bool,
    emitter: Emitter,
}

/// Point-in-time copy of the session, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub answer: String,
    pub conversation_id: Option<String>,
    pub message_id: Option<String>,
    pub error: Option<String>,
    pub finished: bool,
    pub closed: bool,
}

impl RelaySession {
    pub fn new(initial_conversation_id: Option<String>, emitter: Emitter) -> Self {
        let initial_conversation_id = non_blank(initial_conversation_id);
        let (completion, _) = watch::channel(false);
        Self {
            state: Mutex::new(SessionState {
                answer: String::new(),
                conversation_id: initial_conversation_id.clone(),
                message_id: None,
                error: None,
                finished: false,
                closed: false,
                emitter,
            }),
            initial_conversation_id,
            completion,
        }
    }

    pub async fn handle(&self, event: UpstreamEvent) {
        match event {
            UpstreamEvent::Chunk { answer, conversation_id, .. } => {
                self.on_chunk(answer, conversation_id).await;
            }
            UpstreamEvent::End { message_id, conversation_id } => {
                self.on_end(message_id, conversation_id).await;
            }
            UpstreamEvent::Error { message, code } => {
                warn!(?code, "Upstream reported a stream error: {message}");
                self.on_failure(format!("stream error: {message}"), message).await;
            }
            UpstreamEvent::Exception(cause) => {
                warn!("Upstream stream raised an exception: {cause}");
                self.on_failure(format!("stream exception: {cause}"), cause).await;
            }
            UpstreamEvent::Other { kind } => debug!(kind = %kind, "Ignoring upstream event"),
        }
    }

    async fn on_chunk(&self, text: String, conversation_id: Option<String>) {
        let mut state = self.state.lock().await;
        state.answer.push_str(&text);

        if !state.closed {
            if let Err(e) = state.emitter.send(DownstreamEvent::Chunk(text)) {
                debug!("Dropping chunk: {e}");
                state.closed = true;
            }
        }

        if let Some(id) = non_blank(conversation_id) {
            state.conversation_id = Some(id);
        }
    }

    async fn on_end(&self, message_id: Option<String>, conversation_id: Option<String>) {
        let mut state = self.state.lock().await;
        info!(?message_id, "Upstream message finished");

        state.message_id = non_blank(message_id);
        if let Some(id) = non_blank(conversation_id) {
            state.conversation_id = Some(id);
        }
        if state.conversation_id.is_none() {
            state.conversation_id = state.message_id.clone();
        }

        if !state.closed {
            let envelope = self.envelope(&state);
            if let Err(e) = state.emitter.send(DownstreamEvent::Done(envelope)) {
                warn!("Failed to send done event: {e}");
            }
        }
        state.closed = true;
        state.finished = true;
        state.emitter.complete();
        drop(state);

        self.signal();
    }

    async fn on_failure(&self, recorded: String, forwarded: String) {
        let mut state = self.state.lock().await;
        if state.finished {
            debug!("Ignoring failure after normal completion: {recorded}");
            return;
        }

        if state.error.is_none() {
            state.error = Some(recorded);
        }
        if !state.closed {
            if let Err(e) = state.emitter.send(DownstreamEvent::Error(forwarded)) {
                warn!("Failed to send error event: {e}");
            }
        }
        state.closed = true;
        drop(state);

        self.signal();
    }

    /// Timeout hook of the downstream channel: flushes whatever has been
    /// collected as a best-effort `done` and force-completes the channel.
    pub async fn on_channel_timeout(&self) {
        let mut state = self.state.lock().await;
        if !state.closed {
            warn!(
                collected = state.answer.len(),
                "Downstream channel timed out, flushing collected answer"
            );
            let envelope = self.envelope(&state);
            if let Err(e) = state.emitter.send(DownstreamEvent::Done(envelope)) {
                warn!("Failed to flush collected answer on timeout: {e}");
            }
        }
        state.closed = true;
        state.emitter.complete();
        drop(state);

        self.signal();
    }

    /// Called once the waiting side gives up or the upstream stream drained
    /// without a terminal event. Returns `true` when a degraded `done` path
    /// ran, `false` when the session had already finished normally.
    pub async fn finish_degraded(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.finished {
            return false;
        }

        if !state.closed {
            let envelope = self.envelope(&state);
            if let Err(e) = state.emitter.send(DownstreamEvent::Done(envelope)) {
                warn!("Failed to send collected answer: {e}");
            }
        }
        state.closed = true;
        state.emitter.complete();
        true
    }

    /// Force-completes the channel after a failure; nothing more is sent.
    pub async fn complete_with_error(&self, cause: &str) {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.emitter.complete_with_error(cause);
        drop(state);

        self.signal();
    }

    /// Wakes the waiter without finishing the session.
    pub fn signal(&self) {
        self.completion.send_replace(true);
    }

    /// Waits for the completion signal. Returns `false` if `budget` elapsed.
    pub async fn wait(&self, budget: Duration) -> bool {
        let mut rx = self.completion.subscribe();
        let signalled =
            tokio::time::timeout(budget, async move { rx.wait_for(|done| *done).await.is_ok() })
                .await;
        matches!(signalled, Ok(true))
    }

    pub async fn error(&self) -> Option<String> {
        self.state.lock().await.error.clone()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            answer: state.answer.clone(),
            conversation_id: state.conversation_id.clone(),
            message_id: state.message_id.clone(),
            error: state.error.clone(),
            finished: state.finished,
            closed: state.closed,
        }
    }

    /// Conversation id falls back from the resolved value to the id the
    /// caller supplied and finally to the message id.
    fn envelope(&self, state: &SessionState) -> DoneEnvelope {
        let conversation_id = state
            .conversation_id
            .clone()
            .or_else(|| self.initial_conversation_id.clone())
            .or_else(|| state.message_id.clone());
        DoneEnvelope {
            message_id: state.message_id.clone(),
            conversation_id,
            answer: state.answer.clone(),
            created_at: Utc::now().timestamp_millis(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
