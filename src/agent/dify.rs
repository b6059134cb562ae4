use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error};

use super::events::{UpstreamEvent, WorkflowEvent};
use super::sse::SseDecoder;
use super::types::{
    ChatMessage, ChatMessageResponse, Conversation, ConversationListResponse,
    MessageListResponse, WorkflowLogsQuery, WorkflowLogsResponse, WorkflowRunRequest,
    WorkflowRunResponse, WorkflowRunStatus, WorkflowStopResponse,
};
use super::{ChatflowApi, EventStream, WorkflowApi, WorkflowEventStream};
use crate::errors::AppError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for a Dify deployment. The chatflow app and the workflow app
/// are addressed with separate API keys against the same base URL.
#[derive(Clone)]
pub struct DifyClient {
    http: reqwest::Client,
    base_url: String,
    chatflow_api_key: String,
    workflow_api_key: String,
}

impl DifyClient {
    pub fn new(
        base_url: &str,
        chatflow_api_key: &str,
        workflow_api_key: &str,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AppError::Unexpected(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            chatflow_api_key: chatflow_api_key.to_string(),
            workflow_api_key: workflow_api_key.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn chatflow(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path)).bearer_auth(&self.chatflow_api_key)
    }

    fn workflow(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path)).bearer_auth(&self.workflow_api_key)
    }

    /// Sends a request and turns transport failures and non-2xx statuses into
    /// [`AppError`]s.
    async fn send(&self, request: RequestBuilder) -> Result<Response, AppError> {
        let response = request.send().await.map_err(|e| {
            error!("Dify request failed: {e}");
            if e.is_connect() || e.is_timeout() {
                AppError::UpstreamUnavailable { host: self.base_url.clone() }
            } else {
                AppError::UpstreamRequest { message: e.to_string() }
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(body);
        error!(status = status.as_u16(), "Dify rejected request: {message}");
        Err(AppError::UpstreamRejected { status: status.as_u16(), message })
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, AppError> {
        self.send(request).await?.json::<T>().await.map_err(|e| {
            error!("Failed to decode Dify response: {e}");
            AppError::UpstreamRequest { message: format!("invalid response body: {e}") }
        })
    }
}

#[async_trait]
impl ChatflowApi for DifyClient {
    async fn send_chat_message(
        &self,
        message: ChatMessage,
    ) -> Result<ChatMessageResponse, AppError> {
        self.json(self.chatflow(reqwest::Method::POST, "chat-messages").json(&message)).await
    }

    async fn send_chat_message_stream(&self, message: ChatMessage) -> Result<EventStream, AppError> {
        let response =
            self.send(self.chatflow(reqwest::Method::POST, "chat-messages").json(&message)).await?;
        Ok(decode_stream(response, UpstreamEvent::from_payload, UpstreamEvent::Exception))
    }

    async fn get_messages(
        &self,
        conversation_id: &str,
        user: &str,
        limit: u32,
    ) -> Result<MessageListResponse, AppError> {
        let limit = limit.to_string();
        self.json(self.chatflow(reqwest::Method::GET, "messages").query(&[
            ("conversation_id", conversation_id),
            ("user", user),
            ("limit", limit.as_str()),
        ]))
        .await
    }

    async fn get_conversations(
        &self,
        user: &str,
        limit: u32,
    ) -> Result<ConversationListResponse, AppError> {
        let limit = limit.to_string();
        self.json(self.chatflow(reqwest::Method::GET, "conversations").query(&[
            ("user", user),
            ("limit", limit.as_str()),
            ("sort_by", "-updated_at"),
        ]))
        .await
    }

    async fn delete_conversation(&self, conversation_id: &str, user: &str) -> Result<(), AppError> {
        let path = format!("conversations/{conversation_id}");
        self.send(self.chatflow(reqwest::Method::DELETE, &path).json(&json!({ "user": user })))
            .await?;
        Ok(())
    }

    async fn rename_conversation(
        &self,
        conversation_id: &str,
        name: &str,
        user: &str,
    ) -> Result<Conversation, AppError> {
        let path = format!("conversations/{conversation_id}/name");
        self.json(self.chatflow(reqwest::Method::POST, &path).json(&json!({
            "name": name,
            "auto_generate": false,
            "user": user,
        })))
        .await
    }
}

#[async_trait]
impl WorkflowApi for DifyClient {
    async fn run_workflow(
        &self,
        request: WorkflowRunRequest,
    ) -> Result<WorkflowRunResponse, AppError> {
        self.json(self.workflow(reqwest::Method::POST, "workflows/run").json(&request)).await
    }

    async fn run_workflow_stream(
        &self,
        request: WorkflowRunRequest,
    ) -> Result<WorkflowEventStream, AppError> {
        let response =
            self.send(self.workflow(reqwest::Method::POST, "workflows/run").json(&request)).await?;
        Ok(decode_stream(response, WorkflowEvent::from_payload, WorkflowEvent::Exception))
    }

    async fn stop_workflow(
        &self,
        task_id: &str,
        user: &str,
    ) -> Result<WorkflowStopResponse, AppError> {
        let path = format!("workflows/tasks/{task_id}/stop");
        self.json(self.workflow(reqwest::Method::POST, &path).json(&json!({ "user": user }))).await
    }

    async fn get_workflow_run(&self, workflow_run_id: &str) -> Result<WorkflowRunStatus, AppError> {
        let path = format!("workflows/run/{workflow_run_id}");
        self.json(self.workflow(reqwest::Method::GET, &path)).await
    }

    async fn get_workflow_logs(
        &self,
        query: WorkflowLogsQuery,
    ) -> Result<WorkflowLogsResponse, AppError> {
        let mut params = vec![("page", query.page.to_string()), ("limit", query.limit.to_string())];
        if let Some(start) = query.start {
            params.push(("created_at__after", start));
        }
        if let Some(end) = query.end {
            params.push(("created_at__before", end));
        }
        self.json(self.workflow(reqwest::Method::GET, "workflows/logs").query(&params)).await
    }
}

struct Decoding<T> {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<T>,
    exhausted: bool,
}

/// Turns an SSE response body into typed events. A body read failure is
/// emitted once through `on_failure` and ends the stream.
fn decode_stream<T: Send + 'static>(
    response: Response,
    parse: fn(&Value) -> T,
    on_failure: fn(String) -> T,
) -> BoxStream<'static, T> {
    let state = Decoding {
        body: response.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec())).boxed(),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        exhausted: false,
    };

    stream::unfold(state, move |mut st| async move {
        loop {
            if let Some(event) = st.pending.pop_front() {
                return Some((event, st));
            }
            if st.exhausted {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    for data in st.decoder.feed(&chunk) {
                        if let Some(event) = parse_data(&data, parse) {
                            st.pending.push_back(event);
                        }
                    }
                }
                Some(Err(e)) => {
                    error!("Dify stream read failed: {e}");
                    st.exhausted = true;
                    st.pending.push_back(on_failure(e.to_string()));
                }
                None => {
                    st.exhausted = true;
                    if let Some(event) = st.decoder.finish().and_then(|d| parse_data(&d, parse)) {
                        st.pending.push_back(event);
                    }
                }
            }
        }
    })
    .boxed()
}

fn parse_data<T>(data: &str, parse: fn(&Value) -> T) -> Option<T> {
    match serde_json::from_str::<Value>(data) {
        Ok(payload) => Some(parse(&payload)),
        Err(e) => {
            debug!("Skipping undecodable stream payload ({e}): {data}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;
    use crate::agent::types::ResponseMode;

    /// Serves one streaming response, writing each piece as its own HTTP
    /// chunk. Without `finish` the connection drops mid-body.
    async fn serve_sse(pieces: Vec<&'static str>, finish: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\n\
                      transfer-encoding: chunked\r\n\r\n",
                )
                .await
                .unwrap();
            for piece in pieces {
                let chunk = format!("{:x}\r\n{piece}\r\n", piece.len());
                socket.write_all(chunk.as_bytes()).await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            if finish {
                socket.write_all(b"0\r\n\r\n").await.unwrap();
            }
        });
        format!("http://{addr}")
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    async fn stream_from(base_url: &str) -> Vec<UpstreamEvent> {
        let client = DifyClient::new(base_url, "a", "b").unwrap();
        let events = client
            .send_chat_message_stream(ChatMessage::new("hi", "u-1", ResponseMode::Streaming))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), events.collect::<Vec<_>>()).await.unwrap()
    }

    fn chunk(answer: &str) -> UpstreamEvent {
        UpstreamEvent::Chunk { answer: answer.into(), conversation_id: None, message_id: None }
    }

    #[tokio::test]
    async fn streamed_body_decodes_frames_split_across_chunks() {
        let base_url = serve_sse(
            vec![
                "data: {\"event\":\"message\",\"answer\":\"Hel\"}\n\n",
                "data: {\"event\":\"message\",\"ans",
                "wer\":\"lo\"}\n\ndata: {\"event\":\"ping\"}\n\n",
                "data: {\"event\":\"message_end\",\"message_id\":\"m-1\",\"conversation_id\":\"c-1\"}\n\n",
            ],
            true,
        )
        .await;

        let events = stream_from(&base_url).await;
        assert_eq!(
            events,
            vec![
                chunk("Hel"),
                chunk("lo"),
                UpstreamEvent::Other { kind: "ping".into() },
                UpstreamEvent::End {
                    message_id: Some("m-1".into()),
                    conversation_id: Some("c-1".into()),
                },
            ]
        );
    }

    #[tokio::test]
    async fn broken_body_yields_one_exception_and_ends() {
        let base_url = serve_sse(
            vec!["data: {\"event\":\"message\",\"answer\":\"partial\"}\n\n", "data: {\"event\":\"mess"],
            false,
        )
        .await;

        let events = stream_from(&base_url).await;
        assert_eq!(events.len(), 2, "got {events:?}");
        assert_eq!(events[0], chunk("partial"));
        assert!(matches!(events[1], UpstreamEvent::Exception(_)), "got {events:?}");
    }

    #[test]
    fn url_joins_without_double_slash() {
        let client = DifyClient::new("http://dify.local/v1/", "a", "b").unwrap();
        assert_eq!(client.url("/chat-messages"), "http://dify.local/v1/chat-messages");
        assert_eq!(client.url("workflows/run"), "http://dify.local/v1/workflows/run");
    }

    #[test]
    fn parse_data_skips_non_json() {
        assert!(parse_data("[DONE]", UpstreamEvent::from_payload).is_none());
        assert_eq!(
            parse_data(r#"{"event":"ping"}"#, UpstreamEvent::from_payload),
            Some(UpstreamEvent::Other { kind: "ping".into() })
        );
    }

    #[tokio::test]
    async fn unreachable_host_is_reported_as_unavailable() {
        let client = DifyClient::new("http://127.0.0.1:9", "a", "b").unwrap();
        let err = client.get_conversations("u-1", 20).await.unwrap_err();
        assert!(err.is_upstream_unavailable(), "got {err:?}");
    }
}
