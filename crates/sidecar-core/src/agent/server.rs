//! ACP agent server
//!
//! Implements the agent side of the Agent Client Protocol on top of the
//! JSON-RPC connection: capability negotiation, session creation,
//! prompt turns streamed as `session/update` notifications, and
//! cooperative cancellation.

use crate::agent::reply::ReplySource;
use crate::agent::session::Session;
use crate::error::{Error, Result};
use crate::rpc::{MethodHandler, RpcConnection};
use crate::types::{
    ContentBlock, InitializeResult, PromptResult, SessionCancelParams, SessionNewResult,
    SessionPromptParams, SessionUpdate, SessionUpdateNotification, StopReason,
};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The fixed ACP method vocabulary this agent answers to.
///
/// Routing goes through this enum so every dispatch site is an
/// exhaustive match; a method missing here is answered with a single
/// not-implemented error, never silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Initialize,
    Authenticate,
    SessionNew,
    SessionPrompt,
    SessionCancel,
    SessionSetMode,
}

impl Method {
    fn from_str(method: &str) -> Option<Self> {
        match method {
            "initialize" => Some(Self::Initialize),
            "authenticate" => Some(Self::Authenticate),
            "session/new" => Some(Self::SessionNew),
            "session/prompt" => Some(Self::SessionPrompt),
            "session/cancel" => Some(Self::SessionCancel),
            "session/set_mode" => Some(Self::SessionSetMode),
            _ => None,
        }
    }
}

/// Agent-side protocol state: session table plus the reply seam.
pub struct AgentServer<W> {
    conn: RpcConnection<W>,
    source: Arc<dyn ReplySource>,
    sessions: Mutex<HashMap<String, Session>>,
    next_session: AtomicU64,
}

impl<W: AsyncWrite + Unpin + Send + 'static> AgentServer<W> {
    pub fn new(conn: RpcConnection<W>, source: Arc<dyn ReplySource>) -> Self {
        Self {
            conn,
            source,
            sessions: Mutex::new(HashMap::new()),
            next_session: AtomicU64::new(1),
        }
    }

    fn initialize(&self) -> Result<serde_json::Value> {
        info!("Client connected, advertising protocol version");
        Ok(serde_json::to_value(InitializeResult::default())?)
    }

    async fn session_new(&self) -> Result<serde_json::Value> {
        let n = self.next_session.fetch_add(1, Ordering::SeqCst);
        let session_id = format!("sess-{:04}", n);
        let mut sessions = self.sessions.lock().await;
        sessions.insert(session_id.clone(), Session::new(&session_id));
        info!("Created session {}", session_id);
        Ok(serde_json::to_value(SessionNewResult { session_id })?)
    }

    /// One prompt turn: supersede any unfinished predecessor, stream the
    /// reply, report how the turn ended.
    async fn session_prompt(&self, params: SessionPromptParams) -> Result<serde_json::Value> {
        let (cancel, _guard, previous) = {
            let mut sessions = self.sessions.lock().await;
            let session = sessions
                .get_mut(&params.session_id)
                .ok_or_else(|| Error::UnknownSession(params.session_id.clone()))?;
            session.begin_turn()
        };

        if let Some(previous) = previous {
            debug!("Superseding unfinished turn in {}", params.session_id);
            previous.cancel.cancel();
            tokio::select! {
                _ = cancel.cancelled() => return finished(StopReason::Cancelled),
                _ = previous.wait_done() => {}
            }
        }

        let prompt = params.text();
        let stop_reason = self.stream_reply(&params.session_id, &prompt, &cancel).await?;
        finished(stop_reason)
    }

    /// Forward reply chunks as `session/update` notifications until the
    /// source finishes or the turn's token fires.
    ///
    /// Cancellation is checked at every suspension point; tripping the
    /// token drops the in-flight reply future on the floor.
    async fn stream_reply(
        &self,
        session_id: &str,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<StopReason> {
        let (tx, mut rx) = mpsc::channel::<String>(16);
        let source = Arc::clone(&self.source);
        let prompt = prompt.to_string();
        let reply = async move { source.reply(&prompt, tx).await };
        tokio::pin!(reply);

        let mut reply_outcome: Option<Result<()>> = None;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Turn in {} cancelled mid-stream", session_id);
                    return Ok(StopReason::Cancelled);
                }
                outcome = &mut reply, if reply_outcome.is_none() => {
                    reply_outcome = Some(outcome);
                }
                chunk = rx.recv() => match chunk {
                    Some(text) => self.send_chunk(session_id, text).await?,
                    None => break,
                },
            }
        }

        if let Some(Err(e)) = reply_outcome {
            warn!("Reply source failed in {}: {}", session_id, e);
            self.send_chunk(session_id, format!("Error: {}", e)).await?;
        }
        Ok(StopReason::EndTurn)
    }

    async fn send_chunk(&self, session_id: &str, text: String) -> Result<()> {
        let update = SessionUpdateNotification {
            session_id: session_id.to_string(),
            update: SessionUpdate::AgentMessageChunk {
                content: ContentBlock::text(text),
            },
        };
        self.conn
            .send_notification("session/update", Some(serde_json::to_value(update)?))
            .await
    }

    /// Cancel whatever turn is running in the session. Unknown sessions
    /// and idle sessions are not errors; there is just nothing to do.
    async fn session_cancel(&self, params: SessionCancelParams) {
        let sessions = self.sessions.lock().await;
        match sessions.get(&params.session_id) {
            Some(session) if session.cancel_turn() => {
                info!("Cancelled active turn in {}", params.session_id);
            }
            Some(_) => debug!("Cancel for {} with no active turn", params.session_id),
            None => warn!("Cancel for unknown session {}", params.session_id),
        }
    }
}

fn finished(stop_reason: StopReason) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(PromptResult { stop_reason })?)
}

fn parse_params<T: serde::de::DeserializeOwned>(params: serde_json::Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| Error::InvalidParams(e.to_string()))
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send + 'static> MethodHandler for AgentServer<W> {
    async fn handle_request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        match Method::from_str(method) {
            Some(Method::Initialize) => self.initialize(),
            Some(Method::Authenticate) | Some(Method::SessionSetMode) => Ok(json!({})),
            Some(Method::SessionNew) => self.session_new().await,
            Some(Method::SessionPrompt) => self.session_prompt(parse_params(params)?).await,
            Some(Method::SessionCancel) => {
                self.session_cancel(parse_params(params)?).await;
                Ok(json!({}))
            }
            None => Err(Error::MethodNotImplemented(method.to_string())),
        }
    }

    async fn handle_notification(&self, method: &str, params: serde_json::Value) {
        match Method::from_str(method) {
            Some(Method::SessionCancel) => match parse_params(params) {
                Ok(params) => self.session_cancel(params).await,
                Err(e) => warn!("Malformed session/cancel notification: {}", e),
            },
            _ => debug!("Ignoring notification: {}", method),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{LineReader, LineWriter};
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

    /// Emits a fixed chunk list with a pause before each chunk.
    struct ScriptedSource {
        chunks: Vec<&'static str>,
        delay: Duration,
    }

    #[async_trait]
    impl ReplySource for ScriptedSource {
        async fn reply(&self, _prompt: &str, chunks: mpsc::Sender<String>) -> Result<()> {
            for chunk in &self.chunks {
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                if chunks.send(chunk.to_string()).await.is_err() {
                    break;
                }
            }
            Ok(())
        }
    }

    /// Stalls indefinitely for the prompt "first"; answers anything else
    /// immediately. Lets one turn hang while its successor completes.
    struct SlowFirstSource;

    #[async_trait]
    impl ReplySource for SlowFirstSource {
        async fn reply(&self, prompt: &str, chunks: mpsc::Sender<String>) -> Result<()> {
            if prompt == "first" {
                tokio::time::sleep(Duration::from_secs(300)).await;
            }
            let _ = chunks.send(format!("reply to {}", prompt)).await;
            Ok(())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl ReplySource for FailingSource {
        async fn reply(&self, _prompt: &str, chunks: mpsc::Sender<String>) -> Result<()> {
            let _ = chunks.send("partial".to_string()).await;
            Err(Error::Internal("backend unavailable".to_string()))
        }
    }

    struct Client {
        reader: BufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Client {
        async fn send(&mut self, value: Value) {
            let mut line = serde_json::to_vec(&value).unwrap();
            line.push(b'\n');
            self.writer.write_all(&line).await.unwrap();
        }

        async fn recv(&mut self) -> Value {
            let mut line = String::new();
            self.reader.read_line(&mut line).await.unwrap();
            serde_json::from_str(&line).unwrap()
        }

        /// Read lines until the response with `id` arrives, collecting
        /// any `session/update` notifications seen on the way.
        async fn recv_until_response(&mut self, id: u64) -> (Vec<Value>, Value) {
            let mut updates = Vec::new();
            loop {
                let value = self.recv().await;
                if value["id"] == serde_json::json!(id) {
                    return (updates, value);
                }
                assert_eq!(value["method"], serde_json::json!("session/update"));
                updates.push(value["params"].clone());
            }
        }

        async fn open_session(&mut self) -> String {
            self.send(json!({"jsonrpc": "2.0", "id": 100, "method": "session/new"}))
                .await;
            let (_, response) = self.recv_until_response(100).await;
            response["result"]["sessionId"].as_str().unwrap().to_string()
        }
    }

    fn start(source: Arc<dyn ReplySource>) -> Client {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_io);
        let (client_read, client_write) = tokio::io::split(client_io);

        let conn = RpcConnection::new(LineWriter::new(server_write));
        let server = Arc::new(AgentServer::new(conn.clone(), source));
        tokio::spawn(async move {
            conn.serve(LineReader::new(server_read), server).await;
        });

        Client {
            reader: BufReader::new(client_read),
            writer: client_write,
        }
    }

    fn echo_server() -> Client {
        start(Arc::new(crate::agent::reply::CannedReplies::default()))
    }

    #[tokio::test]
    async fn test_initialize_advertises_capabilities() {
        let mut client = echo_server();
        client
            .send(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}))
            .await;

        let response = client.recv().await;
        assert_eq!(
            response,
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {
                    "protocolVersion": 1,
                    "agentCapabilities": {"loadSession": false},
                    "promptCapabilities": {
                        "supportsImage": true,
                        "supportsAudio": false,
                        "supportsResources": true,
                    }
                }
            })
        );
    }

    #[tokio::test]
    async fn test_session_ids_are_sequential() {
        let mut client = echo_server();
        assert_eq!(client.open_session().await, "sess-0001");
        assert_eq!(client.open_session().await, "sess-0002");
    }

    #[tokio::test]
    async fn test_prompt_streams_chunks_then_ends_turn() {
        let mut client = echo_server();
        let session_id = client.open_session().await;

        client
            .send(json!({
                "jsonrpc": "2.0", "id": 2, "method": "session/prompt",
                "params": {
                    "sessionId": session_id,
                    "prompt": [{"type": "text", "text": "ping"}],
                }
            }))
            .await;

        let (updates, response) = client.recv_until_response(2).await;
        assert_eq!(response["result"], json!({"stopReason": "end_turn"}));

        let text: String = updates
            .iter()
            .map(|u| {
                assert_eq!(u["sessionId"].as_str().unwrap(), session_id);
                assert_eq!(u["update"]["sessionUpdate"], json!("agent_message_chunk"));
                u["update"]["content"]["text"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(text, "You said: ping");
    }

    #[tokio::test]
    async fn test_empty_messages_still_stream_and_end_turn() {
        let mut client = echo_server();
        let session_id = client.open_session().await;

        client
            .send(json!({
                "jsonrpc": "2.0", "id": 2, "method": "session/prompt",
                "params": {"sessionId": session_id, "messages": []}
            }))
            .await;

        let (updates, response) = client.recv_until_response(2).await;
        assert!(!updates.is_empty());
        assert!(updates
            .iter()
            .all(|u| u["sessionId"].as_str().unwrap() == session_id));
        assert_eq!(response["result"], json!({"stopReason": "end_turn"}));
    }

    #[tokio::test]
    async fn test_prompt_for_unknown_session_is_an_error() {
        let mut client = echo_server();
        client
            .send(json!({
                "jsonrpc": "2.0", "id": 2, "method": "session/prompt",
                "params": {"sessionId": "sess-9999", "prompt": "hi"}
            }))
            .await;

        let response = client.recv().await;
        assert_eq!(response["error"]["code"], json!(-32603));
        assert_eq!(response["error"]["message"], json!("Unknown session sess-9999"));
    }

    #[tokio::test]
    async fn test_unknown_method_is_answered_not_dropped() {
        let mut client = echo_server();
        client
            .send(json!({"jsonrpc": "2.0", "id": 3, "method": "session/fork", "params": {}}))
            .await;

        let response = client.recv().await;
        assert_eq!(response["error"]["code"], json!(-32603));
        assert_eq!(
            response["error"]["message"],
            json!("Method not implemented: session/fork")
        );
    }

    #[tokio::test]
    async fn test_stub_methods_return_empty_objects() {
        let mut client = echo_server();
        for (id, method) in [(4, "authenticate"), (5, "session/set_mode")] {
            client
                .send(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": {}}))
                .await;
            let response = client.recv().await;
            assert_eq!(response["result"], json!({}));
        }
    }

    #[tokio::test]
    async fn test_cancel_notification_stops_turn_mid_stream() {
        let mut client = start(Arc::new(ScriptedSource {
            chunks: vec!["one", "two", "three"],
            delay: Duration::from_millis(200),
        }));
        let session_id = client.open_session().await;

        client
            .send(json!({
                "jsonrpc": "2.0", "id": 2, "method": "session/prompt",
                "params": {"sessionId": session_id, "prompt": "go"}
            }))
            .await;

        // Wait for the first chunk so the turn is provably mid-stream.
        let first = client.recv().await;
        assert_eq!(first["method"], json!("session/update"));

        client
            .send(json!({
                "jsonrpc": "2.0", "method": "session/cancel",
                "params": {"sessionId": session_id}
            }))
            .await;

        let (updates, response) = client.recv_until_response(2).await;
        assert_eq!(response["result"], json!({"stopReason": "cancelled"}));
        // The 200ms inter-chunk pause guarantees nothing else was
        // already in flight when the cancel landed.
        assert!(updates.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_request_form_gets_a_response() {
        let mut client = echo_server();
        let session_id = client.open_session().await;

        client
            .send(json!({
                "jsonrpc": "2.0", "id": 2, "method": "session/cancel",
                "params": {"sessionId": session_id}
            }))
            .await;
        let response = client.recv().await;
        assert_eq!(response["result"], json!({}));
    }

    #[tokio::test]
    async fn test_cancel_for_unknown_session_is_a_no_op() {
        let mut client = echo_server();
        client
            .send(json!({
                "jsonrpc": "2.0", "id": 2, "method": "session/cancel",
                "params": {"sessionId": "sess-9999"}
            }))
            .await;
        let response = client.recv().await;
        assert_eq!(response["result"], json!({}));
    }

    #[tokio::test]
    async fn test_new_prompt_supersedes_unfinished_turn() {
        let mut client = start(Arc::new(SlowFirstSource));
        let session_id = client.open_session().await;

        client
            .send(json!({
                "jsonrpc": "2.0", "id": 2, "method": "session/prompt",
                "params": {"sessionId": session_id, "prompt": "first"}
            }))
            .await;
        // Let the first turn reach its streaming loop before racing it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        client
            .send(json!({
                "jsonrpc": "2.0", "id": 3, "method": "session/prompt",
                "params": {"sessionId": session_id, "prompt": "second"}
            }))
            .await;

        // The superseded turn reports cancelled; the new one runs to
        // completion. Wire order between the first response and the
        // second turn's traffic is not fixed, so collect everything.
        let mut responses = std::collections::HashMap::new();
        let mut updates = Vec::new();
        while responses.len() < 2 {
            let value = client.recv().await;
            if let Some(id) = value["id"].as_u64() {
                responses.insert(id, value);
            } else {
                updates.push(value["params"].clone());
            }
        }
        assert_eq!(responses[&2]["result"], json!({"stopReason": "cancelled"}));
        assert_eq!(responses[&3]["result"], json!({"stopReason": "end_turn"}));
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0]["update"]["content"]["text"], json!("reply to second"));
    }

    #[tokio::test]
    async fn test_failing_source_reports_error_chunk_and_ends_turn() {
        let mut client = start(Arc::new(FailingSource));
        let session_id = client.open_session().await;

        client
            .send(json!({
                "jsonrpc": "2.0", "id": 2, "method": "session/prompt",
                "params": {"sessionId": session_id, "prompt": "boom"}
            }))
            .await;

        let (updates, response) = client.recv_until_response(2).await;
        assert_eq!(response["result"], json!({"stopReason": "end_turn"}));
        let last = updates.last().expect("error chunk");
        assert_eq!(
            last["update"]["content"]["text"],
            json!("Error: Internal error: backend unavailable")
        );
    }

    #[tokio::test]
    async fn test_sessions_stream_independently() {
        let mut client = echo_server();
        let first = client.open_session().await;
        let second = client.open_session().await;

        client
            .send(json!({
                "jsonrpc": "2.0", "id": 2, "method": "session/prompt",
                "params": {"sessionId": first, "prompt": "a"}
            }))
            .await;
        let (updates, response) = client.recv_until_response(2).await;
        assert_eq!(response["result"], json!({"stopReason": "end_turn"}));
        assert!(updates.iter().all(|u| u["sessionId"].as_str().unwrap() == first));

        client
            .send(json!({
                "jsonrpc": "2.0", "id": 3, "method": "session/prompt",
                "params": {"sessionId": second, "prompt": "b"}
            }))
            .await;
        let (updates, response) = client.recv_until_response(3).await;
        assert_eq!(response["result"], json!({"stopReason": "end_turn"}));
        assert!(updates.iter().all(|u| u["sessionId"].as_str().unwrap() == second));
    }
}
