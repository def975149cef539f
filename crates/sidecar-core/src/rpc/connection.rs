//! JSON-RPC 2.0 connection
//!
//! Implements bidirectional request/response/notification semantics on
//! top of the line transport: outbound requests are correlated to
//! responses through a pending table keyed by id, and every inbound
//! request or notification is dispatched as its own task so slow
//! handlers never stall the serve loop.

use crate::error::{Result, RpcError};
use crate::rpc::transport::{LineReader, LineWriter};
use crate::types::{JsonRpcRequest, JsonRpcResponse, RpcMessage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// How long `serve` waits for in-flight dispatch tasks after EOF.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

type PendingSlot = oneshot::Sender<std::result::Result<serde_json::Value, RpcError>>;

/// Callbacks for inbound traffic.
///
/// Each invocation runs as an independent task and may call back into
/// the connection (e.g. to stream notifications) before returning.
#[async_trait]
pub trait MethodHandler: Send + Sync + 'static {
    /// Handle an inbound request. The return value becomes the `result`
    /// of the auto-sent response; an error becomes its `error` object.
    async fn handle_request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value>;

    /// Handle an inbound notification. Failures have no response channel
    /// to report on, so implementations log and swallow them.
    async fn handle_notification(&self, method: &str, params: serde_json::Value) {
        debug!("Unhandled notification: {}", method);
        let _ = params;
    }
}

struct ConnectionState<W> {
    writer: LineWriter<W>,
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingSlot>>,
    tasks: TaskTracker,
    closed: CancellationToken,
}

/// A live JSON-RPC connection. Cheap to clone; all clones share state.
pub struct RpcConnection<W> {
    state: Arc<ConnectionState<W>>,
}

impl<W> Clone for RpcConnection<W> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<W: AsyncWrite + Unpin + Send + 'static> RpcConnection<W> {
    pub fn new(writer: LineWriter<W>) -> Self {
        Self {
            state: Arc::new(ConnectionState {
                writer,
                next_id: AtomicU64::new(1),
                pending: Mutex::new(HashMap::new()),
                tasks: TaskTracker::new(),
                closed: CancellationToken::new(),
            }),
        }
    }

    /// Send a request and suspend until its response arrives.
    ///
    /// Ids are strictly increasing and never reused for the lifetime of
    /// the connection. Any number of requests may be outstanding at
    /// once; responses resolve by id, not arrival order.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        if self.state.closed.is_cancelled() {
            return Err(RpcError::ConnectionClosed.into());
        }

        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.state.pending.lock().await;
            pending.insert(id, tx);
        }

        let request = JsonRpcRequest::new(id, method, params);
        if let Err(e) = self.state.writer.write(&request).await {
            let mut pending = self.state.pending.lock().await;
            pending.remove(&id);
            return Err(e);
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(rpc_error)) => Err(rpc_error.into()),
            Err(_) => Err(RpcError::ConnectionClosed.into()),
        }
    }

    /// Fire-and-forget notification; no id, no correlation.
    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<()> {
        self.state
            .writer
            .write(&JsonRpcRequest::notification(method, params))
            .await
    }

    /// Send exactly one response for an inbound request id.
    pub async fn send_response(
        &self,
        id: serde_json::Value,
        outcome: Result<serde_json::Value>,
    ) -> Result<()> {
        let response = match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => JsonRpcResponse::failure(id, e.to_wire()),
        };
        self.state.writer.write(&response).await
    }

    /// Main loop: route every inbound envelope until the stream ends.
    ///
    /// Inbound requests and notifications each run as an independent
    /// task; nothing serializes handler execution, only the transport
    /// write lock. After EOF, in-flight dispatches get a bounded grace
    /// period, then every caller still waiting in `send_request` is
    /// failed with a connection-closed error.
    pub async fn serve<R, H>(&self, mut reader: LineReader<R>, handler: Arc<H>)
    where
        R: AsyncRead + Unpin,
        H: MethodHandler + ?Sized,
    {
        while let Some(value) = reader.next_value().await {
            match RpcMessage::parse(&value) {
                Some(RpcMessage::Request { id, method, params }) => {
                    let conn = self.clone();
                    let handler = Arc::clone(&handler);
                    self.state.tasks.spawn(async move {
                        let outcome = handler.handle_request(&method, params).await;
                        if let Err(e) = conn.send_response(id, outcome).await {
                            warn!("Failed to send response for {}: {}", method, e);
                        }
                    });
                }
                Some(RpcMessage::Notification { method, params }) => {
                    let handler = Arc::clone(&handler);
                    self.state.tasks.spawn(async move {
                        handler.handle_notification(&method, params).await;
                    });
                }
                Some(RpcMessage::Response { id, outcome }) => {
                    let mut pending = self.state.pending.lock().await;
                    match pending.remove(&id) {
                        Some(tx) => {
                            let _ = tx.send(outcome);
                        }
                        None => debug!("Response for unknown request id {}, ignoring", id),
                    }
                }
                None => {
                    debug!("Ignoring unrecognized envelope");
                }
            }
        }

        debug!("Inbound stream ended, shutting down connection");
        self.state.tasks.close();
        if tokio::time::timeout(SHUTDOWN_GRACE, self.state.tasks.wait())
            .await
            .is_err()
        {
            warn!("Dispatch tasks still running after shutdown grace period");
        }
        self.reject_pending().await;
        self.state.closed.cancel();
    }

    /// Suspend until `serve` has fully terminated.
    pub async fn wait_closed(&self) {
        self.state.closed.cancelled().await;
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.is_cancelled()
    }

    async fn reject_pending(&self) {
        let mut pending = self.state.pending.lock().await;
        for (id, tx) in pending.drain() {
            debug!("Failing pending request {}: connection closed", id);
            let _ = tx.send(Err(RpcError::ConnectionClosed));
        }
    }
}
