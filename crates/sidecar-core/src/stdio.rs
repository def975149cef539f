//! Stdio entry point
//!
//! Binds the agent server to the process's stdin/stdout. Stdout carries
//! the protocol exclusively; anything else (logs) must go to stderr.

use crate::agent::{AgentServer, ReplySource};
use crate::rpc::{stdio_transport, RpcConnection};
use std::sync::Arc;
use tracing::info;

/// Serve ACP on stdin/stdout until the client closes its end.
///
/// Returns after EOF once in-flight request handlers have been given
/// their shutdown grace period and all pending state is torn down.
pub async fn run_stdio_server(source: Arc<dyn ReplySource>) {
    let (reader, writer) = stdio_transport();
    let conn = RpcConnection::new(writer);
    let server = Arc::new(AgentServer::new(conn.clone(), source));

    info!("Agent listening on stdio");
    conn.serve(reader, server).await;
    info!("Stdin closed, agent shutting down");
}
