//! Reply generation seam
//!
//! The server streams whatever a `ReplySource` produces; the real model
//! backend plugs in here. The shipped implementation answers with canned
//! text so the protocol machinery can run end to end without one.

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

/// Produces the reply for one prompt turn.
///
/// Chunks pushed into `chunks` are forwarded to the client as
/// `session/update` notifications as they arrive. Returning `Err` ends
/// the turn with an error chunk instead of killing the connection. The
/// future is dropped mid-flight if the turn is cancelled, so
/// implementations must not hold state that needs explicit cleanup
/// across await points.
#[async_trait]
pub trait ReplySource: Send + Sync + 'static {
    async fn reply(&self, prompt: &str, chunks: mpsc::Sender<String>) -> Result<()>;
}

/// Stand-in reply source: acknowledges the prompt in a couple of chunks.
///
/// An inter-chunk delay simulates generation latency, which is what
/// makes mid-turn cancellation observable.
pub struct CannedReplies {
    chunk_delay: Duration,
}

impl CannedReplies {
    pub fn new(chunk_delay: Duration) -> Self {
        Self { chunk_delay }
    }
}

impl Default for CannedReplies {
    fn default() -> Self {
        Self::new(Duration::from_millis(0))
    }
}

#[async_trait]
impl ReplySource for CannedReplies {
    async fn reply(&self, prompt: &str, chunks: mpsc::Sender<String>) -> Result<()> {
        let parts = ["You said: ".to_string(), prompt.to_string()];
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 && !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
            if chunks.send(part).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}
